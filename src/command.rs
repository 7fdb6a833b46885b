//! Exit status conventions shared by builtins and external pipelines.

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

pub const EXIT_SUCCESS: ExitCode = 0;
pub const EXIT_FAILURE: ExitCode = 1;
/// A candidate path existed but could not be executed.
pub const EXIT_NOT_EXECUTABLE: ExitCode = 126;
/// No candidate path existed.
pub const EXIT_NOT_FOUND: ExitCode = 127;

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(ExitCode),
    Signaled(i32),
}

impl Termination {
    /// Decode a raw `waitpid` status word.
    ///
    /// Returns `None` for statuses that do not describe termination
    /// (stopped or continued children).
    pub fn from_wait_status(status: libc::c_int) -> Option<Self> {
        if libc::WIFEXITED(status) {
            Some(Termination::Exited(libc::WEXITSTATUS(status)))
        } else if libc::WIFSIGNALED(status) {
            Some(Termination::Signaled(libc::WTERMSIG(status)))
        } else {
            None
        }
    }

    /// Shell-style exit code: the exit status, or `128 + signal`.
    pub fn code(self) -> ExitCode {
        match self {
            Termination::Exited(code) => code,
            Termination::Signaled(signal) => 128 + signal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signaled_maps_to_128_plus_signal() {
        assert_eq!(Termination::Signaled(libc::SIGINT).code(), 130);
        assert_eq!(Termination::Signaled(libc::SIGKILL).code(), 137);
        assert_eq!(Termination::Exited(3).code(), 3);
    }

    #[test]
    fn decodes_exit_status_word() {
        // Exit code lives in bits 8..16 of the status word on every unix we target.
        let status = 42 << 8;
        assert_eq!(
            Termination::from_wait_status(status),
            Some(Termination::Exited(42))
        );
    }

    #[test]
    fn decodes_signal_status_word() {
        let status = libc::SIGTERM;
        assert_eq!(
            Termination::from_wait_status(status),
            Some(Termination::Signaled(libc::SIGTERM))
        );
    }
}
