//! Signal dispositions for the shell process and its children.
//!
//! An interactive shell ignores the terminal-generated signals so that Ctrl-C,
//! Ctrl-\ and Ctrl-Z only reach the foreground job. Children put every signal
//! in the table back to its default before exec, since ignored dispositions
//! survive `execve`. The same goes for `SIGPIPE`, which the Rust runtime
//! ignores in every shell, interactive or not.

use crate::sys;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ignore,
    Default,
}

impl Disposition {
    fn handler(self) -> libc::sighandler_t {
        match self {
            Disposition::Ignore => libc::SIG_IGN,
            Disposition::Default => libc::SIG_DFL,
        }
    }
}

/// `(signal, disposition in the shell)`; children always get `Default`.
const INTERACTIVE_TABLE: &[(libc::c_int, Disposition)] = &[
    (libc::SIGINT, Disposition::Ignore),
    (libc::SIGQUIT, Disposition::Ignore),
    (libc::SIGTSTP, Disposition::Ignore),
    (libc::SIGTTIN, Disposition::Ignore),
    (libc::SIGTTOU, Disposition::Ignore),
];

/// Ignored by the runtime before `main`, whatever the policy.
const RUNTIME_IGNORED: &[libc::c_int] = &[libc::SIGPIPE];

/// Which signals the shell overrides, applied once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalPolicy {
    table: &'static [(libc::c_int, Disposition)],
}

impl SignalPolicy {
    /// Policy for a shell that owns a terminal.
    pub fn interactive() -> Self {
        Self {
            table: INTERACTIVE_TABLE,
        }
    }

    /// Policy for a shell reading a script or pipe: nothing is overridden.
    pub fn non_interactive() -> Self {
        Self { table: &[] }
    }

    pub fn for_shell(interactive: bool) -> Self {
        if interactive {
            Self::interactive()
        } else {
            Self::non_interactive()
        }
    }

    /// Disposition the shell itself uses for `signal`.
    pub fn shell_disposition(&self, signal: libc::c_int) -> Disposition {
        if RUNTIME_IGNORED.contains(&signal) {
            return Disposition::Ignore;
        }
        self.table
            .iter()
            .find(|(sig, _)| *sig == signal)
            .map(|(_, disposition)| *disposition)
            .unwrap_or(Disposition::Default)
    }

    /// Signals the policy itself overrides in the shell.
    pub fn overridden(&self) -> impl Iterator<Item = libc::c_int> + '_ {
        self.table.iter().map(|(sig, _)| *sig)
    }

    /// Signals a child must reset before exec: the overridden ones plus
    /// those the runtime ignores.
    pub fn child_resets(&self) -> impl Iterator<Item = libc::c_int> + '_ {
        self.overridden().chain(RUNTIME_IGNORED.iter().copied())
    }

    /// Install the shell-side dispositions.
    pub fn apply(&self) -> io::Result<()> {
        for &(signal, disposition) in self.table {
            sys::set_signal_handler(signal, disposition.handler())?;
        }
        log::debug!("signal policy applied to {} signals", self.table.len());
        Ok(())
    }

    /// Restore the defaults in a freshly forked child. Async-signal-safe.
    pub fn reset_in_child(&self) {
        for signal in self.child_resets() {
            sys::child_default_signal(signal);
        }
    }
}
