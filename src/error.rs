use crate::builtin::BuiltinError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Every way a single input line can fail.
///
/// All of these are recovered at the line level: the prompt loop prints the
/// message and reads the next line. Only the `exit` builtin ends the shell.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Builtin(#[from] BuiltinError),

    /// A token cannot be handed to `execve` (embedded NUL byte).
    #[error("invalid argument {0:?}: contains a NUL byte")]
    InvalidArgument(String),

    /// No candidate path for a program could be executed.
    ///
    /// Raised inside the affected child only; the message is rendered in the
    /// parent before forking so the child never allocates.
    #[error("{name}: {kind}")]
    Resolution {
        name: String,
        kind: ResolutionFailure,
    },

    #[error("{}: {source}", path.display())]
    Redirection {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot create pipe: {0}")]
    Pipe(#[source] io::Error),

    #[error("cannot fork child {index} of {total}: {source}")]
    Fork {
        index: usize,
        total: usize,
        #[source]
        source: io::Error,
    },

    #[error("terminal control failed: {0}")]
    Terminal(#[source] io::Error),
}

impl ShellError {
    /// Status reported to the prompt loop when a line fails before or while
    /// launching its processes.
    pub fn exit_code(&self) -> crate::command::ExitCode {
        match self {
            ShellError::Lex(_) | ShellError::Parse(_) | ShellError::InvalidArgument(_) => 2,
            ShellError::Resolution { kind, .. } => kind.exit_code(),
            _ => 1,
        }
    }
}

/// Why none of a program's candidate paths could be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
    #[error("command not found")]
    NotFound,
    /// At least one candidate exists but exec was refused (e.g. `EACCES`).
    #[error("permission denied")]
    NotExecutable,
}

impl ResolutionFailure {
    pub fn exit_code(self) -> crate::command::ExitCode {
        match self {
            ResolutionFailure::NotFound => crate::command::EXIT_NOT_FOUND,
            ResolutionFailure::NotExecutable => crate::command::EXIT_NOT_EXECUTABLE,
        }
    }
}
