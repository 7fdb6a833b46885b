use crate::command::{EXIT_SUCCESS, ExitCode};
use crate::env::Environment;
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by builtins. The shell keeps running.
#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("cd: {}: {source}", path.display())]
    ChangeDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cd: no target and HOME not set")]
    NoHome,
    #[error("pwd: cannot query working directory: {0}")]
    WorkingDirectory(#[source] io::Error),
    #[error("{name}: {message}")]
    Usage { name: &'static str, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed directly
/// in-process without spawning a child process.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Executes the command against the shell's own stdout and environment.
    ///
    /// Return value follows shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        table: &BuiltinTable,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode, BuiltinError>;
}

/// Signature shared by every table entry.
pub type BuiltinHandler = fn(
    name: &'static str,
    args: &[&str],
    table: &BuiltinTable,
    stdout: &mut dyn Write,
    env: &mut Environment,
) -> Result<ExitCode, BuiltinError>;

/// One row of the builtin table.
#[derive(Clone, Copy)]
pub struct BuiltinEntry {
    pub name: &'static str,
    pub doc: &'static str,
    pub handler: BuiltinHandler,
}

impl std::fmt::Debug for BuiltinEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinEntry")
            .field("name", &self.name)
            .field("doc", &self.doc)
            .finish()
    }
}

/// Parse `args` with argh and run the builtin.
fn dispatch<T: BuiltinCommand>(
    name: &'static str,
    args: &[&str],
    table: &BuiltinTable,
    stdout: &mut dyn Write,
    env: &mut Environment,
) -> Result<ExitCode, BuiltinError> {
    match T::from_args(&[name], args) {
        Ok(cmd) => cmd.execute(table, stdout, env),
        Err(EarlyExit { output, status }) => match status {
            Ok(()) => {
                stdout.write_all(output.as_bytes())?;
                Ok(EXIT_SUCCESS)
            }
            Err(()) => Err(BuiltinError::Usage {
                name,
                message: output.trim_end().to_string(),
            }),
        },
    }
}

const BUILTINS: &[BuiltinEntry] = &[
    BuiltinEntry {
        name: "?",
        doc: "show this help menu",
        handler: dispatch::<Help>,
    },
    BuiltinEntry {
        name: "exit",
        doc: "exit the command shell",
        handler: dispatch::<Exit>,
    },
    BuiltinEntry {
        name: "pwd",
        doc: "print current working directory",
        handler: dispatch::<Pwd>,
    },
    BuiltinEntry {
        name: "cd",
        doc: "change directory to the destination",
        handler: dispatch::<Cd>,
    },
];

/// Static mapping from command name to handler and help text.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTable {
    entries: &'static [BuiltinEntry],
}

impl BuiltinTable {
    /// Exact-match lookup by command name.
    pub fn lookup(&self, name: &str) -> Option<&BuiltinEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn entries(&self) -> &[BuiltinEntry] {
        self.entries
    }

    /// Run the builtin named `name`, or return `None` when there is no such builtin.
    pub fn run(
        &self,
        name: &str,
        args: &[&str],
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Option<Result<ExitCode, BuiltinError>> {
        let entry = self.lookup(name)?;
        Some((entry.handler)(entry.name, args, self, stdout, env))
    }
}

impl Default for BuiltinTable {
    fn default() -> Self {
        Self { entries: BUILTINS }
    }
}

#[derive(FromArgs)]
/// Show the list of builtin commands.
pub struct Help {}

impl BuiltinCommand for Help {
    fn execute(
        self,
        table: &BuiltinTable,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode, BuiltinError> {
        for entry in table.entries() {
            writeln!(stdout, "{} - {}", entry.name, entry.doc)?;
        }
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn execute(
        self,
        _table: &BuiltinTable,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode, BuiltinError> {
        let cwd = env::current_dir().map_err(BuiltinError::WorkingDirectory)?;
        writeln!(stdout, "{}", cwd.to_string_lossy())?;
        env.current_dir = cwd;
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn execute(
        self,
        _table: &BuiltinTable,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode, BuiltinError> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => PathBuf::from(env.get_var("HOME").ok_or(BuiltinError::NoHome)?),
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir).map_err(|source| BuiltinError::ChangeDirectory {
            path: new_dir.clone(),
            source,
        })?;

        env::set_current_dir(&canonical).map_err(|source| BuiltinError::ChangeDirectory {
            path: canonical.clone(),
            source,
        })?;
        log::debug!("cd: now in {}", canonical.display());
        env.current_dir = canonical;
        Ok(EXIT_SUCCESS)
    }
}

#[derive(FromArgs)]
/// Exit the shell process.
pub struct Exit {
    #[argh(positional)]
    /// exit status between 0 and 255, 0 when omitted.
    pub status: Option<ExitCode>,
}

impl BuiltinCommand for Exit {
    fn execute(
        self,
        _table: &BuiltinTable,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode, BuiltinError> {
        let status = self.status.unwrap_or(EXIT_SUCCESS);
        if !(0..=255).contains(&status) {
            return Err(BuiltinError::Usage {
                name: "exit",
                message: format!("{status}: status must be between 0 and 255"),
            });
        }
        stdout.flush()?;
        std::process::exit(status)
    }
}
