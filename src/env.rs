use std::collections::BTreeMap;
use std::env as stdenv;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// Name of the search-path variable consulted by the path resolver.
pub const SEARCH_PATH_VAR: &str = "PATH";

/// User-level view of the process environment used by the shell.
///
/// The environment contains:
/// - `vars`: the variables handed to every executed program;
/// - `current_dir`: the working directory, kept in sync with the process's by `cd`.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    ///
    /// Kept as raw OS strings so that variables which are not valid unicode
    /// still reach executed programs unchanged.
    pub vars: BTreeMap<OsString, OsString>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = stdenv::vars_os().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// Get the value of an environment variable, `None` when unset or not unicode.
    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(OsStr::new(key)).and_then(|val| val.to_str())
    }

    /// Set or override an environment variable.
    pub fn set_var(&mut self, key: impl Into<OsString>, val: impl Into<OsString>) {
        self.vars.insert(key.into(), val.into());
    }

    /// The colon-separated search path, empty when unset.
    pub fn search_path(&self) -> &str {
        self.get_var(SEARCH_PATH_VAR).unwrap_or("")
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
