//! Diagnostics backend for the `log` macros used across the crate.

use anyhow::Context;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use std::fs::OpenOptions;
use std::path::Path;

/// Install the global logger.
///
/// Diagnostics go to stderr unless `file` is given, in which case they are
/// appended to it (useful while a full-screen program owns the terminal).
pub fn init(level: LevelFilter, file: Option<&Path>) -> anyhow::Result<()> {
    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();

    match file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            WriteLogger::init(level, config, file)?;
        }
        None => {
            TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto)?;
        }
    }
    Ok(())
}
