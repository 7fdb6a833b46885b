use argh::FromArgs;
use jobsh::{Interpreter, ShellTerminalState};
use simplelog::LevelFilter;
use std::path::PathBuf;

#[derive(FromArgs)]
/// Interactive command shell with pipelines, redirection and job control.
struct Options {
    #[argh(option, short = 'c')]
    /// run a single command line and exit with its status.
    command: Option<String>,

    #[argh(option, default = "LevelFilter::Warn")]
    /// diagnostics level: off, error, warn, info, debug or trace.
    log_level: LevelFilter,

    #[argh(option)]
    /// append diagnostics to this file instead of stderr.
    log_file: Option<PathBuf>,

    #[argh(switch)]
    /// never take control of the terminal, even when stdin is one.
    no_job_control: bool,
}

fn main() -> anyhow::Result<()> {
    let options: Options = argh::from_env();
    jobsh::logging::init(options.log_level, options.log_file.as_deref())?;

    if let Some(line) = options.command {
        let mut shell = Interpreter::new(ShellTerminalState::detached());
        std::process::exit(shell.interpret(&line));
    }

    let terminal = ShellTerminalState::init(!options.no_job_control)?;
    let mut shell = Interpreter::new(terminal);
    shell.repl()
}
