use crate::builtin::BuiltinTable;
use crate::command::{EXIT_SUCCESS, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use crate::job::ShellTerminalState;
use crate::lexer;
use crate::parser::{self, ParseError, Pipeline};
use crate::pipeline::PipelineBuilder;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, BufRead, IsTerminal, Write};

/// The prompt loop and line dispatcher.
///
/// Each line is tokenized, segmented into a [`Pipeline`] and then either
/// handed to a builtin (one segment, no redirection, name in the table) or
/// launched as external processes.
///
/// Example
/// ```
/// use jobsh::{Interpreter, ShellTerminalState};
/// let mut sh = Interpreter::new(ShellTerminalState::detached());
/// assert_eq!(sh.run_line("true | false").unwrap(), 1);
/// ```
pub struct Interpreter {
    env: Environment,
    terminal: ShellTerminalState,
    builtins: BuiltinTable,
    line_num: usize,
    last_status: ExitCode,
}

impl Interpreter {
    pub fn new(terminal: ShellTerminalState) -> Self {
        Self {
            env: Environment::new(),
            terminal,
            builtins: BuiltinTable::default(),
            line_num: 0,
            last_status: EXIT_SUCCESS,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Status of the most recent non-blank line.
    pub fn last_status(&self) -> ExitCode {
        self.last_status
    }

    /// Tokenize, parse and run one line.
    pub fn run_line(&mut self, line: &str) -> Result<ExitCode, ShellError> {
        let tokens = lexer::tokenize(line)?;
        let pipeline = parser::parse_pipeline(tokens)?;
        self.execute(&pipeline)
    }

    /// Run a parsed pipeline; builtins write to the process's stdout.
    pub fn execute(&mut self, pipeline: &Pipeline) -> Result<ExitCode, ShellError> {
        let stdout = io::stdout();
        let mut stdout = stdout.lock();
        let code = self.execute_with_output(pipeline, &mut stdout);
        // Nothing buffered may be pending when the next pipeline forks.
        stdout.flush().map_err(|e| ShellError::Builtin(e.into()))?;
        code
    }

    fn execute_with_output(
        &mut self,
        pipeline: &Pipeline,
        stdout: &mut dyn Write,
    ) -> Result<ExitCode, ShellError> {
        if let Some(command) = pipeline.as_simple_command() {
            let args: Vec<&str> = command.args().iter().map(String::as_str).collect();
            if let Some(result) = self.builtins.run(command.program(), &args, stdout, &mut self.env) {
                log::debug!("builtin {} handled in-process", command.program());
                return Ok(result?);
            }
        }
        stdout.flush().map_err(|e| ShellError::Builtin(e.into()))?;
        PipelineBuilder::new(&self.env, &self.terminal)
            .launch(pipeline)
            .map(|report| report.status())
    }

    /// Run one line, printing any failure the way a shell does, and record its status.
    ///
    /// Blank lines are ignored and leave the last status untouched.
    pub fn interpret(&mut self, line: &str) -> ExitCode {
        let status = match self.run_line(line) {
            Ok(code) => code,
            Err(ShellError::Parse(ParseError::EmptyLine)) => return self.last_status,
            Err(err) => {
                log::debug!("line {} failed: {err:?}", self.line_num);
                eprintln!("jobsh: {err}");
                err.exit_code()
            }
        };
        self.last_status = status;
        status
    }

    /// Read-Eval-Print Loop.
    ///
    /// With a terminal on stdin, lines come from a line editor showing a
    /// numbered prompt; otherwise they are read from stdin without a prompt.
    /// Returns at end of input.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        if io::stdin().is_terminal() {
            self.repl_interactive()
        } else {
            self.repl_batch()
        }
    }

    fn repl_interactive(&mut self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;

        loop {
            let readline = rl.readline(&format!("{}: ", self.line_num));
            match readline {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    self.interpret(&line);
                }
                Err(ReadlineError::Interrupted) => {}
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
            self.line_num += 1;
        }

        Ok(())
    }

    fn repl_batch(&mut self) -> anyhow::Result<()> {
        for line in io::stdin().lock().lines() {
            self.interpret(&line?);
            self.line_num += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::tests::lock_current_dir;
    use std::fs;

    fn shell() -> Interpreter {
        Interpreter::new(ShellTerminalState::detached())
    }

    fn run_captured(sh: &mut Interpreter, line: &str) -> (Result<ExitCode, ShellError>, String) {
        let pipeline = parser::parse_pipeline(lexer::tokenize(line).unwrap()).unwrap();
        let mut out = Vec::new();
        let res = sh.execute_with_output(&pipeline, &mut out);
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn builtin_runs_in_process() {
        let _lock = lock_current_dir();
        let mut sh = shell();
        // Output lands in our buffer, so no child process produced it.
        let (res, out) = run_captured(&mut sh, "pwd");
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, format!("{}\n", std::env::current_dir().unwrap().display()));

        let (res, out) = run_captured(&mut sh, "?");
        assert_eq!(res.unwrap(), 0);
        assert!(out.starts_with("? - show this help menu\n"));
    }

    #[test]
    fn redirected_builtin_name_runs_external_program() {
        let _lock = lock_current_dir();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pwd.txt");
        let mut sh = shell();

        let (res, captured) = run_captured(&mut sh, &format!("pwd > '{}'", out.display()));

        assert_eq!(res.unwrap(), 0);
        assert!(captured.is_empty());
        assert_eq!(
            fs::read_to_string(&out).unwrap().trim_end(),
            std::env::current_dir().unwrap().display().to_string()
        );
    }

    #[test]
    fn cd_changes_directory_for_later_pipelines() {
        let _lock = lock_current_dir();
        let orig = std::env::current_dir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let canonical = fs::canonicalize(dir.path()).unwrap();
        let mut sh = shell();

        assert_eq!(sh.run_line(&format!("cd '{}'", canonical.display())).unwrap(), 0);
        assert_eq!(sh.env().current_dir, canonical);
        // Relative output path lands in the new working directory.
        assert_eq!(sh.run_line("echo moved > here.txt").unwrap(), 0);
        assert_eq!(fs::read_to_string(canonical.join("here.txt")).unwrap(), "moved\n");

        std::env::set_current_dir(orig).unwrap();
    }

    #[test]
    fn failed_cd_is_a_builtin_error() {
        let _lock = lock_current_dir();
        let orig = std::env::current_dir().unwrap();
        let mut sh = shell();

        let err = sh.run_line("cd /definitely/not/a/dir/for/jobsh").unwrap_err();

        assert!(matches!(err, ShellError::Builtin(_)));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(std::env::current_dir().unwrap(), orig);
    }

    #[test]
    fn malformed_lines_start_nothing() {
        let mut sh = shell();
        assert!(matches!(sh.run_line("ls |"), Err(ShellError::Parse(ParseError::TrailingPipe))));
        assert!(matches!(sh.run_line("echo 'open"), Err(ShellError::Lex(_))));
        assert_eq!(sh.interpret("| wc"), 2);
        assert_eq!(sh.last_status(), 2);
    }

    #[test]
    fn redirection_without_program_is_reported() {
        let mut sh = shell();
        assert!(matches!(
            sh.run_line("< in"),
            Err(ShellError::Parse(ParseError::MissingProgram(_)))
        ));
        assert_eq!(sh.interpret("true"), 0);
        assert_eq!(sh.interpret("< in"), 2);
        assert_eq!(sh.last_status(), 2);
    }

    #[test]
    fn blank_line_keeps_last_status() {
        let mut sh = shell();
        assert_eq!(sh.interpret("false"), 1);
        assert_eq!(sh.interpret("   "), 1);
        assert_eq!(sh.last_status(), 1);
    }

    #[test]
    fn shell_survives_unknown_program() {
        let mut sh = shell();
        assert_eq!(sh.interpret("nonexistent_program_for_jobsh_tests"), 127);
        assert_eq!(sh.interpret("true"), 0);
    }
}
