//! Pipeline builder: pipes, forks, descriptor wiring and exec.
//!
//! Everything a child needs (argv, environment, candidate paths, error
//! messages) is prepared before the first fork, so a child only ever calls
//! async-signal-safe functions between `fork` and `execve`.

use crate::command::{EXIT_FAILURE, ExitCode, Termination};
use crate::env::Environment;
use crate::error::{ResolutionFailure, ShellError};
use crate::job::{ChildGroup, Job, ShellTerminalState};
use crate::parser::{CommandSegment, Pipeline, Redirection};
use crate::resolver;
use crate::signals::SignalPolicy;
use crate::sys::{self, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Permissions of a file created by `>`: owner read/write, group/other read.
const OUTPUT_FILE_MODE: u32 = 0o644;

/// Null-terminated `char *[]` with the strings it points into.
struct CStringArray {
    _owned: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl CStringArray {
    fn new(items: impl IntoIterator<Item = Vec<u8>>) -> Result<Self, ShellError> {
        let owned = items
            .into_iter()
            .map(|item| {
                CString::new(item).map_err(|e| {
                    ShellError::InvalidArgument(String::from_utf8_lossy(&e.into_vec()).into_owned())
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let ptrs = owned
            .iter()
            .map(|s| s.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();
        Ok(Self {
            _owned: owned,
            ptrs,
        })
    }
}

fn path_to_cstring(path: PathBuf) -> Result<CString, ShellError> {
    let bytes = path.into_os_string().into_vec();
    CString::new(bytes).map_err(|e| {
        ShellError::InvalidArgument(String::from_utf8_lossy(&e.into_vec()).into_owned())
    })
}

fn render_error(err: &ShellError) -> Vec<u8> {
    format!("jobsh: {err}\n").into_bytes()
}

/// Everything one child needs to exec its segment.
struct LaunchPlan {
    argv: CStringArray,
    candidates: Vec<CString>,
    not_found: Vec<u8>,
    not_executable: Vec<u8>,
}

impl LaunchPlan {
    fn prepare(segment: &CommandSegment, search_path: &str) -> Result<Self, ShellError> {
        let name = segment.program();
        let argv = CStringArray::new(segment.argv().iter().map(|arg| arg.clone().into_bytes()))?;
        let candidates = resolver::candidate_paths(search_path, name)
            .into_iter()
            .map(path_to_cstring)
            .collect::<Result<Vec<_>, _>>()?;
        match resolver::find_command_path(search_path, name) {
            Some(path) => log::debug!("{name}: resolves to {}", path.display()),
            None => log::debug!("{name}: no candidate exists, child will fail"),
        }
        let message = |kind| {
            render_error(&ShellError::Resolution {
                name: name.to_string(),
                kind,
            })
        };
        Ok(Self {
            argv,
            candidates,
            not_found: message(ResolutionFailure::NotFound),
            not_executable: message(ResolutionFailure::NotExecutable),
        })
    }
}

/// The file named by the pipeline's redirection, opened by the parent.
///
/// An open failure is kept as a rendered message for the child it belongs to.
enum RedirectFile {
    None,
    Input(Result<OwnedFd, Vec<u8>>),
    Output(Result<OwnedFd, Vec<u8>>),
}

impl RedirectFile {
    fn open(redirection: &Redirection) -> Self {
        match redirection {
            Redirection::None => RedirectFile::None,
            Redirection::FromFile(path) => RedirectFile::Input(Self::open_with(path, |path| File::open(path))),
            Redirection::ToFile(path) => RedirectFile::Output(Self::open_with(path, |path| {
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(OUTPUT_FILE_MODE)
                    .open(path)
            })),
        }
    }

    fn open_with(
        path: &Path,
        open: impl FnOnce(&Path) -> std::io::Result<File>,
    ) -> Result<OwnedFd, Vec<u8>> {
        open(path).map(OwnedFd::from).map_err(|source| {
            let err = ShellError::Redirection {
                path: path.to_path_buf(),
                source,
            };
            log::warn!("{err}");
            render_error(&err)
        })
    }

    fn fd(&self) -> Option<RawFd> {
        match self {
            RedirectFile::Input(Ok(fd)) | RedirectFile::Output(Ok(fd)) => Some(fd.as_raw_fd()),
            _ => None,
        }
    }
}

/// Where one child's stdin/stdout come from, or why it cannot start.
struct Wiring<'a> {
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    failure: Option<&'a [u8]>,
}

impl<'a> Wiring<'a> {
    /// Child `index` reads pipe `index - 1` and writes pipe `index`; the
    /// redirection only applies at the open ends of the pipeline.
    fn for_child(index: usize, pipes: &[(OwnedFd, OwnedFd)], redirect: &'a RedirectFile) -> Self {
        let last = pipes.len();
        let mut wiring = Wiring {
            stdin: index.checked_sub(1).map(|prev| pipes[prev].0.as_raw_fd()),
            stdout: pipes.get(index).map(|(_, write)| write.as_raw_fd()),
            failure: None,
        };
        match redirect {
            RedirectFile::Input(file) if index == 0 => match file {
                Ok(fd) => wiring.stdin = Some(fd.as_raw_fd()),
                Err(message) => wiring.failure = Some(message.as_slice()),
            },
            RedirectFile::Output(file) if index == last => match file {
                Ok(fd) => wiring.stdout = Some(fd.as_raw_fd()),
                Err(message) => wiring.failure = Some(message.as_slice()),
            },
            _ => {}
        }
        wiring
    }
}

/// Runs in the forked child; never returns.
fn exec_child(
    plan: &LaunchPlan,
    wiring: &Wiring<'_>,
    group: Option<ChildGroup>,
    signals: SignalPolicy,
    inherited: &[RawFd],
    envp: &CStringArray,
) -> ! {
    if let Some(group) = group {
        group.enter();
    }
    signals.reset_in_child();

    if let Some(message) = wiring.failure {
        sys::child_write_stderr(message);
        sys::child_exit(EXIT_FAILURE);
    }
    for (from, to) in [(wiring.stdin, STDIN_FILENO), (wiring.stdout, STDOUT_FILENO)] {
        if let Some(from) = from {
            if !sys::child_dup2(from, to) {
                sys::child_exit(EXIT_FAILURE);
            }
        }
    }
    for &fd in inherited {
        if fd > STDERR_FILENO {
            sys::child_close(fd);
        }
    }

    let mut refused = false;
    for candidate in &plan.candidates {
        // SAFETY: argv and envp are null-terminated and owned by the plan.
        let errno = unsafe { sys::child_execve(candidate, &plan.argv.ptrs, &envp.ptrs) };
        if !matches!(errno, libc::ENOENT | libc::ENOTDIR) {
            refused = true;
        }
    }

    if refused {
        sys::child_write_stderr(&plan.not_executable);
        sys::child_exit(ResolutionFailure::NotExecutable.exit_code())
    } else {
        sys::child_write_stderr(&plan.not_found);
        sys::child_exit(ResolutionFailure::NotFound.exit_code())
    }
}

fn allocate_pipes(count: usize) -> Result<Vec<(OwnedFd, OwnedFd)>, ShellError> {
    (0..count)
        .map(|_| sys::pipe().map_err(ShellError::Pipe))
        .collect()
}

/// How every member of a finished pipeline ended, in segment order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub members: Vec<Termination>,
}

impl JobReport {
    /// The pipeline's status: that of its last segment.
    pub fn status(&self) -> ExitCode {
        self.members
            .last()
            .map(|t| t.code())
            .unwrap_or(EXIT_FAILURE)
    }
}

/// Launches pipelines of external programs.
pub struct PipelineBuilder<'a> {
    env: &'a Environment,
    terminal: &'a ShellTerminalState,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(env: &'a Environment, terminal: &'a ShellTerminalState) -> Self {
        Self { env, terminal }
    }

    /// Run `pipeline` to completion and report how each member ended.
    ///
    /// Pipe allocation failure aborts before anything is forked. A fork
    /// failure stops launching; children already started are still reaped
    /// before the error is returned.
    pub fn launch(&self, pipeline: &Pipeline) -> Result<JobReport, ShellError> {
        let total = pipeline.len();
        let search_path = self.env.search_path();
        let plans = pipeline
            .segments
            .iter()
            .map(|segment| LaunchPlan::prepare(segment, search_path))
            .collect::<Result<Vec<_>, _>>()?;
        let envp = CStringArray::new(self.env.vars.iter().map(|(key, val)| {
            let mut entry = key.as_bytes().to_vec();
            entry.push(b'=');
            entry.extend_from_slice(val.as_bytes());
            entry
        }))?;

        // Pipes first: a line aborted here must not have truncated its target.
        let pipes = allocate_pipes(total.saturating_sub(1))?;
        let redirect = RedirectFile::open(&pipeline.redirection);

        let inherited: Vec<RawFd> = pipes
            .iter()
            .flat_map(|(read, write)| [read.as_raw_fd(), write.as_raw_fd()])
            .chain(redirect.fd())
            .collect();
        let wirings: Vec<Wiring<'_>> = (0..total)
            .map(|index| Wiring::for_child(index, &pipes, &redirect))
            .collect();
        let signals = self.terminal.signals();

        log::debug!("launching {total} segment pipeline");
        let mut job = Job::new(self.terminal, total);
        let mut fork_error = None;
        for (index, (plan, wiring)) in plans.iter().zip(&wirings).enumerate() {
            let group = job.child_group();
            // SAFETY: the child branch only runs exec_child, which is async-signal-safe.
            match unsafe { sys::fork() } {
                Ok(sys::ForkResult::Child) => {
                    exec_child(plan, wiring, group, signals, &inherited, &envp)
                }
                Ok(sys::ForkResult::Parent { child }) => {
                    log::debug!("segment {index} ({}) is pid {child}", pipeline.segments[index].program());
                    job.adopt(child);
                }
                Err(source) => {
                    log::warn!("fork failed for segment {index}: {source}");
                    fork_error = Some(ShellError::Fork {
                        index,
                        total,
                        source,
                    });
                    job.abort();
                    break;
                }
            }
        }

        // Parent copies must go before waiting, or readers never see EOF.
        drop(wirings);
        drop(pipes);
        drop(redirect);

        let foregrounded = if fork_error.is_none() {
            job.foreground()
        } else {
            Ok(())
        };
        let members = job.wait_all();
        let restored = job.restore_foreground();

        if let Some(err) = fork_error {
            if let Err(e) = restored {
                log::warn!("{e}");
            }
            return Err(err);
        }
        foregrounded?;
        restored?;

        let report = JobReport { members };
        log::debug!("pipeline finished with status {}", report.status());
        Ok(report)
    }
}
