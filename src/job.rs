//! Job/terminal controller: process groups, foreground handoff and reaping.

use crate::command::{EXIT_FAILURE, Termination};
use crate::error::ShellError;
use crate::signals::SignalPolicy;
use crate::sys::{self, Pid};
use std::io::{self, IsTerminal};
use std::os::fd::RawFd;

/// Process-wide terminal state, captured once at startup.
///
/// The saved mode is restored every time the shell takes the foreground back
/// from a pipeline.
#[derive(Clone, Copy)]
pub struct ShellTerminalState {
    interactive: bool,
    terminal: RawFd,
    shell_pgid: Pid,
    saved_mode: Option<libc::termios>,
    signals: SignalPolicy,
}

impl std::fmt::Debug for ShellTerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellTerminalState")
            .field("interactive", &self.interactive)
            .field("terminal", &self.terminal)
            .field("shell_pgid", &self.shell_pgid)
            .field("saved_mode", &self.saved_mode.is_some())
            .finish()
    }
}

impl ShellTerminalState {
    /// State for a shell without a controlling terminal: no process groups,
    /// no foreground handoff, no signal overrides.
    pub fn detached() -> Self {
        Self {
            interactive: false,
            terminal: sys::STDIN_FILENO,
            shell_pgid: sys::getpgrp(),
            saved_mode: None,
            signals: SignalPolicy::non_interactive(),
        }
    }

    /// Detect whether stdin is a terminal and, if so, take control of it.
    ///
    /// When launched from a background job the shell stops itself with
    /// `SIGTTIN` until it is moved to the foreground. It then becomes the
    /// leader of its own process group, grabs the terminal, records the
    /// terminal mode and installs the interactive signal policy.
    pub fn init(job_control: bool) -> Result<Self, ShellError> {
        if !job_control || !io::stdin().is_terminal() {
            log::info!("running without job control");
            return Ok(Self::detached());
        }
        Self::take_control(sys::STDIN_FILENO)
    }

    /// Take control of `terminal`, which must be the controlling terminal
    /// of the calling process.
    pub fn take_control(terminal: RawFd) -> Result<Self, ShellError> {
        loop {
            let pgrp = sys::getpgrp();
            let foreground = sys::tcgetpgrp(terminal).map_err(ShellError::Terminal)?;
            if foreground == pgrp {
                break;
            }
            log::debug!("shell group {pgrp} is in the background (foreground {foreground}), stopping");
            sys::kill_group(pgrp, libc::SIGTTIN).map_err(ShellError::Terminal)?;
        }

        let signals = SignalPolicy::interactive();
        signals.apply().map_err(ShellError::Terminal)?;

        let shell_pgid = sys::getpid();
        if sys::getpgrp() != shell_pgid {
            sys::setpgid(shell_pgid, shell_pgid).map_err(ShellError::Terminal)?;
        }
        sys::tcsetpgrp(terminal, shell_pgid).map_err(ShellError::Terminal)?;
        let saved_mode = sys::tcgetattr(terminal).map_err(ShellError::Terminal)?;
        log::info!("job control enabled, shell pgid {shell_pgid}");

        Ok(Self {
            interactive: true,
            terminal,
            shell_pgid,
            saved_mode: Some(saved_mode),
            signals,
        })
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }

    pub fn signals(&self) -> SignalPolicy {
        self.signals
    }

    fn give_foreground(&self, pgid: Pid) -> io::Result<()> {
        if self.interactive {
            sys::tcsetpgrp(self.terminal, pgid)?;
        }
        Ok(())
    }

    /// Put the shell's group back in the foreground and restore its terminal mode.
    ///
    /// Idempotent; a no-op for a detached shell.
    pub fn reclaim_foreground(&self) -> io::Result<()> {
        if !self.interactive {
            return Ok(());
        }
        sys::tcsetpgrp(self.terminal, self.shell_pgid)?;
        if let Some(mode) = &self.saved_mode {
            sys::tcsetattr(self.terminal, mode)?;
        }
        Ok(())
    }
}

/// What a freshly forked child does before exec to join its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildGroup {
    /// Group to join; 0 makes the child the leader of a new group.
    pub pgid: Pid,
    /// Terminal to hand to the group.
    pub terminal: RawFd,
}

impl ChildGroup {
    /// Join the group and take the terminal. Async-signal-safe.
    pub fn enter(&self) {
        sys::child_setpgid(self.pgid);
        let pgid = if self.pgid == 0 { sys::getpid() } else { self.pgid };
        sys::child_tcsetpgrp(self.terminal, pgid);
    }
}

/// Lifecycle of one pipeline under the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Built,
    GroupCreated,
    Forked { launched: usize, total: usize },
    Foregrounded,
    Waiting,
    Aborting,
    Reaped { reaped: usize },
    ForegroundRestored,
}

/// The processes of one pipeline, from the first fork to the last reap.
#[derive(Debug)]
pub struct Job<'t> {
    terminal: &'t ShellTerminalState,
    total: usize,
    pgid: Option<Pid>,
    members: Vec<Pid>,
    state: JobState,
}

impl<'t> Job<'t> {
    pub fn new(terminal: &'t ShellTerminalState, total: usize) -> Self {
        Self {
            terminal,
            total,
            pgid: None,
            members: Vec::with_capacity(total),
            state: JobState::Built,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn pgid(&self) -> Option<Pid> {
        self.pgid
    }

    pub fn members(&self) -> &[Pid] {
        &self.members
    }

    fn transition(&mut self, next: JobState) {
        log::trace!("job {:?}: {:?} -> {:?}", self.pgid, self.state, next);
        self.state = next;
    }

    /// Group setup the next child must perform, `None` without job control.
    pub fn child_group(&self) -> Option<ChildGroup> {
        self.terminal.is_interactive().then(|| ChildGroup {
            pgid: self.pgid.unwrap_or(0),
            terminal: self.terminal.terminal,
        })
    }

    /// Record a forked child. The first child seeds the process group.
    ///
    /// The parent sets the group too, so it is in place whichever of parent
    /// and child runs first.
    pub fn adopt(&mut self, pid: Pid) {
        self.members.push(pid);
        if self.terminal.is_interactive() {
            let pgid = match self.pgid {
                Some(pgid) => pgid,
                None => {
                    self.pgid = Some(pid);
                    self.transition(JobState::GroupCreated);
                    pid
                }
            };
            // EACCES: the child already exec'd after joining by itself.
            if let Err(e) = sys::setpgid(pid, pgid) {
                log::debug!("setpgid({pid}, {pgid}) from parent: {e}");
            }
        }
        self.transition(JobState::Forked {
            launched: self.members.len(),
            total: self.total,
        });
    }

    /// A fork failed: no more children will be added.
    pub fn abort(&mut self) {
        self.transition(JobState::Aborting);
    }

    /// Hand the terminal to the job's group.
    pub fn foreground(&mut self) -> Result<(), ShellError> {
        if let Some(pgid) = self.pgid {
            self.terminal
                .give_foreground(pgid)
                .map_err(ShellError::Terminal)?;
            log::debug!("foreground handed to pgid {pgid}");
        }
        self.transition(JobState::Foregrounded);
        Ok(())
    }

    /// Wait for every member, returning how each ended, in launch order.
    ///
    /// A member that gets stopped is resumed: there are no background jobs,
    /// so a launched pipeline always runs to completion.
    pub fn wait_all(&mut self) -> Vec<Termination> {
        if self.state != JobState::Aborting {
            self.transition(JobState::Waiting);
        }
        let flags = if self.terminal.is_interactive() {
            libc::WUNTRACED
        } else {
            0
        };

        let mut results = Vec::with_capacity(self.members.len());
        for &pid in &self.members {
            let termination = loop {
                match sys::waitpid(pid, flags) {
                    Ok(status) => {
                        if let Some(termination) = Termination::from_wait_status(status) {
                            break termination;
                        }
                        if libc::WIFSTOPPED(status) {
                            log::warn!("process {pid} stopped; suspending jobs is not supported, resuming");
                            let target = self.pgid.unwrap_or(pid);
                            if let Err(e) = sys::kill_group(target, libc::SIGCONT) {
                                log::warn!("cannot resume group {target}: {e}");
                            }
                        }
                    }
                    Err(e) => {
                        log::warn!("waitpid({pid}): {e}");
                        break Termination::Exited(EXIT_FAILURE);
                    }
                }
            };
            log::debug!("reaped {pid}: {termination:?}");
            results.push(termination);
        }
        self.transition(JobState::Reaped {
            reaped: results.len(),
        });
        results
    }

    /// Take the terminal back for the shell and restore its mode.
    pub fn restore_foreground(&mut self) -> Result<(), ShellError> {
        self.terminal
            .reclaim_foreground()
            .map_err(ShellError::Terminal)?;
        self.transition(JobState::ForegroundRestored);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_state_skips_terminal_control() {
        let state = ShellTerminalState::detached();
        assert!(!state.is_interactive());
        assert_eq!(state.signals(), SignalPolicy::non_interactive());
        state.reclaim_foreground().unwrap();
        state.reclaim_foreground().unwrap();
    }

    #[test]
    fn init_without_job_control_is_detached() {
        let state = ShellTerminalState::init(false).unwrap();
        assert!(!state.is_interactive());
    }

    #[test]
    fn detached_job_has_no_group() {
        let state = ShellTerminalState::detached();
        let job = Job::new(&state, 3);
        assert_eq!(job.state(), JobState::Built);
        assert_eq!(job.child_group(), None);
        assert_eq!(job.pgid(), None);
    }

    #[test]
    fn job_walks_through_its_states() {
        let state = ShellTerminalState::detached();
        let mut job = Job::new(&state, 1);

        let pid = match unsafe { sys::fork() }.unwrap() {
            sys::ForkResult::Child => sys::child_exit(7),
            sys::ForkResult::Parent { child } => child,
        };
        job.adopt(pid);
        assert_eq!(job.state(), JobState::Forked { launched: 1, total: 1 });
        assert_eq!(job.members(), [pid]);

        job.foreground().unwrap();
        assert_eq!(job.state(), JobState::Foregrounded);

        let results = job.wait_all();
        assert_eq!(results, [Termination::Exited(7)]);
        assert_eq!(job.state(), JobState::Reaped { reaped: 1 });

        job.restore_foreground().unwrap();
        assert_eq!(job.state(), JobState::ForegroundRestored);
    }

    #[test]
    fn aborted_job_still_reaps_started_members() {
        let state = ShellTerminalState::detached();
        let mut job = Job::new(&state, 3);

        for code in [0, 3] {
            match unsafe { sys::fork() }.unwrap() {
                sys::ForkResult::Child => sys::child_exit(code),
                sys::ForkResult::Parent { child } => job.adopt(child),
            }
        }
        job.abort();
        assert_eq!(job.state(), JobState::Aborting);

        let results = job.wait_all();
        assert_eq!(results, [Termination::Exited(0), Termination::Exited(3)]);
        assert_eq!(job.state(), JobState::Reaped { reaped: 2 });
    }

    #[test]
    fn killed_member_reports_signal() {
        let state = ShellTerminalState::detached();
        let mut job = Job::new(&state, 1);
        let pid = match unsafe { sys::fork() }.unwrap() {
            sys::ForkResult::Child => {
                unsafe { libc::raise(libc::SIGKILL) };
                sys::child_exit(0)
            }
            sys::ForkResult::Parent { child } => child,
        };
        job.adopt(pid);
        let results = job.wait_all();
        assert_eq!(results, [Termination::Signaled(libc::SIGKILL)]);
        assert_eq!(results[0].code(), 137);
    }
}
