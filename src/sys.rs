//! Thin wrappers over the libc calls the engine needs.
//!
//! Everything that runs in the parent returns `io::Result`. The `child_*`
//! functions are used between `fork` and `exec`: they never allocate, never
//! take locks and ignore errors they cannot report.

use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

pub type Pid = libc::pid_t;

pub const STDIN_FILENO: RawFd = libc::STDIN_FILENO;
pub const STDOUT_FILENO: RawFd = libc::STDOUT_FILENO;
pub const STDERR_FILENO: RawFd = libc::STDERR_FILENO;

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn cvt_retry(mut f: impl FnMut() -> libc::c_int) -> io::Result<libc::c_int> {
    loop {
        match cvt(f()) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// Anonymous pipe as `(read end, write end)`, both close-on-exec.
///
/// Close-on-exec keeps the ends from leaking into programs started by other
/// threads; children that need an end get it through `dup2`, which clears the flag.
pub fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds: [libc::c_int; 2] = [-1; 2];

    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    cvt(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;

    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    {
        cvt(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        for fd in fds {
            cvt(unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) })?;
        }
    }

    // SAFETY: both descriptors were just created and are owned by nobody else.
    unsafe { Ok((OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))) }
}

pub enum ForkResult {
    Parent { child: Pid },
    Child,
}

/// # Safety
///
/// In the child only async-signal-safe operations may run until `exec` or
/// `_exit`; the caller must uphold that.
pub unsafe fn fork() -> io::Result<ForkResult> {
    match cvt(unsafe { libc::fork() })? {
        0 => Ok(ForkResult::Child),
        child => Ok(ForkResult::Parent { child }),
    }
}

pub fn getpid() -> Pid {
    unsafe { libc::getpid() }
}

pub fn getpgrp() -> Pid {
    unsafe { libc::getpgrp() }
}

pub fn setpgid(pid: Pid, pgid: Pid) -> io::Result<()> {
    cvt(unsafe { libc::setpgid(pid, pgid) }).map(drop)
}

pub fn tcgetpgrp(fd: RawFd) -> io::Result<Pid> {
    let pgrp = unsafe { libc::tcgetpgrp(fd) };
    if pgrp == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(pgrp)
    }
}

pub fn tcsetpgrp(fd: RawFd, pgid: Pid) -> io::Result<()> {
    cvt_retry(|| unsafe { libc::tcsetpgrp(fd, pgid) }).map(drop)
}

pub fn tcgetattr(fd: RawFd) -> io::Result<libc::termios> {
    let mut mode = std::mem::MaybeUninit::<libc::termios>::uninit();
    cvt(unsafe { libc::tcgetattr(fd, mode.as_mut_ptr()) })?;
    // SAFETY: tcgetattr filled the struct.
    Ok(unsafe { mode.assume_init() })
}

pub fn tcsetattr(fd: RawFd, mode: &libc::termios) -> io::Result<()> {
    cvt_retry(|| unsafe { libc::tcsetattr(fd, libc::TCSADRAIN, mode) }).map(drop)
}

/// Send `signal` to every member of process group `pgid`.
pub fn kill_group(pgid: Pid, signal: libc::c_int) -> io::Result<()> {
    cvt(unsafe { libc::kill(-pgid, signal) }).map(drop)
}

/// Install `handler` (`SIG_IGN` or `SIG_DFL`) for `signal`.
pub fn set_signal_handler(signal: libc::c_int, handler: libc::sighandler_t) -> io::Result<()> {
    if unsafe { libc::signal(signal, handler) } == libc::SIG_ERR {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Block until `pid` changes state; returns the raw status word.
pub fn waitpid(pid: Pid, flags: libc::c_int) -> io::Result<libc::c_int> {
    let mut status: libc::c_int = 0;
    cvt_retry(|| unsafe { libc::waitpid(pid, &mut status, flags) })?;
    Ok(status)
}

pub fn child_setpgid(pgid: Pid) {
    unsafe { libc::setpgid(0, pgid) };
}

pub fn child_tcsetpgrp(fd: RawFd, pgid: Pid) {
    unsafe { libc::tcsetpgrp(fd, pgid) };
}

pub fn child_default_signal(signal: libc::c_int) {
    unsafe { libc::signal(signal, libc::SIG_DFL) };
}

/// Returns false when `dup2` failed.
pub fn child_dup2(from: RawFd, to: RawFd) -> bool {
    unsafe { libc::dup2(from, to) != -1 }
}

pub fn child_close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

pub fn child_write_stderr(message: &[u8]) {
    unsafe { libc::write(STDERR_FILENO, message.as_ptr().cast(), message.len()) };
}

/// `execve`, returning the `errno` it failed with.
///
/// # Safety
///
/// `argv` and `envp` must be null-terminated arrays of pointers to
/// NUL-terminated strings that outlive the call.
pub unsafe fn child_execve(
    path: &std::ffi::CStr,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
) -> libc::c_int {
    unsafe { libc::execve(path.as_ptr(), argv.as_ptr(), envp.as_ptr()) };
    io::Error::last_os_error().raw_os_error().unwrap_or(libc::ENOENT)
}

pub fn child_exit(code: libc::c_int) -> ! {
    unsafe { libc::_exit(code) }
}
