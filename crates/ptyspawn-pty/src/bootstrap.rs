//! Child side of a spawn, between fork and exec
//!
//! Nothing here may allocate, log, or return to the caller. Every failure
//! reports its errno on the relay and leaves through `_exit`, so buffers
//! inherited from the parent are never flushed twice.

use crate::spawn::ChildHook;
use crate::sync::{ChildEnds, RelayWriter};
use crate::termios::TtyPlan;
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, SigSet, SigmaskHow, Signal};
use nix::unistd::setsid;
use std::collections::BTreeSet;
use std::ffi::CStr;
use std::os::fd::{BorrowedFd, RawFd};

/// Everything the child needs, prepared by the parent before fork
pub(crate) struct ChildPlan<'a> {
    pub program: &'a CStr,
    /// NUL-terminated pointer array into the parent's argv strings
    pub argv: &'a [*const libc::c_char],
    pub slave_path: &'a CStr,
    pub tty: &'a TtyPlan,
    pub kill_ignore: &'a BTreeSet<Signal>,
    pub close_hook: Option<&'a ChildHook>,
}

pub(crate) fn run(plan: &ChildPlan<'_>, ends: ChildEnds) -> ! {
    let ChildEnds { ready, go, relay } = ends;

    if let Err(errno) = setsid() {
        fail(&relay, errno);
    }
    if let Err(errno) = attach_slave(plan.slave_path) {
        fail(&relay, errno);
    }
    if let Err(errno) = acquire_controlling_terminal() {
        fail(&relay, errno);
    }
    let stdin = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
    if let Err(errno) = plan.tty.apply(stdin) {
        fail(&relay, errno);
    }
    reset_signals(plan.kill_ignore);

    if let Err(errno) = ready.notify() {
        fail(&relay, errno);
    }
    match go.wait() {
        Ok(true) => {}
        // parent gave up on us
        Ok(false) => unsafe { libc::_exit(-1) },
        Err(errno) => fail(&relay, errno),
    }

    if let Some(hook) = plan.close_hook {
        hook();
    }
    close_inherited(relay.raw_fd());

    unsafe {
        libc::execvp(plan.program.as_ptr(), plan.argv.as_ptr());
    }
    fail(&relay, Errno::last())
}

fn fail(relay: &RelayWriter, errno: Errno) -> ! {
    relay.report(errno);
    unsafe { libc::_exit(-1) }
}

/// Make the pty slave fds 0, 1 and 2.
///
/// With fd 0 closed, the open lands there.
fn attach_slave(slave_path: &CStr) -> Result<(), Errno> {
    unsafe {
        libc::close(libc::STDIN_FILENO);
        let fd = libc::open(slave_path.as_ptr(), libc::O_RDWR);
        if fd < 0 {
            return Err(Errno::last());
        }
        if fd != libc::STDIN_FILENO {
            if libc::dup2(fd, libc::STDIN_FILENO) < 0 {
                return Err(Errno::last());
            }
            libc::close(fd);
        }
        for target in [libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if libc::dup2(libc::STDIN_FILENO, target) < 0 {
                return Err(Errno::last());
            }
        }
    }
    Ok(())
}

// A session leader opening a tty without O_NOCTTY gets it as controlling
// terminal on Linux.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn acquire_controlling_terminal() -> Result<(), Errno> {
    Ok(())
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn acquire_controlling_terminal() -> Result<(), Errno> {
    let ret = unsafe { libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) };
    if ret < 0 {
        return Err(Errno::last());
    }
    Ok(())
}

/// Default disposition for every catchable signal except the ignore list,
/// and an empty signal mask.
fn reset_signals(kill_ignore: &BTreeSet<Signal>) {
    for sig in Signal::iterator() {
        if matches!(sig, Signal::SIGKILL | Signal::SIGSTOP) {
            continue;
        }
        let handler = if kill_ignore.contains(&sig) {
            SigHandler::SigIgn
        } else {
            SigHandler::SigDfl
        };
        unsafe {
            let _ = signal::signal(sig, handler);
        }
    }
    let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);
}

/// Close every descriptor above stderr except `keep`.
fn close_inherited(keep: RawFd) {
    let first = libc::STDERR_FILENO + 1;

    #[cfg(target_os = "linux")]
    {
        let close_range = |lo: libc::c_uint, hi: libc::c_uint| unsafe {
            libc::syscall(libc::SYS_close_range, lo, hi, 0 as libc::c_uint) == 0
        };
        let keep = keep as libc::c_uint;
        let below = keep <= first as libc::c_uint || close_range(first as libc::c_uint, keep - 1);
        if below && close_range(keep + 1, libc::c_uint::MAX) {
            return;
        }
    }

    let max = match unsafe { libc::sysconf(libc::_SC_OPEN_MAX) } {
        n if n > 0 => n.min(65_536) as RawFd,
        _ => 1024,
    };
    for fd in first..max {
        if fd != keep {
            unsafe {
                libc::close(fd);
            }
        }
    }
}
