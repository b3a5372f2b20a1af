//! Decoded POSIX wait status

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with a numeric code
    Exited(i32),
    /// Terminated by a signal
    Signaled { signal: Signal, core_dumped: bool },
    /// Stopped by a signal, still alive
    Stopped(Signal),
    /// A raw status that cannot be decoded
    Unknown(i32),
}

impl ExitStatus {
    pub fn from_raw(raw: i32) -> Self {
        if libc::WIFEXITED(raw) {
            ExitStatus::Exited(libc::WEXITSTATUS(raw))
        } else if libc::WIFSIGNALED(raw) {
            match Signal::try_from(libc::WTERMSIG(raw)) {
                Ok(signal) => ExitStatus::Signaled {
                    signal,
                    core_dumped: libc::WCOREDUMP(raw),
                },
                Err(_) => ExitStatus::Unknown(raw),
            }
        } else if libc::WIFSTOPPED(raw) {
            match Signal::try_from(libc::WSTOPSIG(raw)) {
                Ok(signal) => ExitStatus::Stopped(signal),
                Err(_) => ExitStatus::Unknown(raw),
            }
        } else {
            ExitStatus::Unknown(raw)
        }
    }

    /// Whether the process is gone (exited or killed).
    pub fn is_terminated(&self) -> bool {
        matches!(self, ExitStatus::Exited(_) | ExitStatus::Signaled { .. })
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    /// Shell-style exit code: the exit code itself, or 128 + signal number.
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Exited(code) => Some(*code),
            ExitStatus::Signaled { signal, .. } => Some(128 + *signal as i32),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exited with code {code}"),
            ExitStatus::Signaled {
                signal,
                core_dumped: true,
            } => write!(f, "killed by {signal} (core dumped)"),
            ExitStatus::Signaled { signal, .. } => write!(f, "killed by {signal}"),
            ExitStatus::Stopped(signal) => write!(f, "stopped by {signal}"),
            ExitStatus::Unknown(raw) => write!(f, "unknown wait status {raw:#x}"),
        }
    }
}

/// `waitpid` on one pid, retrying on EINTR. `Ok(None)` means the child has
/// nothing to report yet (only possible with `WNOHANG`).
pub(crate) fn wait_raw(pid: Pid, flags: libc::c_int) -> Result<Option<ExitStatus>, Errno> {
    loop {
        let mut raw = 0;
        let ret = unsafe { libc::waitpid(pid.as_raw(), &mut raw, flags) };
        match ret {
            0 => return Ok(None),
            r if r > 0 => return Ok(Some(ExitStatus::from_raw(raw))),
            _ => match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(errno),
            },
        }
    }
}

/// Block until `pid` has terminated and its status is consumed.
pub(crate) fn reap_blocking(pid: Pid) -> Result<ExitStatus, Errno> {
    loop {
        if let Some(status) = wait_raw(pid, 0)? {
            if status.is_terminated() {
                return Ok(status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Wait status layout shared by Linux and the BSDs:
    // exit code in bits 8..16, termination signal in the low 7 bits,
    // 0x7f in the low byte for a stop.
    fn exited(code: i32) -> i32 {
        code << 8
    }

    #[test]
    fn test_decode_exit() {
        assert_eq!(ExitStatus::from_raw(exited(0)), ExitStatus::Exited(0));
        assert_eq!(ExitStatus::from_raw(exited(42)), ExitStatus::Exited(42));
    }

    #[test]
    fn test_decode_signal() {
        assert_eq!(
            ExitStatus::from_raw(libc::SIGKILL),
            ExitStatus::Signaled {
                signal: Signal::SIGKILL,
                core_dumped: false
            }
        );
        assert_eq!(
            ExitStatus::from_raw(libc::SIGSEGV | 0x80),
            ExitStatus::Signaled {
                signal: Signal::SIGSEGV,
                core_dumped: true
            }
        );
    }

    #[test]
    fn test_decode_stop() {
        let raw = (libc::SIGTSTP << 8) | 0x7f;
        assert_eq!(ExitStatus::from_raw(raw), ExitStatus::Stopped(Signal::SIGTSTP));
    }

    #[test]
    fn test_codes() {
        assert_eq!(ExitStatus::Exited(3).code(), Some(3));
        let killed = ExitStatus::Signaled {
            signal: Signal::SIGTERM,
            core_dumped: false,
        };
        assert_eq!(killed.code(), Some(128 + 15));
        assert!(killed.is_terminated());
        assert_eq!(ExitStatus::Stopped(Signal::SIGSTOP).code(), None);
        assert!(!ExitStatus::Stopped(Signal::SIGSTOP).is_terminated());
    }

    #[test]
    fn test_display() {
        assert_eq!(ExitStatus::Exited(1).to_string(), "exited with code 1");
        assert_eq!(
            ExitStatus::Signaled {
                signal: Signal::SIGINT,
                core_dumped: false
            }
            .to_string(),
            "killed by SIGINT"
        );
    }

    #[test]
    fn test_wait_on_unknown_child() {
        // pid 1 is never our child
        assert_eq!(wait_raw(Pid::from_raw(1), libc::WNOHANG), Err(Errno::ECHILD));
    }
}
