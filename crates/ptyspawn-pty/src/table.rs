//! Bookkeeping of spawned children
//!
//! The table is owned by its caller and has no locking of its own; spawners
//! sharing one table across threads must serialize access themselves.

use crate::session::PtySession;
use crate::status::{wait_raw, ExitStatus};
use crate::WaitError;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Reaped(ExitStatus),
    ExecFailed(Errno),
}

/// A spawned process and the pty it runs on
#[derive(Debug)]
pub struct ProcessRecord {
    pid: Pid,
    pty: Option<PtySession>,
    state: ProcessState,
}

impl ProcessRecord {
    pub(crate) fn spawned(pid: Pid, pty: PtySession) -> Self {
        Self {
            pid,
            pty: Some(pty),
            state: ProcessState::Running,
        }
    }

    /// A record for a process whose I/O is not a pty of ours.
    pub fn without_pty(pid: Pid) -> Self {
        Self {
            pid,
            pty: None,
            state: ProcessState::Running,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    pub fn pty(&self) -> Option<&PtySession> {
        self.pty.as_ref()
    }

    pub fn pty_mut(&mut self) -> Option<&mut PtySession> {
        self.pty.as_mut()
    }

    /// Take the pty out of the record, e.g. to wrap it in a stream.
    pub fn take_pty(&mut self) -> Option<PtySession> {
        self.pty.take()
    }

    pub fn slave_name(&self) -> Option<&str> {
        self.pty.as_ref().map(|pty| pty.slave_name())
    }

    /// Record a status consumed by a wait on this pid.
    pub fn observe(&mut self, status: ExitStatus) {
        if status.is_terminated() {
            self.state = ProcessState::Reaped(status);
        }
    }

    pub(crate) fn set_state(&mut self, state: ProcessState) {
        self.state = state;
    }

    pub fn signal(&self, sig: Signal) -> Result<(), Errno> {
        signal::kill(self.pid, sig)
    }
}

#[derive(Debug, Clone, Default)]
struct Tracked {
    slave_name: Option<String>,
}

/// Pids awaiting a wait
#[derive(Debug, Default)]
pub struct ProcessTable {
    procs: BTreeMap<Pid, Tracked>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, record: &ProcessRecord) {
        self.procs.insert(
            record.pid(),
            Tracked {
                slave_name: record.slave_name().map(str::to_owned),
            },
        );
    }

    /// Track a child forked by other means.
    pub fn track(&mut self, pid: Pid) -> bool {
        self.procs.insert(pid, Tracked::default()).is_none()
    }

    /// Stop tracking `pid` without waiting for it.
    pub fn detach(&mut self, pid: Pid) -> bool {
        let removed = self.procs.remove(&pid).is_some();
        if removed {
            debug!(pid = %pid, "detached");
        }
        removed
    }

    pub fn is_tracked(&self, pid: Pid) -> bool {
        self.procs.contains_key(&pid)
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.procs.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.procs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procs.is_empty()
    }

    /// Collect every tracked child that has exited, without blocking.
    ///
    /// Children still running stay tracked. Results are ordered by pid.
    pub fn reap_nonblocking(&mut self) -> Vec<(Pid, ExitStatus)> {
        let mut reaped = Vec::new();
        self.procs.retain(|&pid, tracked| match wait_raw(pid, libc::WNOHANG) {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(pid = %pid, slave = ?tracked.slave_name, %status, "reaped");
                reaped.push((pid, status));
                false
            }
            Err(Errno::ECHILD) => {
                warn!(pid = %pid, "no longer our child, dropping");
                false
            }
            Err(errno) => {
                warn!(pid = %pid, %errno, "waitpid failed");
                true
            }
        });
        reaped
    }

    /// Block until `pid` terminates or stops.
    ///
    /// A stopped child stays tracked; a terminated one is removed.
    pub fn wait(&mut self, pid: Pid) -> Result<ExitStatus, WaitError> {
        if !self.is_tracked(pid) {
            return Err(WaitError::NotTracked(pid));
        }
        loop {
            match wait_raw(pid, libc::WUNTRACED) {
                Ok(Some(status)) => {
                    if status.is_terminated() {
                        self.procs.remove(&pid);
                    }
                    debug!(pid = %pid, %status, "waited");
                    return Ok(status);
                }
                Ok(None) => continue,
                Err(errno) => {
                    if errno == Errno::ECHILD {
                        self.procs.remove(&pid);
                    }
                    return Err(WaitError::Wait(errno));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_and_detach() {
        let mut table = ProcessTable::new();
        let pid = Pid::from_raw(999_999);
        assert!(table.track(pid));
        assert!(!table.track(pid));
        assert!(table.is_tracked(pid));
        assert_eq!(table.pids().collect::<Vec<_>>(), vec![pid]);
        assert!(table.detach(pid));
        assert!(!table.detach(pid));
        assert!(table.is_empty());
    }

    #[test]
    fn test_reap_drops_foreign_pid() {
        let mut table = ProcessTable::new();
        table.track(Pid::from_raw(1));
        assert!(table.reap_nonblocking().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn test_wait_untracked() {
        let mut table = ProcessTable::new();
        assert!(matches!(
            table.wait(Pid::from_raw(1)),
            Err(WaitError::NotTracked(_))
        ));
    }

    #[test]
    fn test_record_state_transitions() {
        let mut record = ProcessRecord::without_pty(Pid::from_raw(7));
        assert!(record.is_running());
        assert!(record.slave_name().is_none());

        record.observe(ExitStatus::Stopped(Signal::SIGSTOP));
        assert!(record.is_running());

        record.observe(ExitStatus::Exited(0));
        assert_eq!(record.state(), ProcessState::Reaped(ExitStatus::Exited(0)));
    }
}
