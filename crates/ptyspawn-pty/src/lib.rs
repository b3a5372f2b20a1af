//! Pty-backed process launching
//!
//! Allocates a pseudo-terminal, forks, makes the pty slave the child's
//! controlling terminal and standard streams, and execs the target program.
//! The parent and child synchronize over pipes during the fork/exec window
//! so that by the time [`Spawner::spawn`] returns the program is either
//! running or already reaped.

pub mod allocator;
mod bootstrap;
pub mod session;
pub mod spawn;
pub mod status;
pub mod stream;
mod sync;
pub mod table;
pub mod termios;

pub use allocator::{LegacyPtyScanner, PosixPtyAllocator, PtyAllocator};
pub use session::PtySession;
pub use spawn::{ChildHook, SpawnOptions, Spawner};
pub use status::ExitStatus;
pub use stream::AsyncPtyMaster;
pub use table::{ProcessRecord, ProcessState, ProcessTable};
pub use termios::WindowSize;

pub use nix::errno::Errno;
pub use nix::sys::signal::Signal;
pub use nix::unistd::Pid;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("No free pseudo-terminal available")]
    Exhausted,

    #[error("Out of file descriptors while allocating PTY: {0}")]
    ResourceLimit(Errno),

    #[error("PTY setup failed in {op}: {errno}")]
    Setup { op: &'static str, errno: Errno },

    #[error("PTY I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SpawnError {
    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error("Failed to create synchronization pipes: {0}")]
    ResourceExhausted(Errno),

    #[error("Fork failed: {0}")]
    ForkFailed(Errno),

    /// The child is already reaped; `record` is in the `ExecFailed` state
    /// with its pty closed.
    #[error("Failed to execute program (pid {pid}): {errno}")]
    ExecFailed {
        pid: Pid,
        errno: Errno,
        record: Box<ProcessRecord>,
    },

    #[error("Child setup failed before exec: {0}")]
    Bootstrap(Errno),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

#[derive(Error, Debug)]
pub enum WaitError {
    #[error("Process {0} is not tracked")]
    NotTracked(Pid),

    #[error("waitpid failed: {0}")]
    Wait(Errno),
}
