//! Spawning programs on a fresh pty
//!
//! [`Spawner::spawn`] allocates a pty, forks, and runs the handshake:
//!
//! ```text
//! parent                         child
//!   |-- fork ------------------->  setsid, open slave on 0/1/2,
//!   |                              terminal modes, signal reset
//!   |<------------------ ready --|
//!   release slave                |
//!   |-- go --------------------->|
//!   |                              close inherited fds, execvp
//!   |<---------- relay: EOF or errno
//! ```
//!
//! When `spawn` returns, the program has either been exec'd or has been
//! reaped; no half-initialized child escapes.

use crate::allocator::{PosixPtyAllocator, PtyAllocator};
use crate::bootstrap::{self, ChildPlan};
use crate::status::reap_blocking;
use crate::sync::{ParentEnds, SyncChannel};
use crate::table::{ProcessRecord, ProcessState, ProcessTable};
use crate::termios::{invoking_termios, invoking_window_size, TtyPlan, WindowSize};
use crate::{PtyError, SpawnError};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{fork, ForkResult, Pid};
use std::collections::BTreeSet;
use std::ffi::{CString, OsStr};
use std::fmt;
use std::{iter, ptr};
use std::os::unix::ffi::OsStrExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Callback run in the forked child right before inherited descriptors are
/// closed.
///
/// It runs between fork and exec, so it must restrict itself to
/// async-signal-safe calls.
pub type ChildHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Default)]
pub struct SpawnOptions {
    /// Skip the "sane" terminal mode initialization.
    pub no_tty_init: bool,
    /// Do not copy the invoking terminal's modes and size.
    pub no_tty_copy: bool,
    /// Log the command line before spawning.
    pub echo: bool,
    /// Signals the child starts with ignored instead of default.
    pub kill_ignore: BTreeSet<Signal>,
    /// Initial window size; takes precedence over a copied size.
    pub window_size: Option<WindowSize>,
    pub close_hook: Option<ChildHook>,
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_tty_init(mut self, value: bool) -> Self {
        self.no_tty_init = value;
        self
    }

    pub fn no_tty_copy(mut self, value: bool) -> Self {
        self.no_tty_copy = value;
        self
    }

    pub fn echo(mut self, value: bool) -> Self {
        self.echo = value;
        self
    }

    pub fn ignore_signal(mut self, signal: Signal) -> Self {
        self.kill_ignore.insert(signal);
        self
    }

    pub fn window_size(mut self, size: WindowSize) -> Self {
        self.window_size = Some(size);
        self
    }

    pub fn close_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.close_hook = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for SpawnOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnOptions")
            .field("no_tty_init", &self.no_tty_init)
            .field("no_tty_copy", &self.no_tty_copy)
            .field("echo", &self.echo)
            .field("kill_ignore", &self.kill_ignore)
            .field("window_size", &self.window_size)
            .field("close_hook", &self.close_hook.is_some())
            .finish()
    }
}

/// Launches programs on ptys from a given allocator
#[derive(Debug, Clone, Default)]
pub struct Spawner<A = PosixPtyAllocator> {
    allocator: A,
}

impl Spawner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<A: PtyAllocator> Spawner<A> {
    pub fn with_allocator(allocator: A) -> Self {
        Self { allocator }
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Spawn `argv` on a new pty and track it in `table`.
    ///
    /// `argv[0]` is looked up on `PATH` like `execvp` does. The child
    /// inherits this process's environment.
    pub fn spawn<S: AsRef<OsStr>>(
        &self,
        table: &mut ProcessTable,
        argv: &[S],
        options: &SpawnOptions,
    ) -> Result<ProcessRecord, SpawnError> {
        let argv = to_cstrings(argv)?;
        let command_line = display_command(&argv);
        if options.echo {
            info!(command = %command_line, "spawning");
        }

        // Read the invoking terminal before allocating; with stdin closed
        // the new master may land on fd 0.
        let window = options.window_size.or_else(|| {
            if options.no_tty_copy {
                None
            } else {
                invoking_window_size()
            }
        });
        let tty = TtyPlan {
            copy: if options.no_tty_copy {
                None
            } else {
                invoking_termios()
            },
            init: !options.no_tty_init,
        };

        let pty = self.allocator.allocate()?;
        pty.set_cloexec()?;
        if let Some(size) = window {
            pty.resize(size)?;
        }
        let slave_path = CString::new(pty.slave_name()).map_err(|_| PtyError::Setup {
            op: "ptsname",
            errno: Errno::EINVAL,
        })?;

        let argv_ptrs: Vec<*const libc::c_char> = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(iter::once(ptr::null()))
            .collect();

        let channel = SyncChannel::new().map_err(SpawnError::ResourceExhausted)?;
        let plan = ChildPlan {
            program: &argv[0],
            argv: &argv_ptrs,
            slave_path: &slave_path,
            tty: &tty,
            kill_ignore: &options.kill_ignore,
            close_hook: options.close_hook.as_ref(),
        };

        // SAFETY: the child only runs `bootstrap::run`, which sticks to raw
        // syscalls on data prepared above, never allocates and never returns.
        match unsafe { fork() } {
            Err(errno) => Err(SpawnError::ForkFailed(errno)),
            Ok(ForkResult::Child) => bootstrap::run(&plan, channel.into_child()),
            Ok(ForkResult::Parent { child }) => {
                debug!(pid = %child, slave = %pty.slave_name(), "forked");
                let record = ProcessRecord::spawned(child, pty);
                let record = handshake(record, channel.into_parent())?;

                table.register(&record);
                info!(
                    pid = %child,
                    slave = %record.slave_name().unwrap_or_default(),
                    command = %command_line,
                    "spawned process"
                );
                Ok(record)
            }
        }
    }
}

fn handshake(mut record: ProcessRecord, ends: ParentEnds) -> Result<ProcessRecord, SpawnError> {
    let ParentEnds { ready, go, relay } = ends;
    let pid = record.pid();

    match ready.wait() {
        Ok(true) => {}
        Ok(false) => {
            let errno = relay.outcome().ok().flatten().unwrap_or(Errno::UnknownErrno);
            reap_quietly(pid);
            warn!(pid = %pid, %errno, "child failed during setup");
            return Err(SpawnError::Bootstrap(errno));
        }
        Err(errno) => {
            abandon(pid);
            return Err(SpawnError::Bootstrap(errno));
        }
    }

    if let Some(pty) = record.pty_mut() {
        if pty.release_slave() {
            debug!(pid = %pid, "released parent copy of slave");
        }
    }

    // A failed notify means the child is gone; the relay tells us why.
    if let Err(errno) = go.notify() {
        debug!(pid = %pid, %errno, "go signal not delivered");
    }

    match relay.outcome() {
        Ok(None) => Ok(record),
        Ok(Some(errno)) => {
            reap_quietly(pid);
            warn!(pid = %pid, %errno, "exec failed");
            drop(record.take_pty());
            record.set_state(ProcessState::ExecFailed(errno));
            Err(SpawnError::ExecFailed {
                pid,
                errno,
                record: Box::new(record),
            })
        }
        Err(errno) => {
            abandon(pid);
            Err(SpawnError::Bootstrap(errno))
        }
    }
}

fn reap_quietly(pid: Pid) {
    if let Err(errno) = reap_blocking(pid) {
        warn!(pid = %pid, %errno, "failed to reap child");
    }
}

/// Kill and reap a child whose handshake broke down.
fn abandon(pid: Pid) {
    let _ = signal::kill(pid, Signal::SIGKILL);
    reap_quietly(pid);
}

fn to_cstrings<S: AsRef<OsStr>>(argv: &[S]) -> Result<Vec<CString>, SpawnError> {
    if argv.is_empty() {
        return Err(SpawnError::InvalidCommand("empty argument list".to_string()));
    }
    argv.iter()
        .map(|arg| {
            CString::new(arg.as_ref().as_bytes()).map_err(|_| {
                SpawnError::InvalidCommand(format!(
                    "argument contains a NUL byte: {:?}",
                    arg.as_ref()
                ))
            })
        })
        .collect()
}

fn display_command(argv: &[CString]) -> String {
    argv.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}
