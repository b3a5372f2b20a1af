//! Fork/exec handshake channels
//!
//! Three pipes live only for the fork/exec window:
//! - ready: child -> parent, "the pty is set up"
//! - go: parent -> child, "proceed to exec"
//! - relay: child -> parent, carries the errno of a failed setup or exec.
//!   Its write end is close-on-exec, so a successful exec shows up as EOF.
//!
//! Every end is created close-on-exec. The read/write paths only use raw
//! syscalls because the child side runs between fork and exec.

use nix::errno::Errno;
use std::mem::size_of;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

const SIGNAL_BYTE: u8 = b'R';

/// Write half of a one-shot signal
pub(crate) struct SignalSender {
    fd: OwnedFd,
}

/// Read half of a one-shot signal
pub(crate) struct SignalReceiver {
    fd: OwnedFd,
}

fn one_shot() -> Result<(SignalSender, SignalReceiver), Errno> {
    let (rx, tx) = cloexec_pipe()?;
    Ok((SignalSender { fd: tx }, SignalReceiver { fd: rx }))
}

impl SignalSender {
    pub fn notify(self) -> Result<(), Errno> {
        write_all(self.fd.as_raw_fd(), &[SIGNAL_BYTE])
    }
}

impl SignalReceiver {
    /// Block until the peer signals. `Ok(false)` means the peer closed its
    /// end without signalling, i.e. it died.
    pub fn wait(self) -> Result<bool, Errno> {
        let mut byte = [0u8; 1];
        Ok(read_full(self.fd.as_raw_fd(), &mut byte)? == 1)
    }
}

pub(crate) struct RelayWriter {
    fd: OwnedFd,
}

pub(crate) struct RelayReader {
    fd: OwnedFd,
}

impl RelayWriter {
    pub fn report(&self, errno: Errno) {
        let _ = write_all(self.fd.as_raw_fd(), &(errno as i32).to_ne_bytes());
    }

    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl RelayReader {
    /// `Ok(None)` when the writer went away silently, which means exec
    /// succeeded; `Ok(Some(errno))` when the child reported a failure.
    pub fn outcome(self) -> Result<Option<Errno>, Errno> {
        let mut buf = [0u8; size_of::<i32>()];
        match read_full(self.fd.as_raw_fd(), &mut buf)? {
            0 => Ok(None),
            n if n == buf.len() => Ok(Some(Errno::from_raw(i32::from_ne_bytes(buf)))),
            _ => Err(Errno::EIO),
        }
    }
}

/// All three handshake pipes, before the fork splits them up
pub(crate) struct SyncChannel {
    ready: (SignalSender, SignalReceiver),
    go: (SignalSender, SignalReceiver),
    relay: (RelayWriter, RelayReader),
}

pub(crate) struct ParentEnds {
    pub ready: SignalReceiver,
    pub go: SignalSender,
    pub relay: RelayReader,
}

pub(crate) struct ChildEnds {
    pub ready: SignalSender,
    pub go: SignalReceiver,
    pub relay: RelayWriter,
}

impl SyncChannel {
    pub fn new() -> Result<Self, Errno> {
        let ready = one_shot()?;
        let go = one_shot()?;
        let (rx, tx) = cloexec_pipe()?;
        Ok(Self {
            ready,
            go,
            relay: (RelayWriter { fd: tx }, RelayReader { fd: rx }),
        })
    }

    /// Keep the parent's ends, closing the child's.
    pub fn into_parent(self) -> ParentEnds {
        let Self { ready, go, relay } = self;
        drop((ready.0, go.1, relay.0));
        ParentEnds {
            ready: ready.1,
            go: go.0,
            relay: relay.1,
        }
    }

    /// Keep the child's ends, closing the parent's.
    pub fn into_child(self) -> ChildEnds {
        let Self { ready, go, relay } = self;
        drop((ready.1, go.0, relay.1));
        ChildEnds {
            ready: ready.0,
            go: go.1,
            relay: relay.0,
        }
    }
}

/// A close-on-exec pipe whose ends both sit above stderr.
///
/// A caller running with 0-2 closed would otherwise get pipe ends there,
/// and the child's dup2 of the slave onto 0-2 would silently replace them.
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd), Errno> {
    let (rx, tx) = raw_pipe()?;
    Ok((above_stdio(rx)?, above_stdio(tx)?))
}

#[cfg(not(target_vendor = "apple"))]
fn raw_pipe() -> Result<(OwnedFd, OwnedFd), Errno> {
    nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
}

#[cfg(target_vendor = "apple")]
fn raw_pipe() -> Result<(OwnedFd, OwnedFd), Errno> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};

    let (rx, tx) = nix::unistd::pipe()?;
    for fd in [&rx, &tx] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((rx, tx))
}

fn above_stdio(fd: OwnedFd) -> Result<OwnedFd, Errno> {
    use nix::fcntl::{fcntl, FcntlArg};

    if fd.as_raw_fd() > libc::STDERR_FILENO {
        return Ok(fd);
    }
    let moved = fcntl(
        fd.as_raw_fd(),
        FcntlArg::F_DUPFD_CLOEXEC(libc::STDERR_FILENO + 1),
    )?;
    // SAFETY: F_DUPFD_CLOEXEC returned a fresh descriptor we now own; the
    // low one is closed when `fd` drops.
    Ok(unsafe { OwnedFd::from_raw_fd(moved) })
}

fn write_all(fd: RawFd, mut buf: &[u8]) -> Result<(), Errno> {
    while !buf.is_empty() {
        let n = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(errno),
            }
        }
        buf = &buf[n as usize..];
    }
    Ok(())
}

/// Read until `buf` is full or EOF, returning the byte count.
fn read_full(fd: RawFd, buf: &mut [u8]) -> Result<usize, Errno> {
    let mut filled = 0;
    while filled < buf.len() {
        let rest = &mut buf[filled..];
        let n = unsafe { libc::read(fd, rest.as_mut_ptr().cast(), rest.len()) };
        match n {
            0 => break,
            n if n < 0 => match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(errno),
            },
            n => filled += n as usize,
        }
    }
    Ok(filled)
}
