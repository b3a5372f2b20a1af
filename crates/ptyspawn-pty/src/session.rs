//! An allocated pseudo-terminal pair
//!
//! The master side is always open; the slave is normally opened by name in
//! the child, so the parent holds no slave descriptor.

use crate::termios::WindowSize;
use crate::PtyError;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;

/// A pseudo-terminal master plus the name of its slave device
#[derive(Debug)]
pub struct PtySession {
    master: OwnedFd,
    slave_name: String,
    slave: Option<OwnedFd>,
}

impl PtySession {
    pub fn new(master: OwnedFd, slave_name: impl Into<String>) -> Self {
        Self {
            master,
            slave_name: slave_name.into(),
            slave: None,
        }
    }

    /// Attach an already-open slave descriptor, for allocators that get both
    /// ends at once.
    pub fn with_slave(mut self, slave: OwnedFd) -> Self {
        self.slave = Some(slave);
        self
    }

    pub fn master_fd(&self) -> BorrowedFd<'_> {
        self.master.as_fd()
    }

    pub fn slave_name(&self) -> &str {
        &self.slave_name
    }

    pub fn slave_fd(&self) -> Option<BorrowedFd<'_>> {
        self.slave.as_ref().map(|fd| fd.as_fd())
    }

    /// Open the slave device by name without making it a controlling terminal.
    pub fn open_slave(&self) -> Result<File, PtyError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&self.slave_name)?;
        Ok(file)
    }

    /// Close any slave descriptor held by this process.
    ///
    /// Once only the child holds the slave open, its exit hangs up the line
    /// and reads on the master report end of stream.
    pub fn release_slave(&mut self) -> bool {
        self.slave.take().is_some()
    }

    pub fn set_cloexec(&self) -> Result<(), PtyError> {
        fcntl(self.master.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
            .map_err(|errno| PtyError::Setup {
                op: "fcntl(F_SETFD)",
                errno,
            })?;
        Ok(())
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), PtyError> {
        set_nonblocking(self.master.as_raw_fd(), nonblocking)
    }

    pub fn resize(&self, size: WindowSize) -> Result<(), PtyError> {
        let winsize = size.to_winsize();
        unsafe {
            let ret = libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &winsize as *const _);
            if ret < 0 {
                return Err(PtyError::IoError(io::Error::last_os_error()));
            }
        }
        Ok(())
    }

    pub fn window_size(&self) -> Result<WindowSize, PtyError> {
        WindowSize::from_fd(self.master.as_raw_fd()).map_err(PtyError::IoError)
    }

    /// Give up the session, keeping only the master descriptor.
    pub fn into_master(self) -> OwnedFd {
        self.master
    }
}

impl AsRawFd for PtySession {
    fn as_raw_fd(&self) -> RawFd {
        self.master.as_raw_fd()
    }
}

impl AsFd for PtySession {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.master.as_fd()
    }
}

pub(crate) fn set_nonblocking(fd: RawFd, nonblocking: bool) -> Result<(), PtyError> {
    let setup = |errno| PtyError::Setup {
        op: "fcntl(F_SETFL)",
        errno,
    };
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL).map_err(setup)?);
    let flags = if nonblocking {
        flags | OFlag::O_NONBLOCK
    } else {
        flags & !OFlag::O_NONBLOCK
    };
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(setup)?;
    Ok(())
}
