//! Pseudo-terminal allocation
//!
//! [`PosixPtyAllocator`] uses the platform clone device. [`LegacyPtyScanner`]
//! walks the old BSD-style `/dev/ptyXY` nodes for systems that still have
//! them. Both tell "no pty left" apart from "no descriptors left" by probing
//! a control path once a master cannot be opened.

use crate::session::PtySession;
use crate::PtyError;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::pty::{grantpt, posix_openpt, unlockpt, PtyMaster};
use nix::unistd::{access, AccessFlags};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{FromRawFd, IntoRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File opened to decide whether a failed master open means exhaustion.
pub const CONTROL_PROBE_PATH: &str = "/dev/null";

pub trait PtyAllocator {
    fn allocate(&self) -> Result<PtySession, PtyError>;
}

impl<A: PtyAllocator + ?Sized> PtyAllocator for &A {
    fn allocate(&self) -> Result<PtySession, PtyError> {
        (**self).allocate()
    }
}

impl<A: PtyAllocator + ?Sized> PtyAllocator for Box<A> {
    fn allocate(&self) -> Result<PtySession, PtyError> {
        (**self).allocate()
    }
}

/// Classify a failure to open any pty master.
///
/// If the control path opens, the system has descriptors to spare and the
/// pty pool itself is empty.
pub fn classify_open_failure(errno: Errno, probe: &Path) -> PtyError {
    match File::open(probe) {
        Ok(_) => {
            debug!(%errno, "pty master unavailable, control probe ok");
            PtyError::Exhausted
        }
        Err(e) => {
            debug!(%errno, probe_error = %e, "control probe failed as well");
            PtyError::ResourceLimit(errno)
        }
    }
}

/// Allocator over `posix_openpt`
#[derive(Debug, Clone, Default)]
pub struct PosixPtyAllocator {
    _private: (),
}

impl PosixPtyAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PtyAllocator for PosixPtyAllocator {
    fn allocate(&self) -> Result<PtySession, PtyError> {
        let master = posix_openpt(OFlag::O_RDWR | OFlag::O_NOCTTY)
            .map_err(|errno| classify_open_failure(errno, Path::new(CONTROL_PROBE_PATH)))?;

        grantpt(&master).map_err(|errno| PtyError::Setup {
            op: "grantpt",
            errno,
        })?;
        unlockpt(&master).map_err(|errno| PtyError::Setup {
            op: "unlockpt",
            errno,
        })?;
        let slave_name = slave_name(&master).map_err(|errno| PtyError::Setup {
            op: "ptsname",
            errno,
        })?;

        let master = unsafe { OwnedFd::from_raw_fd(master.into_raw_fd()) };
        debug!(slave = %slave_name, "allocated pty");
        Ok(PtySession::new(master, slave_name))
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn slave_name(master: &PtyMaster) -> nix::Result<String> {
    nix::pty::ptsname_r(master)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn slave_name(master: &PtyMaster) -> nix::Result<String> {
    // ptsname uses a static buffer; the name is copied out before returning.
    unsafe { nix::pty::ptsname(master) }
}

const BANKS: &str = "pqrstuvwxyzabcde";
const UNITS: &str = "0123456789abcdef";

/// Allocator scanning BSD-style `ptyXY` master nodes
#[derive(Debug, Clone)]
pub struct LegacyPtyScanner {
    dev_dir: PathBuf,
}

impl LegacyPtyScanner {
    pub fn new() -> Self {
        Self::with_dev_dir("/dev")
    }

    pub fn with_dev_dir(dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dev_dir.into(),
        }
    }

    /// The `(master, slave)` path pair for a bank/unit position.
    pub fn node_pair(&self, bank: char, unit: char) -> (PathBuf, PathBuf) {
        (
            self.dev_dir.join(format!("pty{bank}{unit}")),
            self.dev_dir.join(format!("tty{bank}{unit}")),
        )
    }
}

impl Default for LegacyPtyScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PtyAllocator for LegacyPtyScanner {
    fn allocate(&self) -> Result<PtySession, PtyError> {
        let mut last_errno = Errno::ENOENT;

        for bank in BANKS.chars() {
            for unit in UNITS.chars() {
                let (master_path, slave_path) = self.node_pair(bank, unit);
                let master = match OpenOptions::new()
                    .read(true)
                    .write(true)
                    .custom_flags(libc::O_NOCTTY)
                    .open(&master_path)
                {
                    Ok(file) => file,
                    // A bank without its first node is absent altogether.
                    Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                    Err(e) => {
                        last_errno = errno_of(&e);
                        if !matches!(last_errno, Errno::EIO | Errno::EBUSY | Errno::EACCES) {
                            debug!(
                                path = %master_path.display(),
                                error = %e,
                                "pty node open failed"
                            );
                        }
                        continue;
                    }
                };

                if access(&slave_path, AccessFlags::R_OK | AccessFlags::W_OK).is_err() {
                    continue;
                }

                let slave_name = slave_path.to_string_lossy().into_owned();
                debug!(
                    master = %master_path.display(),
                    slave = %slave_name,
                    "allocated legacy pty"
                );
                return Ok(PtySession::new(OwnedFd::from(master), slave_name));
            }
        }

        Err(classify_open_failure(last_errno, Path::new(CONTROL_PROBE_PATH)))
    }
}

fn errno_of(e: &io::Error) -> Errno {
    e.raw_os_error().map(Errno::from_raw).unwrap_or(Errno::UnknownErrno)
}
