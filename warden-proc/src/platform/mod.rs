//! Platform substrate for enumeration and signalling.
//!
//! Linux reads the per-pid `/proc` virtual filesystem. The module boundary
//! is where an alternative substrate (e.g. a system snapshot API) would
//! slot in.

use crate::error::InventoryError;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) use linux::{enumerate, read_one};

#[cfg(not(target_os = "linux"))]
mod fallback;
#[cfg(not(target_os = "linux"))]
pub(crate) use fallback::{enumerate, read_one};

/// Raw attributes read from the substrate, before the inventory stamps
/// `first_seen`.
#[derive(Debug, Clone)]
pub(crate) struct RawProcess {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
    pub path: String,
    pub cmdline: String,
}

/// Send `signal` to `pid`, mapping the interesting errnos.
#[cfg(unix)]
pub(crate) fn send_signal(pid: u32, signal: i32) -> Result<(), InventoryError> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if rc == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EPERM) => Err(InventoryError::PrivilegeRequired(pid)),
        Some(libc::ESRCH) => Err(InventoryError::NotFound(pid)),
        _ => Err(InventoryError::Io(err)),
    }
}

/// Whether the pid currently exists (signal 0 probe). EPERM means the
/// process exists but belongs to someone else.
#[cfg(unix)]
pub(crate) fn alive(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

pub(crate) const SIGTERM: i32 = libc::SIGTERM;
pub(crate) const SIGKILL: i32 = libc::SIGKILL;
