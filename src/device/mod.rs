//! Device registry and privileged open/close arbitration.
//!
//! Device nodes are opened through a pluggable [`DeviceStrategy`] so that
//! sandboxed session compositors without raw device permissions can
//! delegate to a privileged helper (seatd/logind). The gateway owns every
//! open handle exclusively until the device is released or closed.

mod gateway;

#[cfg(target_os = "linux")]
pub use gateway::DirectStrategy;
pub use gateway::{DeviceGateway, DeviceStrategy};

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use crate::event::{Capabilities, DeviceId};

/// A registered input device.
///
/// The logical registration (id, path, capabilities) survives a
/// `release_all`; only the handle is dropped. A handle is never accessed
/// after close.
#[derive(Debug)]
pub struct Device {
    id: DeviceId,
    path: String,
    caps: Capabilities,
    /// Flags the device was opened with, replayed on reclaim.
    open_flags: i32,
    handle: Option<OwnedFd>,
    /// Cleared when a reclaim fails; such devices are skipped until
    /// explicitly reopened.
    available: bool,
    /// Grab timestamp in microseconds while grabbed.
    grab_time_us: Option<u64>,
}

impl Device {
    pub(crate) fn new(
        id: DeviceId,
        path: String,
        caps: Capabilities,
        open_flags: i32,
        handle: OwnedFd,
    ) -> Self {
        Self {
            id,
            path,
            caps,
            open_flags,
            handle: Some(handle),
            available: true,
            grab_time_us: None,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub(crate) fn open_flags(&self) -> i32 {
        self.open_flags
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// False when the last reclaim failed to reopen this device.
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn is_grabbed(&self) -> bool {
        self.grab_time_us.is_some()
    }

    pub fn grab_time_us(&self) -> Option<u64> {
        self.grab_time_us
    }

    /// Borrow the open handle for polling. `None` while released.
    pub fn fd(&self) -> Option<BorrowedFd<'_>> {
        self.handle.as_ref().map(|fd| fd.as_fd())
    }

    pub(crate) fn take_handle(&mut self) -> Option<OwnedFd> {
        self.handle.take()
    }

    pub(crate) fn set_handle(&mut self, handle: OwnedFd) {
        self.handle = Some(handle);
        self.available = true;
    }

    pub(crate) fn mark_unavailable(&mut self) {
        self.available = false;
    }

    pub(crate) fn set_grab(&mut self, time_us: Option<u64>) {
        self.grab_time_us = time_us;
    }
}
