//! Pluggable open/close strategy and bulk release/reclaim.

use std::os::fd::OwnedFd;
use std::path::Path;

use log::{debug, info, warn};

use crate::error::{InputError, Result};
use crate::event::{Capabilities, DeviceId};

use super::Device;

/// Host-supplied open/close behavior for privileged device nodes.
///
/// The strategy may delegate to a helper process or thread, but the call
/// is synchronous from the gateway's point of view: `open` blocks until
/// the strategy responds or fails.
pub trait DeviceStrategy {
    /// Open `path` with raw `O_*` flag bits.
    fn open(&mut self, path: &Path, flags: i32) -> Result<OwnedFd>;

    /// Close a handle previously returned by `open`.
    fn close(&mut self, fd: OwnedFd);
}

/// Direct strategy: opens device nodes with ordinary filesystem access.
/// Requires read permission on `/dev/input/event*` (root or the `input`
/// group).
#[cfg(target_os = "linux")]
pub struct DirectStrategy;

#[cfg(target_os = "linux")]
impl DeviceStrategy for DirectStrategy {
    fn open(&mut self, path: &Path, flags: i32) -> Result<OwnedFd> {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        // O_NONBLOCK so a readiness loop never stalls on a device read.
        let file = OpenOptions::new()
            .read(true)
            .write((flags & libc::O_WRONLY != 0) || (flags & libc::O_RDWR != 0))
            .custom_flags(
                (flags & !libc::O_WRONLY & !libc::O_RDWR & !libc::O_RDONLY) | libc::O_NONBLOCK,
            )
            .open(path)
            .map_err(|e| {
                warn!("Cannot open device: {:?}: {}", path, e);
                let path = path.display().to_string();
                match e.raw_os_error() {
                    Some(libc::EACCES) | Some(libc::EPERM) => InputError::PermissionDenied { path },
                    Some(libc::EBUSY) => InputError::DeviceBusy { path },
                    _ => InputError::DeviceUnavailable { path },
                }
            })?;
        Ok(OwnedFd::from(file))
    }

    fn close(&mut self, fd: OwnedFd) {
        drop(fd);
    }
}

/// Arbitrates privileged open/close of device files.
///
/// Holds exactly one strategy at a time. Devices are kept in enumeration
/// order, which `release_all`/`reclaim_all` preserve across a VT or
/// session switch.
pub struct DeviceGateway {
    strategy: Box<dyn DeviceStrategy>,
    devices: Vec<Device>,
    next_id: u32,
}

impl DeviceGateway {
    pub fn new(strategy: Box<dyn DeviceStrategy>) -> Self {
        Self {
            strategy,
            devices: Vec::new(),
            next_id: 0,
        }
    }

    /// Replace the open/close strategy. Handles opened by the previous
    /// strategy stay valid; only future opens and closes go through the
    /// new one.
    pub fn set_strategy(&mut self, strategy: Box<dyn DeviceStrategy>) {
        self.strategy = strategy;
        debug!("device strategy replaced");
    }

    /// Register a device node and open it through the current strategy.
    /// The returned id stays valid until `remove_device`.
    pub fn add_device(&mut self, path: &str, flags: i32, caps: Capabilities) -> Result<DeviceId> {
        let fd = self.strategy.open(Path::new(path), flags)?;
        let id = DeviceId(self.next_id);
        self.next_id += 1;
        debug!("device added: {} (id={}, caps={:?})", path, id, caps);
        self.devices
            .push(Device::new(id, path.to_string(), caps, flags, fd));
        Ok(id)
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id() == id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Close and unregister a device (hot-unplug or explicit close).
    pub fn remove_device(&mut self, id: DeviceId) -> Result<()> {
        let pos = self
            .devices
            .iter()
            .position(|d| d.id() == id)
            .ok_or(InputError::UnknownDevice(id))?;
        let mut dev = self.devices.remove(pos);
        if let Some(fd) = dev.take_handle() {
            self.strategy.close(fd);
        }
        debug!("device removed: {} (id={})", dev.path(), id);
        Ok(())
    }

    pub fn grab_device(&mut self, id: DeviceId, time_us: u64) -> Result<()> {
        self.device_mut(id)?.set_grab(Some(time_us));
        Ok(())
    }

    pub fn ungrab_device(&mut self, id: DeviceId) -> Result<()> {
        self.device_mut(id)?.set_grab(None);
        Ok(())
    }

    /// Close every tracked handle without destroying the logical
    /// registrations. Intended for VT/session switch-away; ids,
    /// capabilities and enumeration order survive.
    pub fn release_all(&mut self) {
        let mut released = 0;
        for dev in &mut self.devices {
            if let Some(fd) = dev.take_handle() {
                self.strategy.close(fd);
                released += 1;
            }
        }
        info!("released {} devices", released);
    }

    /// Reopen every released device through the current strategy, in the
    /// enumeration order the devices held before release. A device that
    /// fails to reopen is marked unavailable; the rest proceed.
    /// Already-open devices are left untouched, so a second reclaim
    /// without an intervening release is a no-op.
    pub fn reclaim_all(&mut self) {
        let mut reclaimed = 0;
        for dev in &mut self.devices {
            if dev.is_open() {
                continue;
            }
            match self.strategy.open(Path::new(dev.path()), dev.open_flags()) {
                Ok(fd) => {
                    dev.set_handle(fd);
                    reclaimed += 1;
                }
                Err(e) => {
                    warn!("reclaim failed for {}: {}", dev.path(), e);
                    dev.mark_unavailable();
                }
            }
        }
        info!("reclaimed {} devices", reclaimed);
    }

    fn device_mut(&mut self, id: DeviceId) -> Result<&mut Device> {
        self.devices
            .iter_mut()
            .find(|d| d.id() == id)
            .ok_or(InputError::UnknownDevice(id))
    }
}
