//! libseat session backend.
//!
//! Provides rootless device access via seatd or logind and plugs into the
//! gateway as a [`DeviceStrategy`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::rc::Rc;
use std::sync::mpsc;

use anyhow::{Context, Result};
use libseat::{Seat, SeatEvent, SeatRef};
use log::{debug, info, trace, warn};

use crate::device::DeviceStrategy;
use crate::error::InputError;

/// Session event from libseat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Session enabled (VT acquired) - reclaim devices
    Enable,
    /// Session disabled (VT released) - release devices
    Disable,
}

/// Shared state for libseat callback
struct SeatState {
    /// Event sender
    event_tx: mpsc::Sender<SessionEvent>,
    /// Is session currently active?
    active: bool,
}

/// libseat session manager
pub struct SeatSession {
    /// libseat handle
    seat: Seat,
    /// Shared state (kept for callback lifetime)
    #[allow(dead_code)]
    state: Rc<RefCell<SeatState>>,
    /// Event receiver
    event_rx: mpsc::Receiver<SessionEvent>,
    /// Opened devices (dup'd fd -> path)
    devices: HashMap<RawFd, String>,
}

impl SeatSession {
    /// Open a new seat session
    pub fn open() -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel();

        let state = Rc::new(RefCell::new(SeatState {
            event_tx,
            active: false,
        }));

        let state_clone = state.clone();

        let mut seat = Seat::open(move |seat_ref: &mut SeatRef, event: SeatEvent| {
            let mut state = state_clone.borrow_mut();
            match event {
                SeatEvent::Enable => {
                    info!("libseat: session enabled");
                    state.active = true;
                    let _ = state.event_tx.send(SessionEvent::Enable);
                }
                SeatEvent::Disable => {
                    info!("libseat: session disabled");
                    state.active = false;
                    // Must call disable() to acknowledge
                    if let Err(e) = seat_ref.disable() {
                        warn!("libseat: failed to disable seat: {}", e);
                    }
                    let _ = state.event_tx.send(SessionEvent::Disable);
                }
            }
        })
        .context("Failed to open libseat session")?;

        info!("libseat: opened seat '{}'", seat.name());

        Ok(Self {
            seat,
            state,
            event_rx,
            devices: HashMap::new(),
        })
    }

    /// Check if session is currently active
    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    /// Get pollable file descriptor for event loop integration
    pub fn get_fd(&mut self) -> Result<RawFd> {
        let borrowed_fd = self.seat.get_fd().context("Failed to get seat fd")?;
        Ok(borrowed_fd.as_raw_fd())
    }

    /// Dispatch pending events (call when fd is readable)
    ///
    /// Returns true if events were processed
    pub fn dispatch(&mut self) -> Result<bool> {
        let count = self
            .seat
            .dispatch(0)
            .context("Failed to dispatch seat events")?;
        Ok(count > 0)
    }

    /// Try to receive a session event (non-blocking)
    pub fn try_recv_event(&self) -> Option<SessionEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Open a device and return a dup'd owned fd.
    ///
    /// The fd is valid only while the session is active.
    pub fn open_device<P: AsRef<Path>>(&mut self, path: P) -> Result<OwnedFd> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let device = self
            .seat
            .open_device(&path)
            .with_context(|| format!("Failed to open device: {}", path_str))?;

        let raw_fd = device.as_fd().as_raw_fd();
        debug!("libseat: opened device {} (fd={})", path_str, raw_fd);

        // libseat manages the fd lifecycle, we dup it for safety
        let dup_fd = nix::unistd::dup(raw_fd).context("Failed to dup device fd")?;
        self.devices.insert(dup_fd, path_str);
        Ok(unsafe { OwnedFd::from_raw_fd(dup_fd) })
    }

    /// Close a device previously opened through this session.
    ///
    /// libseat closes its side when the session ends; our dup'd fd is
    /// closed here.
    pub fn close_device(&mut self, fd: OwnedFd) {
        if let Some(path) = self.devices.remove(&fd.as_raw_fd()) {
            trace!("libseat: closed device {}", path);
        }
        drop(fd);
    }

    /// Request VT switch to another session
    pub fn switch_session(&mut self, session: i32) -> Result<()> {
        self.seat
            .switch_session(session)
            .with_context(|| format!("Failed to switch to session {}", session))?;
        Ok(())
    }
}

impl Drop for SeatSession {
    fn drop(&mut self) {
        info!("libseat: closing session");
        self.devices.clear();
    }
}

/// [`DeviceStrategy`] backed by a libseat session, for gateways running
/// without raw device permissions.
pub struct SeatStrategy {
    session: Rc<RefCell<SeatSession>>,
}

impl SeatStrategy {
    pub fn new(session: Rc<RefCell<SeatSession>>) -> Self {
        Self { session }
    }
}

impl DeviceStrategy for SeatStrategy {
    fn open(&mut self, path: &Path, _flags: i32) -> crate::error::Result<OwnedFd> {
        let mut session = self.session.borrow_mut();
        session.open_device(path).map_err(|e| {
            warn!("libseat: Cannot open device {:?}: {}", path, e);
            InputError::PermissionDenied {
                path: path.display().to_string(),
            }
        })
    }

    fn close(&mut self, fd: OwnedFd) {
        self.session.borrow_mut().close_device(fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require seatd or logind to be running and the user to
    // have appropriate permissions. Skip in CI.

    #[test]
    #[ignore]
    fn open_session() {
        let session = SeatSession::open();
        assert!(session.is_ok(), "Failed to open seat session");
    }
}
