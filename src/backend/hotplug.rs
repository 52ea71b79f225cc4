//! Input device hotplug detection.
//!
//! Monitors udev events for /dev/input device nodes (plug/unplug) so the
//! host can register and close devices on the seat core as hardware
//! comes and goes.

use anyhow::{Context, Result};
use log::{debug, info};
use std::os::unix::io::{AsRawFd, RawFd};

/// Hotplug event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotplugEvent {
    /// A device node appeared
    Added(String),
    /// A device node went away
    Removed(String),
}

/// udev-based hotplug monitor for input devices
pub struct HotplugMonitor {
    socket: udev::MonitorSocket,
}

impl HotplugMonitor {
    /// Create a new hotplug monitor for the input subsystem
    pub fn new() -> Result<Self> {
        let socket = udev::MonitorBuilder::new()
            .context("Failed to create udev monitor builder")?
            .match_subsystem("input")
            .context("Failed to match input subsystem")?
            .listen()
            .context("Failed to start udev monitor")?;

        info!("input hotplug monitor initialized");
        Ok(Self { socket })
    }

    /// Get the raw file descriptor for polling
    pub fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    /// Check for hotplug events (non-blocking)
    ///
    /// Only event device nodes (/dev/input/event*) are reported.
    pub fn poll(&mut self) -> Vec<HotplugEvent> {
        let mut events = Vec::new();
        for event in self.socket.iter() {
            let node = match event.devnode() {
                Some(node) => node.to_string_lossy().to_string(),
                None => continue,
            };
            if !node.starts_with("/dev/input/event") {
                continue;
            }
            match event.action().and_then(|a| a.to_str()) {
                Some("add") => {
                    debug!("input device added: {}", node);
                    events.push(HotplugEvent::Added(node));
                }
                Some("remove") => {
                    debug!("input device removed: {}", node);
                    events.push(HotplugEvent::Removed(node));
                }
                _ => {}
            }
        }
        events
    }
}
