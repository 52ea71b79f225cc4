//! libinput-backed raw event reader.
//!
//! Scans /dev/input/event* into a libinput context and converts libinput
//! events into the crate's raw event representation for the seat core's
//! pipeline. Timestamps are passed through as the device-native
//! microsecond clock; the translator normalizes them.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;

use anyhow::{anyhow, Result};
use input::event::keyboard::{KeyState, KeyboardEventTrait};
use input::event::pointer::ButtonState;
use input::event::tablet_tool::{TabletToolEventTrait, TipState};
use input::event::touch::{TouchEventPosition, TouchEventSlot, TouchEventTrait};
use input::event::{Event, EventTrait, KeyboardEvent, PointerEvent, TabletToolEvent, TouchEvent};
use input::{DeviceCapability, Libinput, LibinputInterface};
use log::{debug, info, warn};

use crate::event::{Capabilities, DeviceId, RawEvent, RawEventKind};

#[cfg(feature = "seatd")]
use crate::backend::seatd::SeatSession;
#[cfg(feature = "seatd")]
use std::cell::RefCell;
#[cfg(feature = "seatd")]
use std::rc::Rc;

/// LibinputInterface implementation for direct device access
struct InputInterface;

impl LibinputInterface for InputInterface {
    fn open_restricted(&mut self, path: &Path, flags: i32) -> std::result::Result<OwnedFd, i32> {
        let f = OpenOptions::new()
            .read(true)
            .write((flags & libc::O_WRONLY != 0) || (flags & libc::O_RDWR != 0))
            .custom_flags(flags & !libc::O_WRONLY & !libc::O_RDWR & !libc::O_RDONLY)
            .open(path)
            .map_err(|e| {
                warn!("Cannot open device: {:?}: {}", path, e);
                e.raw_os_error().unwrap_or(-libc::ENOENT)
            })?;
        Ok(OwnedFd::from(f))
    }

    fn close_restricted(&mut self, fd: OwnedFd) {
        drop(fd);
    }
}

/// LibinputInterface implementation using libseat for device access
#[cfg(feature = "seatd")]
struct SeatInputInterface {
    session: Rc<RefCell<SeatSession>>,
}

#[cfg(feature = "seatd")]
impl LibinputInterface for SeatInputInterface {
    fn open_restricted(&mut self, path: &Path, _flags: i32) -> std::result::Result<OwnedFd, i32> {
        let mut session = self.session.borrow_mut();
        match session.open_device(path) {
            Ok(fd) => Ok(fd),
            Err(e) => {
                warn!("libseat: Cannot open device {:?}: {}", path, e);
                Err(-libc::EACCES)
            }
        }
    }

    fn close_restricted(&mut self, fd: OwnedFd) {
        self.session.borrow_mut().close_device(fd);
    }
}

/// A device known to the reader, for mirroring into the gateway.
#[derive(Debug, Clone)]
pub struct ReaderDevice {
    pub id: DeviceId,
    pub path: String,
    pub caps: Capabilities,
}

/// libinput context wrapper producing [`RawEvent`]s.
pub struct LibinputReader {
    input: Libinput,
    fd: RawFd,
    /// Screen size for transforming absolute coordinates.
    screen_width: u32,
    screen_height: u32,
    /// sysname -> assigned device id
    device_ids: HashMap<String, DeviceId>,
    devices: Vec<ReaderDevice>,
    next_id: u32,
}

impl LibinputReader {
    /// Initialize with direct device access (requires permissions on
    /// /dev/input/event*).
    pub fn new(screen_width: u32, screen_height: u32) -> Result<Self> {
        Self::build(Libinput::new_from_path(InputInterface), screen_width, screen_height)
    }

    /// Initialize with libseat-based device access (no root required).
    #[cfg(feature = "seatd")]
    pub fn new_with_seat(
        screen_width: u32,
        screen_height: u32,
        session: Rc<RefCell<SeatSession>>,
    ) -> Result<Self> {
        let interface = SeatInputInterface { session };
        Self::build(Libinput::new_from_path(interface), screen_width, screen_height)
    }

    fn build(mut input: Libinput, screen_width: u32, screen_height: u32) -> Result<Self> {
        // Scan and add devices from /dev/input/event*
        let mut device_count = 0;
        for entry in std::fs::read_dir("/dev/input")
            .map_err(|e| anyhow!("Cannot scan /dev/input: {}", e))?
        {
            let entry = entry?;
            let path = entry.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with("event") {
                let path_str = path.to_str().unwrap_or("");
                if let Some(_device) = input.path_add_device(path_str) {
                    debug!("Input device added: {}", path_str);
                    device_count += 1;
                }
            }
        }

        if device_count == 0 {
            return Err(anyhow!(
                "No input devices found. Check permissions for /dev/input/event*."
            ));
        }

        let fd = input.as_raw_fd();

        // Set fd to non-blocking
        let flags = nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_GETFL)
            .map_err(|e| anyhow!("F_GETFL failed: {}", e))?;
        let mut flags = nix::fcntl::OFlag::from_bits_truncate(flags);
        flags.insert(nix::fcntl::OFlag::O_NONBLOCK);
        nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_SETFL(flags))
            .map_err(|e| anyhow!("F_SETFL failed: {}", e))?;

        info!("libinput reader initialized ({} devices)", device_count);

        Ok(Self {
            input,
            fd,
            screen_width,
            screen_height,
            device_ids: HashMap::new(),
            devices: Vec::new(),
            next_id: 0,
        })
    }

    /// Return libinput fd (for poll)
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Devices observed so far, for mirroring into the gateway.
    pub fn devices(&self) -> &[ReaderDevice] {
        &self.devices
    }

    fn id_for(&mut self, device: &input::Device) -> DeviceId {
        let sysname = device.sysname().to_string();
        if let Some(id) = self.device_ids.get(&sysname) {
            return *id;
        }
        let id = DeviceId(self.next_id);
        self.next_id += 1;

        let mut caps = Capabilities::empty();
        if device.has_capability(DeviceCapability::Pointer) {
            caps |= Capabilities::POINTER;
        }
        if device.has_capability(DeviceCapability::Keyboard) {
            caps |= Capabilities::KEYBOARD;
        }
        if device.has_capability(DeviceCapability::Touch) {
            caps |= Capabilities::TOUCH;
        }
        if device.has_capability(DeviceCapability::TabletTool) {
            caps |= Capabilities::TABLET;
        }

        debug!("device {} -> id {} (caps={:?})", sysname, id, caps);
        self.device_ids.insert(sysname.clone(), id);
        self.devices.push(ReaderDevice {
            id,
            path: format!("/dev/input/{}", sysname),
            caps,
        });
        id
    }

    /// Drain pending libinput events into raw events. Call when the
    /// reader fd is readable.
    pub fn poll_events(&mut self) -> Vec<RawEvent> {
        let mut out = Vec::new();

        if let Err(e) = self.input.dispatch() {
            warn!("libinput dispatch error: {}", e);
            return out;
        }

        while let Some(event) = self.input.next() {
            let device = self.id_for(&event.device());
            match event {
                Event::Keyboard(KeyboardEvent::Key(key_event)) => {
                    out.push(RawEvent {
                        device,
                        time_us: key_event.time_usec(),
                        kind: RawEventKind::Key {
                            key: key_event.key(),
                            pressed: key_event.key_state() == KeyState::Pressed,
                        },
                    });
                }
                Event::Pointer(ptr_event) => match ptr_event {
                    PointerEvent::Motion(m) => {
                        out.push(RawEvent {
                            device,
                            time_us: m.time_usec(),
                            kind: RawEventKind::Motion {
                                dx: m.dx_unaccelerated(),
                                dy: m.dy_unaccelerated(),
                            },
                        });
                    }
                    PointerEvent::MotionAbsolute(m) => {
                        out.push(RawEvent {
                            device,
                            time_us: m.time_usec(),
                            kind: RawEventKind::MotionAbsolute {
                                x: m.absolute_x_transformed(self.screen_width),
                                y: m.absolute_y_transformed(self.screen_height),
                            },
                        });
                    }
                    PointerEvent::Button(b) => {
                        out.push(RawEvent {
                            device,
                            time_us: b.time_usec(),
                            kind: RawEventKind::Button {
                                button: b.button(),
                                pressed: b.button_state() == ButtonState::Pressed,
                            },
                        });
                    }
                    other => {
                        debug!("Unhandled pointer event: {:?}", other);
                    }
                },
                Event::Touch(touch_event) => match touch_event {
                    TouchEvent::Down(t) => {
                        out.push(RawEvent {
                            device,
                            time_us: t.time_usec(),
                            kind: RawEventKind::TouchDown {
                                contact: t.slot().unwrap_or(0) as u64,
                                x: t.x_transformed(self.screen_width),
                                y: t.y_transformed(self.screen_height),
                            },
                        });
                    }
                    TouchEvent::Motion(t) => {
                        out.push(RawEvent {
                            device,
                            time_us: t.time_usec(),
                            kind: RawEventKind::TouchMotion {
                                contact: t.slot().unwrap_or(0) as u64,
                                x: t.x_transformed(self.screen_width),
                                y: t.y_transformed(self.screen_height),
                            },
                        });
                    }
                    TouchEvent::Up(t) => {
                        out.push(RawEvent {
                            device,
                            time_us: t.time_usec(),
                            kind: RawEventKind::TouchUp {
                                contact: t.slot().unwrap_or(0) as u64,
                            },
                        });
                    }
                    other => {
                        debug!("Unhandled touch event: {:?}", other);
                    }
                },
                Event::Tablet(tool_event) => match tool_event {
                    TabletToolEvent::Axis(t) => {
                        out.push(RawEvent {
                            device,
                            time_us: t.time_usec(),
                            kind: RawEventKind::TabletAxis {
                                x: t.x_transformed(self.screen_width),
                                y: t.y_transformed(self.screen_height),
                                pressure: t.pressure(),
                                tilt_x: t.tilt_x(),
                                tilt_y: t.tilt_y(),
                            },
                        });
                    }
                    TabletToolEvent::Tip(t) => {
                        out.push(RawEvent {
                            device,
                            time_us: t.time_usec(),
                            kind: RawEventKind::TabletTip {
                                down: t.tip_state() == TipState::Down,
                                x: t.x_transformed(self.screen_width),
                                y: t.y_transformed(self.screen_height),
                                pressure: t.pressure(),
                            },
                        });
                    }
                    TabletToolEvent::Button(t) => {
                        out.push(RawEvent {
                            device,
                            time_us: t.time_usec(),
                            kind: RawEventKind::TabletButton {
                                button: t.button(),
                                pressed: t.button_state()
                                    == input::event::tablet_tool::ButtonState::Pressed,
                            },
                        });
                    }
                    other => {
                        debug!("Unhandled tablet event: {:?}", other);
                    }
                },
                _ => {}
            }
        }

        out
    }
}
