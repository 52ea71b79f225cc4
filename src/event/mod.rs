//! Raw and unified event representations.
//!
//! Raw events are device-native notifications as produced by a hardware
//! reader. Unified events are the device-agnostic form delivered to
//! consumers after filtering, translation and pointer constraint.

use std::fmt;

/// Numeric identity of a registered input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags::bitflags! {
    /// Capability classes advertised by a device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u32 {
        const POINTER  = 1 << 0;
        const KEYBOARD = 1 << 1;
        const TOUCH    = 1 << 2;
        const TABLET   = 1 << 3;
    }
}

/// Button transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

/// Key transition. `Repeated` events are synthesized by the repeat engine,
/// never read from hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Pressed,
    Released,
    Repeated,
}

/// Unprocessed hardware notification in device-native units.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub device: DeviceId,
    /// Timestamp in the originating device's native clock, microseconds.
    /// Normalized to the shared monotonic clock during translation.
    pub time_us: u64,
    pub kind: RawEventKind,
}

#[derive(Debug, Clone)]
pub enum RawEventKind {
    /// Relative pointer motion in unaccelerated device units.
    Motion { dx: f64, dy: f64 },
    /// Absolute pointer position (touchpads, tablets in absolute mode).
    MotionAbsolute { x: f64, y: f64 },
    Button { button: u32, pressed: bool },
    Key { key: u32, pressed: bool },
    /// New touch contact. `contact` is the device-local tracking id; the
    /// translator maps it to a stable slot index.
    TouchDown { contact: u64, x: f64, y: f64 },
    TouchMotion { contact: u64, x: f64, y: f64 },
    TouchUp { contact: u64 },
    TabletAxis { x: f64, y: f64, pressure: f64, tilt_x: f64, tilt_y: f64 },
    TabletTip { down: bool, x: f64, y: f64, pressure: f64 },
    TabletButton { button: u32, pressed: bool },
}

/// Translated, device-agnostic event delivered to consumers.
///
/// An event never outlives its device: queued raw events for a closed
/// device are dropped before translation.
#[derive(Debug, Clone)]
pub struct UnifiedEvent {
    pub device: DeviceId,
    /// Monotonic timestamp in microseconds, shared across all devices.
    pub time_us: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    /// Pointer motion. `x`/`y` are the constrained absolute position;
    /// both the accelerated and the raw unaccelerated deltas are
    /// preserved so constraint logic and consumers can choose.
    ///
    /// A motion event does not imply displacement: the constraint
    /// callback runs even on zero proposals and may pin the pointer.
    Motion {
        x: f64,
        y: f64,
        dx: f64,
        dy: f64,
        dx_unaccel: f64,
        dy_unaccel: f64,
    },
    Button {
        button: u32,
        state: ButtonState,
        x: f64,
        y: f64,
    },
    /// `layout` is the keyboard layout index active when the event was
    /// translated.
    Key {
        key: u32,
        state: KeyState,
        layout: usize,
    },
    /// `slot` is stable for the lifetime of the contact and reused only
    /// after the contact's up event.
    TouchDown { slot: u32, x: f64, y: f64 },
    TouchMotion { slot: u32, x: f64, y: f64 },
    TouchUp { slot: u32 },
    TabletAxis { x: f64, y: f64, pressure: f64, tilt_x: f64, tilt_y: f64 },
    TabletTip { down: bool, x: f64, y: f64, pressure: f64 },
    TabletButton { button: u32, state: ButtonState },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_bits_compose() {
        let caps = Capabilities::POINTER | Capabilities::TOUCH;
        assert!(caps.contains(Capabilities::POINTER));
        assert!(caps.contains(Capabilities::TOUCH));
        assert!(!caps.contains(Capabilities::KEYBOARD));
    }

    #[test]
    fn device_id_display() {
        assert_eq!(DeviceId(7).to_string(), "7");
    }
}
