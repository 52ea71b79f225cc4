//! Raw-to-unified event translation.
//!
//! Owns per-device translation state: the native-to-monotonic clock
//! offset, the multi-touch slot table and the shared pointer position.
//! Motion events pass through the active pointer constraint before the
//! position is committed and the event emitted.

use std::collections::HashMap;
use std::time::Instant;

use log::{debug, trace};

use crate::event::{
    ButtonState, DeviceId, EventKind, KeyState, RawEvent, RawEventKind, UnifiedEvent,
};
use crate::keyboard::KeyboardState;
use crate::pointer::{ConstraintSlot, PointerConstraint, PointerPosition};

/// Lowest-free-slot table for multi-touch contacts on one device.
///
/// Two simultaneous contacts never share a slot; a slot freed by an up
/// event is reusable by the next down immediately.
#[derive(Debug, Default)]
struct SlotTable {
    slots: Vec<Option<u64>>,
}

impl SlotTable {
    fn acquire(&mut self, contact: u64) -> u32 {
        if let Some(slot) = self.lookup(contact) {
            return slot;
        }
        if let Some(free) = self.slots.iter().position(|s| s.is_none()) {
            self.slots[free] = Some(contact);
            free as u32
        } else {
            self.slots.push(Some(contact));
            (self.slots.len() - 1) as u32
        }
    }

    fn lookup(&self, contact: u64) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| *s == Some(contact))
            .map(|i| i as u32)
    }

    fn release(&mut self, contact: u64) -> Option<u32> {
        let slot = self.lookup(contact)?;
        self.slots[slot as usize] = None;
        Some(slot)
    }
}

struct DeviceState {
    /// Native-to-monotonic clock offset in microseconds, fixed at the
    /// first event observed from this device.
    clock_offset_us: i64,
    slots: SlotTable,
}

/// Converts filtered raw events into unified events.
pub struct Translator {
    origin: Instant,
    devices: HashMap<DeviceId, DeviceState>,
    pointer: PointerPosition,
    constraint: ConstraintSlot,
    /// Flat acceleration multiplier applied to relative motion.
    accel_factor: f64,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

impl Translator {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            devices: HashMap::new(),
            pointer: PointerPosition::default(),
            constraint: ConstraintSlot::default(),
            accel_factor: 1.0,
        }
    }

    /// Set the pointer acceleration speed in `[-1.0, 1.0]`;
    /// 0.0 leaves motion unaccelerated.
    pub fn set_accel_speed(&mut self, speed: f64) {
        self.accel_factor = 1.0 + speed.clamp(-1.0, 1.0);
        debug!("pointer accel factor set to {}", self.accel_factor);
    }

    pub fn pointer_position(&self) -> PointerPosition {
        self.pointer
    }

    pub fn set_pointer_position(&mut self, x: f64, y: f64) {
        self.pointer = PointerPosition { x, y };
    }

    /// Install a pointer constraint; the previous one (if any) is
    /// dropped, running its teardown.
    pub fn set_constraint(&mut self, constraint: std::rc::Rc<dyn PointerConstraint>) {
        self.constraint.set(constraint);
    }

    pub fn clear_constraint(&mut self) {
        self.constraint.clear();
    }

    pub fn has_constraint(&self) -> bool {
        self.constraint.is_set()
    }

    /// Current time on the shared monotonic clock, microseconds.
    pub fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    /// Drop all per-device state (clock offset, touch slots). Called when
    /// a device is closed so no stale state outlives it.
    pub fn forget_device(&mut self, device: DeviceId) {
        if self.devices.remove(&device).is_some() {
            trace!("translator state flushed for device {}", device);
        }
    }

    /// Translate a raw event. Returns `None` for events that do not map
    /// to a unified event (unknown touch contacts, releases of untracked
    /// state).
    pub fn translate(
        &mut self,
        raw: &RawEvent,
        keyboard: &mut KeyboardState,
    ) -> Option<UnifiedEvent> {
        let now_us = self.now_us();
        let state = self.devices.entry(raw.device).or_insert_with(|| {
            trace!("first event from device {}, pinning clock offset", raw.device);
            DeviceState {
                clock_offset_us: now_us as i64 - raw.time_us as i64,
                slots: SlotTable::default(),
            }
        });
        let time_us = (raw.time_us as i64 + state.clock_offset_us).max(0) as u64;

        let kind = match &raw.kind {
            RawEventKind::Motion { dx, dy } => {
                let (adx, ady) = (dx * self.accel_factor, dy * self.accel_factor);
                let prev = self.pointer;
                let mut x = prev.x + adx;
                let mut y = prev.y + ady;
                // Constraint runs even on zero proposals.
                self.constraint.apply(raw.device, time_us, prev, &mut x, &mut y);
                self.pointer = PointerPosition { x, y };
                EventKind::Motion {
                    x,
                    y,
                    dx: adx,
                    dy: ady,
                    dx_unaccel: *dx,
                    dy_unaccel: *dy,
                }
            }
            RawEventKind::MotionAbsolute { x, y } => {
                let prev = self.pointer;
                let (dx, dy) = (x - prev.x, y - prev.y);
                let mut cx = *x;
                let mut cy = *y;
                self.constraint
                    .apply(raw.device, time_us, prev, &mut cx, &mut cy);
                self.pointer = PointerPosition { x: cx, y: cy };
                EventKind::Motion {
                    x: cx,
                    y: cy,
                    dx,
                    dy,
                    dx_unaccel: dx,
                    dy_unaccel: dy,
                }
            }
            RawEventKind::Button { button, pressed } => EventKind::Button {
                button: *button,
                state: if *pressed {
                    ButtonState::Pressed
                } else {
                    ButtonState::Released
                },
                x: self.pointer.x,
                y: self.pointer.y,
            },
            RawEventKind::Key { key, pressed } => {
                if *pressed {
                    keyboard.note_key_press(raw.device, *key, Instant::now());
                } else {
                    keyboard.note_key_release(*key);
                }
                EventKind::Key {
                    key: *key,
                    state: if *pressed {
                        KeyState::Pressed
                    } else {
                        KeyState::Released
                    },
                    layout: keyboard.layout_index(),
                }
            }
            RawEventKind::TouchDown { contact, x, y } => {
                let slot = state.slots.acquire(*contact);
                EventKind::TouchDown {
                    slot,
                    x: *x,
                    y: *y,
                }
            }
            RawEventKind::TouchMotion { contact, x, y } => {
                let slot = state.slots.lookup(*contact)?;
                EventKind::TouchMotion {
                    slot,
                    x: *x,
                    y: *y,
                }
            }
            RawEventKind::TouchUp { contact } => {
                let slot = state.slots.release(*contact)?;
                EventKind::TouchUp { slot }
            }
            RawEventKind::TabletAxis {
                x,
                y,
                pressure,
                tilt_x,
                tilt_y,
            } => EventKind::TabletAxis {
                x: *x,
                y: *y,
                pressure: *pressure,
                tilt_x: *tilt_x,
                tilt_y: *tilt_y,
            },
            RawEventKind::TabletTip {
                down,
                x,
                y,
                pressure,
            } => EventKind::TabletTip {
                down: *down,
                x: *x,
                y: *y,
                pressure: *pressure,
            },
            RawEventKind::TabletButton { button, pressed } => EventKind::TabletButton {
                button: *button,
                state: if *pressed {
                    ButtonState::Pressed
                } else {
                    ButtonState::Released
                },
            },
        };

        Some(UnifiedEvent {
            device: raw.device,
            time_us,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::keyboard::Keymap;
    use crate::pointer::RegionConstraint;

    fn keyboard() -> KeyboardState {
        KeyboardState::new(Keymap::from_buffer(b"keymap".to_vec(), 1))
    }

    fn raw(device: u32, time_us: u64, kind: RawEventKind) -> RawEvent {
        RawEvent {
            device: DeviceId(device),
            time_us,
            kind,
        }
    }

    #[test]
    fn relative_motion_accumulates_and_preserves_raw_delta() {
        let mut tr = Translator::new();
        let mut kb = keyboard();
        tr.set_pointer_position(10.0, 10.0);
        tr.set_accel_speed(1.0); // factor 2.0

        let ev = tr
            .translate(&raw(0, 0, RawEventKind::Motion { dx: 3.0, dy: -2.0 }), &mut kb)
            .unwrap();
        match ev.kind {
            EventKind::Motion {
                x,
                y,
                dx,
                dy,
                dx_unaccel,
                dy_unaccel,
            } => {
                assert_eq!((x, y), (16.0, 6.0));
                assert_eq!((dx, dy), (6.0, -4.0));
                assert_eq!((dx_unaccel, dy_unaccel), (3.0, -2.0));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(tr.pointer_position(), PointerPosition { x: 16.0, y: 6.0 });
    }

    #[test]
    fn emitted_coordinates_are_exactly_the_constrained_ones() {
        let mut tr = Translator::new();
        let mut kb = keyboard();
        tr.set_pointer_position(50.0, 50.0);
        tr.set_constraint(Rc::new(RegionConstraint {
            x0: 0.0,
            y0: 0.0,
            x1: 60.0,
            y1: 60.0,
        }));

        let ev = tr
            .translate(
                &raw(0, 0, RawEventKind::Motion { dx: 100.0, dy: 100.0 }),
                &mut kb,
            )
            .unwrap();
        match ev.kind {
            EventKind::Motion { x, y, .. } => assert_eq!((x, y), (60.0, 60.0)),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(tr.pointer_position(), PointerPosition { x: 60.0, y: 60.0 });
    }

    /// Constraint that pins the pointer to a single point, the
    /// relative-only interaction case.
    struct PinConstraint;

    impl crate::pointer::PointerConstraint for PinConstraint {
        fn constrain(
            &self,
            _d: DeviceId,
            _t: u64,
            prev_x: f64,
            prev_y: f64,
            x: &mut f64,
            y: &mut f64,
        ) {
            *x = prev_x;
            *y = prev_y;
        }
    }

    #[test]
    fn constraint_runs_even_for_zero_motion() {
        let mut tr = Translator::new();
        let mut kb = keyboard();
        tr.set_pointer_position(5.0, 5.0);
        tr.set_constraint(Rc::new(PinConstraint));

        let ev = tr
            .translate(&raw(0, 0, RawEventKind::Motion { dx: 0.0, dy: 0.0 }), &mut kb)
            .unwrap();
        match ev.kind {
            EventKind::Motion { x, y, dx_unaccel, .. } => {
                assert_eq!((x, y), (5.0, 5.0));
                assert_eq!(dx_unaccel, 0.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn touch_slots_are_distinct_and_reused_after_release() {
        let mut tr = Translator::new();
        let mut kb = keyboard();

        let down = |tr: &mut Translator, kb: &mut KeyboardState, contact| {
            match tr
                .translate(
                    &raw(0, 0, RawEventKind::TouchDown { contact, x: 0.0, y: 0.0 }),
                    kb,
                )
                .unwrap()
                .kind
            {
                EventKind::TouchDown { slot, .. } => slot,
                other => panic!("unexpected event: {:?}", other),
            }
        };

        let a = down(&mut tr, &mut kb, 100);
        let b = down(&mut tr, &mut kb, 200);
        let c = down(&mut tr, &mut kb, 300);
        assert_eq!((a, b, c), (0, 1, 2));

        // Release the middle contact; its slot is the lowest free one.
        let up = tr
            .translate(&raw(0, 0, RawEventKind::TouchUp { contact: 200 }), &mut kb)
            .unwrap();
        assert!(matches!(up.kind, EventKind::TouchUp { slot: 1 }));
        assert_eq!(down(&mut tr, &mut kb, 400), 1);
    }

    #[test]
    fn unknown_touch_contact_is_dropped() {
        let mut tr = Translator::new();
        let mut kb = keyboard();
        assert!(tr
            .translate(
                &raw(0, 0, RawEventKind::TouchMotion { contact: 9, x: 0.0, y: 0.0 }),
                &mut kb
            )
            .is_none());
        assert!(tr
            .translate(&raw(0, 0, RawEventKind::TouchUp { contact: 9 }), &mut kb)
            .is_none());
    }

    #[test]
    fn slot_tables_are_per_device() {
        let mut tr = Translator::new();
        let mut kb = keyboard();
        let slot_of = |ev: UnifiedEvent| match ev.kind {
            EventKind::TouchDown { slot, .. } => slot,
            other => panic!("unexpected event: {:?}", other),
        };
        let a = slot_of(
            tr.translate(
                &raw(0, 0, RawEventKind::TouchDown { contact: 1, x: 0.0, y: 0.0 }),
                &mut kb,
            )
            .unwrap(),
        );
        let b = slot_of(
            tr.translate(
                &raw(1, 0, RawEventKind::TouchDown { contact: 1, x: 0.0, y: 0.0 }),
                &mut kb,
            )
            .unwrap(),
        );
        // Same contact id on different devices gets slot 0 on each.
        assert_eq!((a, b), (0, 0));
    }

    #[test]
    fn clock_offset_preserves_native_spacing() {
        let mut tr = Translator::new();
        let mut kb = keyboard();
        let first = tr
            .translate(
                &raw(0, 1_000_000, RawEventKind::Motion { dx: 1.0, dy: 0.0 }),
                &mut kb,
            )
            .unwrap();
        let second = tr
            .translate(
                &raw(0, 1_005_000, RawEventKind::Motion { dx: 1.0, dy: 0.0 }),
                &mut kb,
            )
            .unwrap();
        assert_eq!(second.time_us - first.time_us, 5_000);
    }

    #[test]
    fn forget_device_resets_clock_and_slots() {
        let mut tr = Translator::new();
        let mut kb = keyboard();
        tr.translate(
            &raw(0, 0, RawEventKind::TouchDown { contact: 1, x: 0.0, y: 0.0 }),
            &mut kb,
        )
        .unwrap();
        tr.forget_device(DeviceId(0));
        // The old contact is gone with the device state.
        assert!(tr
            .translate(&raw(0, 0, RawEventKind::TouchUp { contact: 1 }), &mut kb)
            .is_none());
    }

    #[test]
    fn key_events_carry_active_layout() {
        let mut tr = Translator::new();
        let mut kb = KeyboardState::new(Keymap::from_buffer(b"keymap".to_vec(), 2));
        kb.set_layout_index(1).unwrap();
        let ev = tr
            .translate(&raw(0, 0, RawEventKind::Key { key: 30, pressed: true }), &mut kb)
            .unwrap();
        assert!(matches!(
            ev.kind,
            EventKind::Key {
                key: 30,
                state: KeyState::Pressed,
                layout: 1
            }
        ));
    }
}
