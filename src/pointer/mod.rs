//! Pointer position state and motion constraint.
//!
//! The constraint callback is invoked synchronously on every motion
//! event, even when the proposed position equals the previous one; the
//! constrained coordinates become the pointer state and the coordinates
//! carried in the emitted event. No unconstrained coordinate is ever
//! delivered downstream.

use std::rc::Rc;

use log::debug;

use crate::event::DeviceId;

/// Host-supplied constraint over proposed pointer coordinates.
///
/// The callback may leave the values unchanged, clamp them, or redirect
/// them arbitrarily (confine to a region, pin to a point for
/// relative-only interaction). It runs inline on the event thread and
/// directly gates event latency, so it must not block.
pub trait PointerConstraint {
    fn constrain(
        &self,
        device: DeviceId,
        time_us: u64,
        prev_x: f64,
        prev_y: f64,
        x: &mut f64,
        y: &mut f64,
    );
}

/// Rectangular confinement: clamps the pointer inside
/// `[x0, x1] x [y0, y1]`.
pub struct RegionConstraint {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl PointerConstraint for RegionConstraint {
    fn constrain(
        &self,
        _device: DeviceId,
        _time_us: u64,
        _prev_x: f64,
        _prev_y: f64,
        x: &mut f64,
        y: &mut f64,
    ) {
        *x = x.clamp(self.x0, self.x1);
        *y = y.clamp(self.y0, self.y1);
    }
}

/// Last known absolute pointer position. Mutated only by motion
/// translation, synchronously, on the event thread.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

/// Holds at most one active constraint. Setting a new one drops the
/// previous, which runs its teardown.
#[derive(Default)]
pub struct ConstraintSlot {
    active: Option<Rc<dyn PointerConstraint>>,
}

impl ConstraintSlot {
    pub fn set(&mut self, constraint: Rc<dyn PointerConstraint>) {
        if self.active.is_some() {
            debug!("pointer constraint replaced");
        }
        self.active = Some(constraint);
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn is_set(&self) -> bool {
        self.active.is_some()
    }

    /// Apply the active constraint to a proposed position. Identity when
    /// no constraint is set.
    pub fn apply(
        &self,
        device: DeviceId,
        time_us: u64,
        prev: PointerPosition,
        x: &mut f64,
        y: &mut f64,
    ) {
        if let Some(constraint) = &self.active {
            constraint.constrain(device, time_us, prev.x, prev.y, x, y);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn region_constraint_clamps() {
        let slot = {
            let mut s = ConstraintSlot::default();
            s.set(Rc::new(RegionConstraint {
                x0: 0.0,
                y0: 0.0,
                x1: 100.0,
                y1: 50.0,
            }));
            s
        };
        let mut x = 150.0;
        let mut y = -3.0;
        slot.apply(DeviceId(0), 0, PointerPosition::default(), &mut x, &mut y);
        assert_eq!((x, y), (100.0, 0.0));
    }

    #[test]
    fn no_constraint_is_identity() {
        let slot = ConstraintSlot::default();
        let mut x = 7.5;
        let mut y = 8.5;
        slot.apply(DeviceId(0), 0, PointerPosition::default(), &mut x, &mut y);
        assert_eq!((x, y), (7.5, 8.5));
    }

    struct DropTracking {
        dropped: Rc<Cell<bool>>,
    }

    impl PointerConstraint for DropTracking {
        fn constrain(
            &self,
            _d: DeviceId,
            _t: u64,
            _px: f64,
            _py: f64,
            _x: &mut f64,
            _y: &mut f64,
        ) {
        }
    }

    impl Drop for DropTracking {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    #[test]
    fn setting_new_constraint_tears_down_previous() {
        let dropped = Rc::new(Cell::new(false));
        let mut slot = ConstraintSlot::default();
        slot.set(Rc::new(DropTracking {
            dropped: dropped.clone(),
        }));
        assert!(!dropped.get());
        slot.set(Rc::new(RegionConstraint {
            x0: 0.0,
            y0: 0.0,
            x1: 1.0,
            y1: 1.0,
        }));
        assert!(dropped.get(), "previous constraint not dropped");
    }
}
