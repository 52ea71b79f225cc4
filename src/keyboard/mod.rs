//! Keyboard map, layout and repeat configuration.
//!
//! The compiled keymap is opaque to the core: the hardware backend
//! compiles it with xkbcommon, or the host supplies a blob directly.
//! Changes take effect for the next key event translated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::error::{InputError, Result};
use crate::event::DeviceId;

/// A compiled keymap blob, shared read-only with every key-translation
/// step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keymap {
    blob: Arc<[u8]>,
    layout_count: usize,
}

impl Keymap {
    /// Wrap an already compiled keymap. `layout_count` must be at least 1;
    /// a compiled keymap always has a base layout, so 0 is treated as 1.
    pub fn from_buffer(blob: impl Into<Arc<[u8]>>, layout_count: usize) -> Self {
        if layout_count == 0 {
            warn!("keymap reports 0 layouts, treating as 1");
        }
        Self {
            blob: blob.into(),
            layout_count: layout_count.max(1),
        }
    }

    /// Compile a keymap from XKB rule names, empty strings meaning the
    /// system default.
    #[cfg(all(target_os = "linux", feature = "libinput"))]
    pub fn from_xkb_names(
        model: &str,
        layout: &str,
        variant: &str,
        options: &str,
    ) -> anyhow::Result<Self> {
        use log::info;
        use xkbcommon::xkb;

        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);
        let options = if options.is_empty() {
            None
        } else {
            Some(options.to_string())
        };
        let options_for_error = options.clone();
        let keymap = xkb::Keymap::new_from_names(
            &context,
            "",
            model,
            layout,
            variant,
            options,
            xkb::COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Failed to create xkb keymap (model={}, layout={}, variant={}, options={:?})",
                model,
                layout,
                variant,
                options_for_error
            )
        })?;

        let blob = keymap.get_as_string(xkb::KEYMAP_FORMAT_TEXT_V1);
        let layouts = keymap.num_layouts() as usize;
        info!(
            "xkb keymap compiled (layout={}, {} layouts)",
            if layout.is_empty() { "default" } else { layout },
            layouts
        );
        Ok(Self::from_buffer(blob.into_bytes(), layouts))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }

    pub fn layout_count(&self) -> usize {
        self.layout_count
    }
}

/// Key repeat configuration, milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatConfig {
    pub enabled: bool,
    pub delay_ms: u64,
    pub interval_ms: u64,
}

impl Default for RepeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 400,
            interval_ms: 30,
        }
    }
}

/// A key currently held for repeat generation.
struct HeldKey {
    device: DeviceId,
    next_repeat: Instant,
    /// Interval snapshotted at press time. Repeat-rate changes do not
    /// affect keys already repeating.
    interval: Duration,
    /// Keymap serial at press time. A keymap swap suppresses the next
    /// tick of keys pressed under the old map.
    keymap_serial: u64,
}

/// Holds the compiled keymap, active layout index and repeat state.
pub struct KeyboardState {
    keymap: Arc<Keymap>,
    keymap_serial: u64,
    layout_index: usize,
    repeat: RepeatConfig,
    held: HashMap<u32, HeldKey>,
}

impl KeyboardState {
    pub fn new(keymap: Keymap) -> Self {
        Self {
            keymap: Arc::new(keymap),
            keymap_serial: 0,
            layout_index: 0,
            repeat: RepeatConfig::default(),
            held: HashMap::new(),
        }
    }

    /// Replace the keymap. Takes effect for the next key event; held keys
    /// pressed under the old map stop repeating (their next tick is
    /// suppressed) so no keysym from a stale map is emitted.
    pub fn set_keymap(&mut self, keymap: Keymap) {
        self.keymap_serial += 1;
        if self.layout_index >= keymap.layout_count() {
            debug!(
                "layout index {} out of range for new keymap, resetting to 0",
                self.layout_index
            );
            self.layout_index = 0;
        }
        self.keymap = Arc::new(keymap);
    }

    pub fn get_keymap(&self) -> Arc<Keymap> {
        self.keymap.clone()
    }

    /// Select the active layout. Out-of-range indices are rejected, not
    /// clamped; the previous layout stays active.
    pub fn set_layout_index(&mut self, index: usize) -> Result<()> {
        let count = self.keymap.layout_count();
        if index >= count {
            return Err(InputError::InvalidLayoutIndex { index, count });
        }
        self.layout_index = index;
        Ok(())
    }

    pub fn layout_index(&self) -> usize {
        self.layout_index
    }

    /// Change repeat configuration. Affects keys pressed after the call;
    /// already-repeating keys keep their original interval until
    /// released.
    pub fn set_repeat(&mut self, enabled: bool, delay_ms: u64, interval_ms: u64) {
        self.repeat = RepeatConfig {
            enabled,
            delay_ms,
            interval_ms,
        };
    }

    pub fn repeat(&self) -> RepeatConfig {
        self.repeat
    }

    /// Record a key press for repeat generation.
    pub fn note_key_press(&mut self, device: DeviceId, key: u32, now: Instant) {
        if !self.repeat.enabled {
            return;
        }
        self.held.insert(
            key,
            HeldKey {
                device,
                next_repeat: now + Duration::from_millis(self.repeat.delay_ms),
                interval: Duration::from_millis(self.repeat.interval_ms),
                keymap_serial: self.keymap_serial,
            },
        );
    }

    pub fn note_key_release(&mut self, key: u32) {
        self.held.remove(&key);
    }

    /// Drop held-key state for a device. Called on close or unplug so a
    /// dead device neither repeats nor schedules wakeups.
    pub fn forget_device(&mut self, device: DeviceId) {
        self.held.retain(|_, h| h.device != device);
    }

    /// Keys due for a repeat tick at `now`, in ascending keycode order.
    /// Held keys pressed under an older keymap are dropped instead of
    /// repeated.
    pub fn poll_repeats(&mut self, now: Instant) -> Vec<(DeviceId, u32)> {
        let serial = self.keymap_serial;
        self.held.retain(|_, h| h.keymap_serial == serial);

        let mut due = Vec::new();
        for (key, held) in self.held.iter_mut() {
            if now >= held.next_repeat {
                due.push((held.device, *key));
                held.next_repeat = now + held.interval;
            }
        }
        due.sort_unstable_by_key(|&(_, key)| key);
        due
    }

    /// Earliest pending repeat deadline, for the loop's poll timeout.
    pub fn next_repeat_deadline(&self) -> Option<Instant> {
        self.held.values().map(|h| h.next_repeat).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keymap(layouts: usize) -> Keymap {
        Keymap::from_buffer(b"xkb_keymap { };".to_vec(), layouts)
    }

    #[test]
    fn zero_layout_count_is_treated_as_one() {
        let km = Keymap::from_buffer(b"k".to_vec(), 0);
        assert_eq!(km.layout_count(), 1);
        let mut kb = KeyboardState::new(km);
        assert!(kb.set_layout_index(0).is_ok());
        assert!(kb.set_layout_index(1).is_err());
    }

    #[test]
    fn keymap_round_trip() {
        let mut kb = KeyboardState::new(keymap(1));
        let replacement = keymap(2);
        kb.set_keymap(replacement.clone());
        assert_eq!(*kb.get_keymap(), replacement);
    }

    #[test]
    fn out_of_range_layout_is_rejected_and_previous_retained() {
        let mut kb = KeyboardState::new(keymap(2));
        kb.set_layout_index(1).unwrap();
        assert!(matches!(
            kb.set_layout_index(2),
            Err(InputError::InvalidLayoutIndex { index: 2, count: 2 })
        ));
        assert_eq!(kb.layout_index(), 1);
    }

    #[test]
    fn keymap_swap_resets_out_of_range_layout() {
        let mut kb = KeyboardState::new(keymap(3));
        kb.set_layout_index(2).unwrap();
        kb.set_keymap(keymap(1));
        assert_eq!(kb.layout_index(), 0);
    }

    #[test]
    fn repeat_fires_after_delay_then_interval() {
        let mut kb = KeyboardState::new(keymap(1));
        kb.set_repeat(true, 100, 25);
        let t0 = Instant::now();
        kb.note_key_press(DeviceId(0), 30, t0);

        assert!(kb.poll_repeats(t0 + Duration::from_millis(99)).is_empty());
        assert_eq!(
            kb.poll_repeats(t0 + Duration::from_millis(100)),
            vec![(DeviceId(0), 30)]
        );
        // Next tick is interval-spaced from the previous one.
        assert!(kb.poll_repeats(t0 + Duration::from_millis(110)).is_empty());
        assert_eq!(
            kb.poll_repeats(t0 + Duration::from_millis(130)),
            vec![(DeviceId(0), 30)]
        );
    }

    #[test]
    fn release_stops_repeat() {
        let mut kb = KeyboardState::new(keymap(1));
        let t0 = Instant::now();
        kb.note_key_press(DeviceId(0), 30, t0);
        kb.note_key_release(30);
        assert!(kb.poll_repeats(t0 + Duration::from_secs(10)).is_empty());
        assert!(kb.next_repeat_deadline().is_none());
    }

    #[test]
    fn forget_device_clears_held_keys() {
        let mut kb = KeyboardState::new(keymap(1));
        let t0 = Instant::now();
        kb.note_key_press(DeviceId(0), 30, t0);
        kb.note_key_press(DeviceId(1), 31, t0);

        kb.forget_device(DeviceId(0));
        assert_eq!(
            kb.poll_repeats(t0 + Duration::from_secs(1)),
            vec![(DeviceId(1), 31)]
        );

        kb.forget_device(DeviceId(1));
        assert!(kb.next_repeat_deadline().is_none());
    }

    #[test]
    fn repeat_change_does_not_affect_held_keys() {
        let mut kb = KeyboardState::new(keymap(1));
        kb.set_repeat(true, 100, 25);
        let t0 = Instant::now();
        kb.note_key_press(DeviceId(0), 30, t0);
        kb.set_repeat(true, 100, 500);

        // First tick at the original delay, second at the original
        // interval, not the new one.
        assert_eq!(kb.poll_repeats(t0 + Duration::from_millis(100)).len(), 1);
        assert_eq!(kb.poll_repeats(t0 + Duration::from_millis(125)).len(), 1);
    }

    #[test]
    fn keymap_swap_suppresses_pending_repeats() {
        let mut kb = KeyboardState::new(keymap(1));
        kb.set_repeat(true, 100, 25);
        let t0 = Instant::now();
        kb.note_key_press(DeviceId(0), 30, t0);
        kb.set_keymap(keymap(1));
        assert!(kb.poll_repeats(t0 + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn disabled_repeat_tracks_nothing() {
        let mut kb = KeyboardState::new(keymap(1));
        kb.set_repeat(false, 100, 25);
        let t0 = Instant::now();
        kb.note_key_press(DeviceId(0), 30, t0);
        assert!(kb.poll_repeats(t0 + Duration::from_secs(1)).is_empty());
    }
}
