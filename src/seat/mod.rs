//! Seat core: wires the gateway, filter chain, translator, keyboard state
//! and idle registry into one per-seat pipeline.
//!
//! Everything here runs on a single thread driven by a readiness loop:
//! raw events are queued with [`SeatCore::push_raw_event`], drained with
//! [`SeatCore::process_pending`], and timer-backed state is advanced with
//! [`SeatCore::dispatch_timers`]. There is no cross-thread signaling, so
//! removing a filter, destroying a watch or closing a device is immediate
//! and synchronous.

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use log::{info, trace};

use crate::config::InputConfig;
use crate::device::{DeviceGateway, DeviceStrategy};
use crate::error::Result;
use crate::event::{DeviceId, EventKind, KeyState, RawEvent, UnifiedEvent};
use crate::filter::{EventFilter, FilterChain};
use crate::idle::{IdleRegistry, WatchId};
use crate::keyboard::{KeyboardState, Keymap};
use crate::pointer::PointerConstraint;
use crate::translate::Translator;

/// The native input backend for one seat.
pub struct SeatCore {
    gateway: DeviceGateway,
    filters: Rc<FilterChain>,
    translator: Translator,
    keyboard: KeyboardState,
    idle: Rc<IdleRegistry>,
    queue: VecDeque<RawEvent>,
}

impl SeatCore {
    pub fn new(strategy: Box<dyn DeviceStrategy>, keymap: Keymap) -> Self {
        Self {
            gateway: DeviceGateway::new(strategy),
            filters: Rc::new(FilterChain::new()),
            translator: Translator::new(),
            keyboard: KeyboardState::new(keymap),
            idle: Rc::new(IdleRegistry::new()),
            queue: VecDeque::new(),
        }
    }

    /// Build a seat with keyboard repeat and pointer acceleration taken
    /// from configuration.
    pub fn with_config(
        strategy: Box<dyn DeviceStrategy>,
        keymap: Keymap,
        config: &InputConfig,
    ) -> Self {
        let mut seat = Self::new(strategy, keymap);
        seat.keyboard.set_repeat(
            config.keyboard.repeat_enabled,
            config.keyboard.repeat_delay,
            config.keyboard.repeat_rate,
        );
        seat.translator.set_accel_speed(config.pointer.accel_speed);
        info!(
            "seat initialized (repeat_delay={}ms, repeat_rate={}ms, accel_speed={})",
            config.keyboard.repeat_delay, config.keyboard.repeat_rate, config.pointer.accel_speed
        );
        seat
    }

    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------

    pub fn gateway(&self) -> &DeviceGateway {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut DeviceGateway {
        &mut self.gateway
    }

    /// Close a device and flush every piece of in-flight state tied to
    /// it: queued raw events are dropped, translator state (clock
    /// offset, touch slots) is forgotten and held keys stop repeating,
    /// so no unified event or timer references the device afterwards.
    pub fn close_device(&mut self, device: DeviceId) -> Result<()> {
        self.queue.retain(|ev| ev.device != device);
        self.translator.forget_device(device);
        self.keyboard.forget_device(device);
        self.gateway.remove_device(device)
    }

    /// Close all device handles for a VT/session switch-away.
    pub fn release_devices(&mut self) {
        self.gateway.release_all();
    }

    /// Reopen released devices through the current strategy.
    pub fn reclaim_devices(&mut self) {
        self.gateway.reclaim_all();
    }

    // ------------------------------------------------------------------
    // Filters / constraint / idle
    // ------------------------------------------------------------------

    pub fn filters(&self) -> &Rc<FilterChain> {
        &self.filters
    }

    pub fn add_filter(&self, filter: Rc<dyn EventFilter>) -> Result<()> {
        self.filters.add_filter(filter)
    }

    pub fn remove_filter(&self, filter: &Rc<dyn EventFilter>) -> bool {
        self.filters.remove_filter(filter)
    }

    pub fn set_pointer_constraint(&mut self, constraint: Rc<dyn PointerConstraint>) {
        self.translator.set_constraint(constraint);
    }

    pub fn clear_pointer_constraint(&mut self) {
        self.translator.clear_constraint();
    }

    pub fn idle(&self) -> &Rc<IdleRegistry> {
        &self.idle
    }

    pub fn create_idle_watch(
        &self,
        timeout_ms: u64,
        callback: impl Fn(WatchId) + 'static,
    ) -> WatchId {
        self.idle.add_watch(timeout_ms, callback)
    }

    pub fn remove_idle_watch(&self, id: WatchId) -> Result<()> {
        self.idle.remove_watch(id)
    }

    pub fn get_idle_ms(&self) -> u64 {
        self.idle.idle_ms()
    }

    // ------------------------------------------------------------------
    // Keyboard
    // ------------------------------------------------------------------

    pub fn set_keymap(&mut self, keymap: Keymap) {
        self.keyboard.set_keymap(keymap);
    }

    pub fn get_keymap(&self) -> Arc<Keymap> {
        self.keyboard.get_keymap()
    }

    pub fn set_layout_index(&mut self, index: usize) -> Result<()> {
        self.keyboard.set_layout_index(index)
    }

    pub fn set_repeat(&mut self, enabled: bool, delay_ms: u64, interval_ms: u64) {
        self.keyboard.set_repeat(enabled, delay_ms, interval_ms);
    }

    pub fn keyboard(&self) -> &KeyboardState {
        &self.keyboard
    }

    // ------------------------------------------------------------------
    // Event pipeline
    // ------------------------------------------------------------------

    /// Queue a raw event for the next `process_pending`.
    pub fn push_raw_event(&mut self, event: RawEvent) {
        self.queue.push_back(event);
    }

    /// Drain the pending queue through the pipeline, returning the
    /// unified events to deliver to consumers.
    pub fn process_pending(&mut self) -> Vec<UnifiedEvent> {
        let mut out = Vec::new();
        while let Some(raw) = self.queue.pop_front() {
            if let Some(ev) = self.process_raw(raw) {
                out.push(ev);
            }
        }
        out
    }

    /// Run one raw event through filters, idle reset and translation.
    pub fn process_raw(&mut self, raw: RawEvent) -> Option<UnifiedEvent> {
        // Hot-unplugged or released devices may still have events queued;
        // drop them rather than translate against a closed handle.
        let open = self
            .gateway
            .device(raw.device)
            .map(|d| d.is_open())
            .unwrap_or(false);
        if !open {
            trace!("dropping raw event for closed device {}", raw.device);
            return None;
        }

        let consumed = self.filters.dispatch(&raw);
        // Raw hardware activity counts toward idle reset regardless of
        // suppression.
        self.idle.reset_idle();
        if consumed {
            return None;
        }

        self.translator.translate(&raw, &mut self.keyboard)
    }

    /// Advance timer-backed state: fire due idle watches and emit key
    /// repeat events for keys held on still-open devices.
    pub fn dispatch_timers(&mut self) -> Vec<UnifiedEvent> {
        let now = Instant::now();
        self.idle.dispatch(now);

        let mut out = Vec::new();
        for (device, key) in self.keyboard.poll_repeats(now) {
            let open = self
                .gateway
                .device(device)
                .map(|d| d.is_open())
                .unwrap_or(false);
            if !open {
                continue;
            }
            out.push(UnifiedEvent {
                device,
                time_us: self.translator.now_us(),
                kind: EventKind::Key {
                    key,
                    state: KeyState::Repeated,
                    layout: self.keyboard.layout_index(),
                },
            });
        }
        out
    }

    /// Earliest pending deadline across idle watches and key repeat, for
    /// the event loop's poll timeout. `None` means the loop may block
    /// indefinitely on fd readiness.
    pub fn next_timeout(&self) -> Option<Instant> {
        match (
            self.idle.next_deadline(),
            self.keyboard.next_repeat_deadline(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
