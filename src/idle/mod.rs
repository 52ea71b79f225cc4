//! Idle watches: callbacks that fire after a period of input inactivity.
//!
//! Every accepted raw event resets the shared last-activity timestamp and
//! re-arms all timeout-bearing watches relative to it. Watches with
//! timeout 0 are one-shot: they fire synchronously at the next activity
//! reset and are then destroyed; re-registration is required to fire
//! again.
//!
//! There is no OS timer per watch. Deadlines are plain monotonic instants
//! selected in (deadline, id) order and dispatched from the event-loop
//! tick, so destruction is synchronous and a destroyed watch can never
//! fire, even when its deadline already passed.
//!
//! Callbacks that need the registry (to remove themselves or other
//! watches) should capture a `Weak` reference to it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::error::{InputError, Result};

/// Identity of an idle watch. Assigned from a per-registry monotonic
/// counter and never reused while the registry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type WatchCallback = Rc<dyn Fn(WatchId)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchState {
    /// Waiting for its deadline.
    Armed,
    /// Callback invoked; waits for the next activity reset to re-arm.
    Fired,
}

struct Watch {
    timeout: Duration,
    state: WatchState,
    /// None for zero-timeout watches and for fired watches awaiting
    /// re-arm.
    deadline: Option<Instant>,
    callback: WatchCallback,
}

struct Inner {
    watches: HashMap<WatchId, Watch>,
    next_id: u64,
    last_activity: Instant,
}

/// Registry of idle watches for one monitored input stream.
///
/// Interior-mutable so that watch callbacks may call back into the
/// registry (through a `Weak` reference) during their own fire.
pub struct IdleRegistry {
    inner: RefCell<Inner>,
}

impl Default for IdleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleRegistry {
    pub fn new() -> Self {
        Self {
            inner: RefCell::new(Inner {
                watches: HashMap::new(),
                next_id: 1,
                last_activity: Instant::now(),
            }),
        }
    }

    /// Register a watch. With `timeout_ms > 0` the watch fires once its
    /// deadline (`last_activity + timeout`) passes without activity, and
    /// re-arms on the next reset. With `timeout_ms == 0` it fires exactly
    /// once, synchronously, at the next `reset_idle` call, and is then
    /// destroyed.
    pub fn add_watch(&self, timeout_ms: u64, callback: impl Fn(WatchId) + 'static) -> WatchId {
        let mut inner = self.inner.borrow_mut();
        let id = WatchId(inner.next_id);
        inner.next_id += 1;

        let timeout = Duration::from_millis(timeout_ms);
        let deadline = if timeout_ms > 0 {
            Some(inner.last_activity + timeout)
        } else {
            None
        };
        inner.watches.insert(
            id,
            Watch {
                timeout,
                state: WatchState::Armed,
                deadline,
                callback: Rc::new(callback),
            },
        );
        debug!("idle watch {} added (timeout={}ms)", id, timeout_ms);
        id
    }

    /// Cancel a watch synchronously. After this returns its callback will
    /// never be invoked, even if a fire was already due.
    pub fn remove_watch(&self, id: WatchId) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.watches.remove(&id).is_none() {
            return Err(InputError::WatchNotFound(id));
        }
        debug!("idle watch {} removed", id);
        Ok(())
    }

    pub fn watch_count(&self) -> usize {
        self.inner.borrow().watches.len()
    }

    /// Record input activity now. See [`IdleRegistry::reset_at`].
    pub fn reset_idle(&self) {
        self.reset_at(Instant::now());
    }

    /// Record input activity at `now`: update the last-activity
    /// timestamp, fire (and destroy) every zero-timeout watch, and re-arm
    /// every timeout-bearing watch to `now + timeout`.
    pub fn reset_at(&self, now: Instant) {
        let zero_ids: Vec<WatchId> = {
            let mut inner = self.inner.borrow_mut();
            inner.last_activity = now;

            let mut zero_ids = Vec::new();
            for (id, watch) in inner.watches.iter_mut() {
                if watch.timeout.is_zero() {
                    zero_ids.push(*id);
                } else {
                    watch.state = WatchState::Armed;
                    watch.deadline = Some(now + watch.timeout);
                }
            }
            zero_ids.sort_unstable();
            zero_ids
        };

        // One-shot semantics: remove before invoking, re-checking each
        // entry so a callback that destroys a later watch suppresses it.
        for id in zero_ids {
            let callback = self.inner.borrow_mut().watches.remove(&id).map(|w| w.callback);
            if let Some(callback) = callback {
                trace!("zero-timeout idle watch {} fired", id);
                callback(id);
            }
        }
    }

    /// Idle time since the last activity, in milliseconds. Monotonic
    /// clock based, immune to wall-clock adjustments.
    pub fn idle_ms(&self) -> u64 {
        self.idle_ms_at(Instant::now())
    }

    pub fn idle_ms_at(&self, now: Instant) -> u64 {
        let last = self.inner.borrow().last_activity;
        now.saturating_duration_since(last).as_millis() as u64
    }

    /// Earliest pending deadline, for the event loop's poll timeout.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.inner
            .borrow()
            .watches
            .values()
            .filter(|w| w.state == WatchState::Armed)
            .filter_map(|w| w.deadline)
            .min()
    }

    /// Fire every watch due at `now`, earliest deadline first (ties by
    /// id). A watch removed by an earlier callback in the same dispatch
    /// does not fire. Returns the number of callbacks invoked.
    pub fn dispatch(&self, now: Instant) -> usize {
        let mut fired = 0;
        loop {
            let due = {
                let mut inner = self.inner.borrow_mut();
                let next = inner
                    .watches
                    .iter()
                    .filter(|(_, w)| w.state == WatchState::Armed)
                    .filter_map(|(id, w)| w.deadline.map(|d| (d, *id)))
                    .filter(|(d, _)| *d <= now)
                    .min();
                match next {
                    Some((_, id)) => {
                        let watch = inner.watches.get_mut(&id).expect("due watch exists");
                        watch.state = WatchState::Fired;
                        watch.deadline = None;
                        Some((id, watch.callback.clone()))
                    }
                    None => None,
                }
            };

            match due {
                Some((id, callback)) => {
                    trace!("idle watch {} fired", id);
                    callback(id);
                    fired += 1;
                }
                None => break,
            }
        }
        fired
    }
}
