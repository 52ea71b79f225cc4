//! Low-level event filter chain.
//!
//! Filters see every raw event before translation, in registration order,
//! and may consume it. Dispatch iterates a point-in-time snapshot of the
//! chain, so adding or removing filters from inside a callback is legal
//! and takes effect on the next dispatch, not the current one.

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::error::{InputError, Result};
use crate::event::RawEvent;

/// Verdict returned by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    /// Pass the event on to the next filter and the translator.
    Pass,
    /// Suppress the event; it never reaches the translator. Suppressed
    /// events still count as activity for idle detection.
    Consumed,
}

/// Host-registered predicate over raw events. Runs inline on the event
/// thread and must not block.
pub trait EventFilter {
    fn filter(&self, event: &RawEvent) -> FilterResult;
}

/// Ordered chain of filters.
///
/// Identity is the `Rc` pointer, standing in for a (predicate, context)
/// pair: registering the same `Rc` twice reports `DuplicateFilter`, and
/// removal matches by pointer. Dropping the last `Rc` runs the filter's
/// own teardown.
#[derive(Default)]
pub struct FilterChain {
    entries: RefCell<Vec<Rc<dyn EventFilter>>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter. The chain runs filters in registration order.
    pub fn add_filter(&self, filter: Rc<dyn EventFilter>) -> Result<()> {
        let mut entries = self.entries.borrow_mut();
        if entries.iter().any(|f| Rc::ptr_eq(f, &filter)) {
            return Err(InputError::DuplicateFilter);
        }
        entries.push(filter);
        Ok(())
    }

    /// Remove a previously registered filter. Returns false when the
    /// filter is not in the chain. Removal is immediate for future
    /// dispatches; a dispatch already in progress finishes its snapshot.
    pub fn remove_filter(&self, filter: &Rc<dyn EventFilter>) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|f| !Rc::ptr_eq(f, filter));
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Offer `event` to every filter in registration order. Stops at the
    /// first filter that consumes it and reports whether the event was
    /// consumed.
    pub fn dispatch(&self, event: &RawEvent) -> bool {
        let snapshot: Vec<Rc<dyn EventFilter>> = self.entries.borrow().clone();
        for filter in &snapshot {
            if filter.filter(event) == FilterResult::Consumed {
                trace!("raw event consumed by filter");
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Weak;

    use super::*;
    use crate::event::{DeviceId, RawEventKind};

    fn raw_event() -> RawEvent {
        RawEvent {
            device: DeviceId(0),
            time_us: 0,
            kind: RawEventKind::Motion { dx: 1.0, dy: 0.0 },
        }
    }

    struct CountingFilter {
        calls: Cell<u32>,
        verdict: FilterResult,
    }

    impl CountingFilter {
        fn new(verdict: FilterResult) -> Rc<Self> {
            Rc::new(Self {
                calls: Cell::new(0),
                verdict,
            })
        }
    }

    impl EventFilter for CountingFilter {
        fn filter(&self, _event: &RawEvent) -> FilterResult {
            self.calls.set(self.calls.get() + 1);
            self.verdict
        }
    }

    #[test]
    fn filters_run_in_registration_order_until_consumed() {
        let chain = FilterChain::new();
        let first = CountingFilter::new(FilterResult::Pass);
        let second = CountingFilter::new(FilterResult::Consumed);
        let third = CountingFilter::new(FilterResult::Pass);
        chain.add_filter(first.clone()).unwrap();
        chain.add_filter(second.clone()).unwrap();
        chain.add_filter(third.clone()).unwrap();

        assert!(chain.dispatch(&raw_event()));
        assert_eq!(first.calls.get(), 1);
        assert_eq!(second.calls.get(), 1);
        assert_eq!(third.calls.get(), 0, "chain ran past the consumer");
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let chain = FilterChain::new();
        let filter = CountingFilter::new(FilterResult::Pass);
        chain.add_filter(filter.clone()).unwrap();
        let dup: Rc<dyn EventFilter> = filter.clone();
        assert!(matches!(
            chain.add_filter(dup),
            Err(InputError::DuplicateFilter)
        ));
        assert_eq!(chain.len(), 1);
        // The original registration stays active.
        chain.dispatch(&raw_event());
        assert_eq!(filter.calls.get(), 1);
    }

    #[test]
    fn remove_unknown_filter_reports_false() {
        let chain = FilterChain::new();
        let filter: Rc<dyn EventFilter> = CountingFilter::new(FilterResult::Pass);
        assert!(!chain.remove_filter(&filter));
    }

    /// Filter that removes itself from the chain during its own callback.
    struct SelfRemovingFilter {
        chain: Weak<FilterChain>,
        this: RefCell<Option<Rc<dyn EventFilter>>>,
        calls: Cell<u32>,
    }

    impl EventFilter for SelfRemovingFilter {
        fn filter(&self, _event: &RawEvent) -> FilterResult {
            self.calls.set(self.calls.get() + 1);
            if let (Some(chain), Some(this)) = (self.chain.upgrade(), self.this.borrow().clone()) {
                assert!(chain.remove_filter(&this));
            }
            FilterResult::Pass
        }
    }

    #[test]
    fn self_removal_during_dispatch_takes_effect_next_dispatch() {
        let chain = Rc::new(FilterChain::new());
        let filter = Rc::new(SelfRemovingFilter {
            chain: Rc::downgrade(&chain),
            this: RefCell::new(None),
            calls: Cell::new(0),
        });
        *filter.this.borrow_mut() = Some(filter.clone() as Rc<dyn EventFilter>);
        chain.add_filter(filter.clone()).unwrap();

        chain.dispatch(&raw_event());
        assert_eq!(filter.calls.get(), 1);
        assert_eq!(chain.len(), 0);

        chain.dispatch(&raw_event());
        assert_eq!(filter.calls.get(), 1, "removed filter ran again");
    }

    /// Drop tracking stands in for the destructor of the original
    /// callback registration.
    struct DropTracker {
        dropped: Rc<Cell<bool>>,
    }

    impl EventFilter for DropTracker {
        fn filter(&self, _event: &RawEvent) -> FilterResult {
            FilterResult::Pass
        }
    }

    impl Drop for DropTracker {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    #[test]
    fn removal_drops_last_reference() {
        let chain = FilterChain::new();
        let dropped = Rc::new(Cell::new(false));
        let filter: Rc<dyn EventFilter> = Rc::new(DropTracker {
            dropped: dropped.clone(),
        });
        chain.add_filter(filter.clone()).unwrap();
        assert!(chain.remove_filter(&filter));
        drop(filter);
        assert!(dropped.get());
    }
}
