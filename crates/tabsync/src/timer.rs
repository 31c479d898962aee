#![forbid(unsafe_code)]

//! Recurring timers.
//!
//! Bindings never sleep or spawn; they ask a [`Scheduler`] for an interval
//! and the host fires it from its own event loop. In the browser that is
//! `setInterval` (see `tabsync-web`). [`ManualScheduler`] is the
//! deterministic host: time only moves when [`ManualScheduler::advance`] is
//! called, so tests can assert exactly which ticks fired.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

/// Handle to a scheduled interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Host-provided interval timers and clock.
pub trait Scheduler {
    /// Call `callback` every `period` until cleared.
    fn set_interval(&self, period: Duration, callback: Rc<dyn Fn()>) -> TimerId;

    /// Stop an interval. Unknown ids are ignored.
    fn clear_interval(&self, id: TimerId);

    /// Monotonic milliseconds, used to timestamp diagnostics.
    fn now_ms(&self) -> u64;
}

struct ManualTimer {
    period_ms: u64,
    next_due_ms: u64,
    callback: Rc<dyn Fn()>,
}

#[derive(Default)]
struct ManualState {
    now_ms: u64,
    next_id: u64,
    timers: BTreeMap<u64, ManualTimer>,
    fired: u64,
}

/// Deterministic, host-driven [`Scheduler`].
///
/// Clones share the same clock and timer table.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<ManualState>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ManualScheduler")
            .field("now_ms", &state.now_ms)
            .field("pending", &state.timers.len())
            .field("fired", &state.fired)
            .finish()
    }
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `by`, firing every interval that falls due,
    /// in due order (ties broken by creation order). Returns the number of
    /// callbacks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = {
            let state = self.state.borrow();
            state.now_ms.saturating_add(duration_ms(by))
        };
        let mut fired = 0;
        loop {
            let due = {
                let mut guard = self.state.borrow_mut();
                let state = &mut *guard;
                let next = state
                    .timers
                    .iter()
                    .filter(|(_, t)| t.next_due_ms <= target)
                    .min_by_key(|(id, t)| (t.next_due_ms, **id))
                    .map(|(id, _)| *id);
                match next.and_then(|id| state.timers.get_mut(&id)) {
                    Some(timer) => {
                        let at = timer.next_due_ms;
                        timer.next_due_ms = at.saturating_add(timer.period_ms);
                        let callback = Rc::clone(&timer.callback);
                        state.now_ms = at;
                        state.fired += 1;
                        Some(callback)
                    }
                    None => None,
                }
            };
            let Some(callback) = due else {
                break;
            };
            callback();
            fired += 1;
        }
        self.state.borrow_mut().now_ms = target;
        fired
    }

    /// Millisecond form of [`advance`](Self::advance).
    pub fn advance_ms(&self, ms: u64) -> usize {
        self.advance(Duration::from_millis(ms))
    }

    /// Intervals currently scheduled.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    /// Callbacks run since creation.
    #[must_use]
    pub fn fired_total(&self) -> u64 {
        self.state.borrow().fired
    }
}

impl Scheduler for ManualScheduler {
    fn set_interval(&self, period: Duration, callback: Rc<dyn Fn()>) -> TimerId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        // A zero period would fire forever within one advance.
        let period_ms = duration_ms(period).max(1);
        let next_due_ms = state.now_ms.saturating_add(period_ms);
        state.timers.insert(
            id,
            ManualTimer {
                period_ms,
                next_due_ms,
                callback,
            },
        );
        TimerId(id)
    }

    fn clear_interval(&self, id: TimerId) {
        let _ = self.state.borrow_mut().timers.remove(&id.0);
    }

    fn now_ms(&self) -> u64 {
        self.state.borrow().now_ms
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    fn counter() -> (Rc<Cell<u32>>, Rc<dyn Fn()>) {
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        (count, Rc::new(move || count_clone.set(count_clone.get() + 1)))
    }

    #[test]
    fn fires_each_period() {
        let sched = ManualScheduler::new();
        let (count, cb) = counter();
        sched.set_interval(Duration::from_millis(100), cb);

        assert_eq!(sched.advance_ms(99), 0);
        assert_eq!(sched.advance_ms(1), 1);
        assert_eq!(sched.advance_ms(350), 3);
        assert_eq!(count.get(), 4);
        assert_eq!(sched.now_ms(), 450);
    }

    #[test]
    fn cleared_timer_stops() {
        let sched = ManualScheduler::new();
        let (count, cb) = counter();
        let id = sched.set_interval(Duration::from_millis(10), cb);
        sched.advance_ms(10);
        sched.clear_interval(id);
        assert_eq!(sched.pending_timers(), 0);
        assert_eq!(sched.advance_ms(100), 0);
        assert_eq!(count.get(), 1);
        assert_eq!(sched.fired_total(), 1);
    }

    #[test]
    fn due_order_across_timers() {
        let sched = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2) = (Rc::clone(&log), Rc::clone(&log));
        sched.set_interval(Duration::from_millis(30), Rc::new(move || l1.borrow_mut().push("slow")));
        sched.set_interval(Duration::from_millis(20), Rc::new(move || l2.borrow_mut().push("fast")));

        sched.advance_ms(60);
        // At 60 both are due; the older timer goes first.
        assert_eq!(*log.borrow(), vec!["fast", "slow", "fast", "slow", "fast"]);
    }

    #[test]
    fn callback_may_clear_its_own_timer() {
        let sched = ManualScheduler::new();
        let slot: Rc<Cell<Option<TimerId>>> = Rc::new(Cell::new(None));
        let (count, _) = counter();
        let (s, sl, c) = (sched.clone(), Rc::clone(&slot), Rc::clone(&count));
        let id = sched.set_interval(
            Duration::from_millis(5),
            Rc::new(move || {
                c.set(c.get() + 1);
                if let Some(id) = sl.get() {
                    s.clear_interval(id);
                }
            }),
        );
        slot.set(Some(id));

        assert_eq!(sched.advance_ms(50), 1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn zero_period_is_bounded() {
        let sched = ManualScheduler::new();
        let (count, cb) = counter();
        sched.set_interval(Duration::ZERO, cb);
        assert_eq!(sched.advance_ms(3), 3);
        assert_eq!(count.get(), 3);
    }
}
