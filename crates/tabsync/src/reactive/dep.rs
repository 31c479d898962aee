#![forbid(unsafe_code)]

//! Dependency node with tracked reads and change notification.
//!
//! # Design
//!
//! A [`Dep`] is the notification half of a reactive value: it holds no value
//! itself, only a version counter and a list of subscribers stored as weak
//! references in shared, reference-counted storage (`Rc<RefCell<..>>`).
//!
//! - [`Dep::track`] subscribes the currently running [`Effect`](super::Effect),
//!   if any, so it re-runs on the next trigger.
//! - [`Dep::trigger`] bumps the version and notifies live subscribers in
//!   registration order.
//!
//! # Failure Modes
//!
//! - **Subscriber leak**: If [`Subscription`] guards are stored indefinitely
//!   without being dropped, callbacks accumulate. Dead weak references are
//!   cleaned lazily during `trigger()`.
//! - **Stale dependencies**: an effect stays subscribed to every dep it ever
//!   read, even if a later run no longer reads it. Extra re-runs are possible,
//!   missed ones are not.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::effect::current_observer;

/// A subscriber callback stored as a strong `Rc` by its owner, handed out as
/// `Weak` to the dep.
pub(crate) type CallbackRc = Rc<dyn Fn()>;
type CallbackWeak = Weak<dyn Fn()>;

struct DepInner {
    version: u64,
    /// Subscribers stored as weak references. Dead entries are pruned on trigger.
    subscribers: Vec<CallbackWeak>,
}

/// A shared, version-tracked change signal.
///
/// Cloning a `Dep` creates a new handle to the **same** inner state.
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 on each `trigger()`.
/// 2. Subscribers are notified in registration order.
/// 3. A running effect is subscribed at most once per dep.
#[derive(Clone)]
pub struct Dep {
    inner: Rc<RefCell<DepInner>>,
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Dep")
            .field("version", &inner.version)
            .field("subscriber_count", &inner.subscribers.len())
            .finish()
    }
}

impl Dep {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(DepInner {
                version: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Record a read by the currently running effect, if any.
    pub fn track(&self) {
        let Some(observer) = current_observer() else {
            return;
        };
        let mut inner = self.inner.borrow_mut();
        let already = inner
            .subscribers
            .iter()
            .any(|w| w.upgrade().is_some_and(|cb| Rc::ptr_eq(&cb, &observer)));
        if !already {
            inner.subscribers.push(Rc::downgrade(&observer));
        }
    }

    /// Bump the version and notify every live subscriber.
    pub fn trigger(&self) {
        // Collect live callbacks first so no borrow is held during calls.
        let callbacks: Vec<CallbackRc> = {
            let mut inner = self.inner.borrow_mut();
            inner.version += 1;
            inner.subscribers.retain(|w| w.strong_count() > 0);
            inner
                .subscribers
                .iter()
                .filter_map(|w| w.upgrade())
                .collect()
        };
        for cb in &callbacks {
            cb();
        }
    }

    /// Subscribe to triggers. Dropping the returned guard unsubscribes.
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        let strong: CallbackRc = Rc::new(callback);
        self.inner
            .borrow_mut()
            .subscribers
            .push(Rc::downgrade(&strong));
        Subscription { _guard: strong }
    }

    /// Number of triggers so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.borrow().version
    }

    /// Registered subscribers, including dead ones not yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

/// RAII guard for a subscriber callback.
///
/// Dropping the `Subscription` drops the strong `Rc`, so the `Weak` held by
/// the dep fails to upgrade on the next trigger.
pub struct Subscription {
    _guard: CallbackRc,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn trigger_bumps_version() {
        let dep = Dep::new();
        assert_eq!(dep.version(), 0);
        dep.trigger();
        dep.trigger();
        assert_eq!(dep.version(), 2);
    }

    #[test]
    fn subscribers_are_notified() {
        let dep = Dep::new();
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        let _sub = dep.subscribe(move || count_clone.set(count_clone.get() + 1));

        dep.trigger();
        dep.trigger();
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let dep = Dep::new();
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        let sub = dep.subscribe(move || count_clone.set(count_clone.get() + 1));
        let _other = dep.subscribe(|| {});
        assert_eq!(dep.subscriber_count(), 2);

        drop(sub);
        dep.trigger();
        assert_eq!(count.get(), 0);
        assert_eq!(dep.subscriber_count(), 1);
    }

    #[test]
    fn notification_order_is_registration_order() {
        let dep = Dep::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let log1 = Rc::clone(&log);
        let _s1 = dep.subscribe(move || log1.borrow_mut().push('A'));
        let log2 = Rc::clone(&log);
        let _s2 = dep.subscribe(move || log2.borrow_mut().push('B'));

        dep.trigger();
        assert_eq!(*log.borrow(), vec!['A', 'B']);
    }

    #[test]
    fn track_outside_effect_is_noop() {
        let dep = Dep::new();
        dep.track();
        assert_eq!(dep.subscriber_count(), 0);
    }

    #[test]
    fn subscriber_may_trigger_another_dep() {
        let first = Dep::new();
        let second = Dep::new();
        let second_clone = second.clone();
        let _sub = first.subscribe(move || second_clone.trigger());

        first.trigger();
        assert_eq!(second.version(), 1);
    }
}
