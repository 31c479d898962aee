#![forbid(unsafe_code)]

//! Auto-tracking side effects.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::dep::CallbackRc;

thread_local! {
    /// Re-run callbacks of the effects currently executing, innermost last.
    static OBSERVERS: RefCell<Vec<CallbackRc>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn current_observer() -> Option<CallbackRc> {
    OBSERVERS.with(|stack| stack.borrow().last().cloned())
}

/// Pops the observer stack even if the effect body panics.
struct ObserverGuard;

impl ObserverGuard {
    fn push(observer: CallbackRc) -> Self {
        OBSERVERS.with(|stack| stack.borrow_mut().push(observer));
        Self
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        OBSERVERS.with(|stack| {
            let _ = stack.borrow_mut().pop();
        });
    }
}

struct EffectNode {
    body: Box<dyn Fn()>,
    runs: Cell<u64>,
    rerun: CallbackRc,
}

impl EffectNode {
    fn run(&self) {
        let _guard = ObserverGuard::push(Rc::clone(&self.rerun));
        (self.body)();
        self.runs.set(self.runs.get() + 1);
    }
}

/// A closure that runs once immediately and again whenever any
/// [`Dep`](super::Dep) it read during a run is triggered.
///
/// Dropping the `Effect` stops it.
///
/// ```
/// use tabsync::reactive::{Dep, Effect};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let dep = Dep::new();
/// let seen = Rc::new(Cell::new(0));
/// let (d, s) = (dep.clone(), Rc::clone(&seen));
/// let effect = Effect::new(move || {
///     d.track();
///     s.set(s.get() + 1);
/// });
/// dep.trigger();
/// assert_eq!(seen.get(), 2);
/// drop(effect);
/// dep.trigger();
/// assert_eq!(seen.get(), 2);
/// ```
pub struct Effect {
    node: Rc<EffectNode>,
}

impl Effect {
    pub fn new(body: impl Fn() + 'static) -> Self {
        let node = Rc::new_cyclic(|weak: &Weak<EffectNode>| {
            let weak = weak.clone();
            EffectNode {
                body: Box::new(body),
                runs: Cell::new(0),
                rerun: Rc::new(move || {
                    if let Some(node) = weak.upgrade() {
                        node.run();
                    }
                }),
            }
        });
        node.run();
        Self { node }
    }

    /// How many times the body has completed.
    #[must_use]
    pub fn runs(&self) -> u64 {
        self.node.runs.get()
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect").field("runs", &self.runs()).finish()
    }
}
