#![forbid(unsafe_code)]

//! Cells with user-supplied get/set hooks.

use std::rc::Rc;

use super::dep::{Dep, Subscription};

/// Marks the current read as a dependency of the running effect.
pub type Track = Rc<dyn Fn()>;
/// Notifies everything that tracked the cell.
pub type Trigger = Rc<dyn Fn()>;

/// Read and write hooks returned by a [`custom_cell`] setup closure.
pub struct CellHooks<T> {
    pub get: Box<dyn Fn() -> T>,
    pub set: Box<dyn Fn(T)>,
}

/// A readable/writable cell whose storage and side effects are defined by
/// its hooks. The cell only provides the dependency node.
pub struct CustomCell<T> {
    hooks: Rc<CellHooks<T>>,
    dep: Dep,
}

impl<T> Clone for CustomCell<T> {
    fn clone(&self) -> Self {
        Self {
            hooks: Rc::clone(&self.hooks),
            dep: self.dep.clone(),
        }
    }
}

impl<T> std::fmt::Debug for CustomCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomCell")
            .field("version", &self.dep.version())
            .finish_non_exhaustive()
    }
}

/// Build a cell from a setup closure.
///
/// `setup` receives the `track` and `trigger` hooks of the cell's dependency
/// node and returns the get/set pair. `get` is expected to call `track`;
/// `set` is expected to call `trigger` once the new value is observable.
///
/// ```
/// use tabsync::reactive::{custom_cell, CellHooks};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let store = Rc::new(Cell::new(1));
/// let (r, w) = (Rc::clone(&store), Rc::clone(&store));
/// let cell = custom_cell(move |track, trigger| CellHooks {
///     get: Box::new(move || {
///         track();
///         r.get()
///     }),
///     set: Box::new(move |v| {
///         w.set(v);
///         trigger();
///     }),
/// });
/// cell.set(5);
/// assert_eq!(cell.get(), 5);
/// assert_eq!(cell.version(), 1);
/// ```
pub fn custom_cell<T>(setup: impl FnOnce(Track, Trigger) -> CellHooks<T>) -> CustomCell<T> {
    let dep = Dep::new();
    let track: Track = {
        let dep = dep.clone();
        Rc::new(move || dep.track())
    };
    let trigger: Trigger = {
        let dep = dep.clone();
        Rc::new(move || dep.trigger())
    };
    CustomCell {
        hooks: Rc::new(setup(track, trigger)),
        dep,
    }
}

impl<T> CustomCell<T> {
    pub fn get(&self) -> T {
        (self.hooks.get)()
    }

    pub fn set(&self, value: T) {
        (self.hooks.set)(value)
    }

    /// Number of triggers raised so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.dep.version()
    }

    /// Run `callback` after every trigger. Dropping the guard unsubscribes.
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.dep.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::super::Effect;
    use super::*;
    use std::cell::{Cell, RefCell};

    fn plain_cell(initial: i32) -> CustomCell<i32> {
        let store = Rc::new(RefCell::new(initial));
        let (r, w) = (Rc::clone(&store), store);
        custom_cell(move |track, trigger| CellHooks {
            get: Box::new(move || {
                track();
                *r.borrow()
            }),
            set: Box::new(move |v| {
                *w.borrow_mut() = v;
                trigger();
            }),
        })
    }

    #[test]
    fn get_set() {
        let cell = plain_cell(3);
        assert_eq!(cell.get(), 3);
        cell.set(4);
        assert_eq!(cell.get(), 4);
    }

    #[test]
    fn effect_sees_updates() {
        let cell = plain_cell(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let (c, s) = (cell.clone(), Rc::clone(&seen));
        let _effect = Effect::new(move || s.borrow_mut().push(c.get()));

        cell.set(1);
        cell.set(2);
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn subscribe_counts_triggers() {
        let cell = plain_cell(0);
        let count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&count);
        let sub = cell.subscribe(move || count_clone.set(count_clone.get() + 1));

        cell.set(1);
        drop(sub);
        cell.set(2);
        assert_eq!(count.get(), 1);
        assert_eq!(cell.version(), 2);
    }

    #[test]
    fn clones_share_hooks_and_dep() {
        let a = plain_cell(0);
        let b = a.clone();
        a.set(9);
        assert_eq!(b.get(), 9);
        assert_eq!(b.version(), 1);
    }
}
