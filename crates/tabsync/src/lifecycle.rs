#![forbid(unsafe_code)]

//! Host component lifecycle.
//!
//! A binding needs exactly two things from the component that owns it: a
//! place to run setup when the component is attached and a place to run
//! teardown when it is detached. UI frameworks expose these as mount/unmount
//! hooks; [`ComponentScope`] is a framework-free implementation that the host
//! drives explicitly.

use std::cell::RefCell;
use std::rc::Rc;

/// Callback registered on a lifecycle hook.
pub type Hook = Rc<dyn Fn()>;

/// Registration points for attach/detach callbacks.
pub trait Lifecycle {
    fn on_attach(&self, hook: Hook);
    fn on_detach(&self, hook: Hook);
}

/// Attach state of a [`ComponentScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Created,
    Attached,
    Detached,
}

impl ScopeState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Attached => "attached",
            Self::Detached => "detached",
        }
    }
}

struct ScopeInner {
    state: ScopeState,
    attach: Vec<Hook>,
    detach: Vec<Hook>,
}

/// Explicitly driven component lifecycle.
///
/// Hooks run in registration order. `attach` while attached and `detach`
/// while not attached are no-ops, so every attach is paired with at most one
/// detach. A detached scope may be attached again.
#[derive(Clone)]
pub struct ComponentScope {
    inner: Rc<RefCell<ScopeInner>>,
}

impl Default for ComponentScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ComponentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ComponentScope")
            .field("state", &inner.state)
            .field("attach_hooks", &inner.attach.len())
            .field("detach_hooks", &inner.detach.len())
            .finish()
    }
}

impl ComponentScope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ScopeInner {
                state: ScopeState::Created,
                attach: Vec::new(),
                detach: Vec::new(),
            })),
        }
    }

    #[must_use]
    pub fn state(&self) -> ScopeState {
        self.inner.borrow().state
    }

    /// Run attach hooks. Returns `false` if already attached.
    pub fn attach(&self) -> bool {
        let hooks = {
            let mut inner = self.inner.borrow_mut();
            if inner.state == ScopeState::Attached {
                return false;
            }
            inner.state = ScopeState::Attached;
            inner.attach.clone()
        };
        for hook in &hooks {
            hook();
        }
        true
    }

    /// Run detach hooks. Returns `false` if not attached.
    pub fn detach(&self) -> bool {
        let hooks = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != ScopeState::Attached {
                return false;
            }
            inner.state = ScopeState::Detached;
            inner.detach.clone()
        };
        for hook in &hooks {
            hook();
        }
        true
    }

    #[must_use]
    pub fn hook_counts(&self) -> (usize, usize) {
        let inner = self.inner.borrow();
        (inner.attach.len(), inner.detach.len())
    }
}

impl Lifecycle for ComponentScope {
    fn on_attach(&self, hook: Hook) {
        self.inner.borrow_mut().attach.push(hook);
    }

    fn on_detach(&self, hook: Hook) {
        self.inner.borrow_mut().detach.push(hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging_hook(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Hook {
        let log = Rc::clone(log);
        Rc::new(move || log.borrow_mut().push(tag))
    }

    #[test]
    fn runs_hooks_in_order() {
        let scope = ComponentScope::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        scope.on_attach(logging_hook(&log, "a1"));
        scope.on_attach(logging_hook(&log, "a2"));
        scope.on_detach(logging_hook(&log, "d1"));

        assert!(scope.attach());
        assert!(scope.detach());
        assert_eq!(*log.borrow(), vec!["a1", "a2", "d1"]);
        assert_eq!(scope.state(), ScopeState::Detached);
    }

    #[test]
    fn repeated_transitions_are_ignored() {
        let scope = ComponentScope::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        scope.on_attach(logging_hook(&log, "a"));
        scope.on_detach(logging_hook(&log, "d"));

        assert!(!scope.detach(), "detach before attach");
        assert!(scope.attach());
        assert!(!scope.attach());
        assert!(scope.detach());
        assert!(!scope.detach());
        assert_eq!(*log.borrow(), vec!["a", "d"]);
    }

    #[test]
    fn can_reattach() {
        let scope = ComponentScope::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        scope.on_attach(logging_hook(&log, "a"));
        scope.attach();
        scope.detach();
        scope.attach();
        assert_eq!(*log.borrow(), vec!["a", "a"]);
        assert_eq!(scope.state().as_str(), "attached");
    }

    #[test]
    fn hook_may_register_more_hooks() {
        let scope = ComponentScope::new();
        let inner_scope = scope.clone();
        scope.on_attach(Rc::new(move || inner_scope.on_detach(Rc::new(|| {}))));
        scope.attach();
        assert_eq!(scope.hook_counts(), (1, 1));
    }
}
