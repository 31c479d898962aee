#![forbid(unsafe_code)]

//! Minimal dependency-tracking engine.
//!
//! Synchronized values only need two hooks from a reactive framework: `track`
//! (record a read) and `trigger` (announce a change). This module provides
//! those hooks plus just enough machinery to observe them:
//!
//! - [`Dep`]: a version-tracked change signal with weak subscriber lists.
//! - [`Effect`]: a closure re-run whenever a dep it read is triggered.
//! - [`custom_cell`]: builds a [`CustomCell`] from user-defined get/set hooks.
//! - [`Subscription`]: RAII guard that unsubscribes on drop.
//!
//! # Architecture
//!
//! Everything is single-threaded: shared state lives in `Rc<RefCell<..>>`,
//! the running effect is tracked in a thread-local stack, and no borrow is
//! held while callbacks run.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per trigger.
//! 2. Subscribers are notified in registration order.
//! 3. Dropping a [`Subscription`] or [`Effect`] removes the callback before the
//!    next notification cycle.

pub mod cell;
pub mod dep;
pub mod effect;

pub use cell::{CellHooks, CustomCell, Track, Trigger, custom_cell};
pub use dep::{Dep, Subscription};
pub use effect::Effect;
