#![forbid(unsafe_code)]

//! Reactive bridge between a synced value and its dependency node.
//!
//! [`ReactiveBridge`] owns the value and the `track`/`trigger` pair handed
//! over by [`custom_cell`]. Local writes go through [`SyncedCell::set`],
//! which updates the value, notifies observers and then publishes. Remote
//! values arrive through [`ReactiveBridge::apply_remote`], which updates and
//! notifies but never publishes.

use crate::channel::{ChannelManager, PublishOutcome};
use crate::error::SyncError;
use crate::reactive::{CellHooks, CustomCell, Subscription, Track, Trigger, custom_cell};
use crate::topic::Topic;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

struct BridgeState<T> {
    value: T,
    version: u64,
    hooks: Option<(Track, Trigger)>,
}

/// Shared state behind one [`SyncedCell`].
pub(crate) struct ReactiveBridge<T> {
    topic: Topic,
    state: RefCell<BridgeState<T>>,
}

impl<T: Clone> ReactiveBridge<T> {
    pub(crate) fn new(topic: Topic, initial: T) -> Self {
        Self {
            topic,
            state: RefCell::new(BridgeState {
                value: initial,
                version: 0,
                hooks: None,
            }),
        }
    }

    pub(crate) fn topic(&self) -> &Topic {
        &self.topic
    }

    fn install(&self, track: Track, trigger: Trigger) {
        self.state.borrow_mut().hooks = Some((track, trigger));
    }

    fn track(&self) {
        let track = self.state.borrow().hooks.as_ref().map(|(t, _)| Rc::clone(t));
        if let Some(track) = track {
            track();
        }
    }

    fn trigger(&self) -> bool {
        let trigger = self.state.borrow().hooks.as_ref().map(|(_, t)| Rc::clone(t));
        match trigger {
            Some(trigger) => {
                trigger();
                true
            }
            None => false,
        }
    }

    pub(crate) fn read(&self) -> T {
        let value = self.peek();
        self.track();
        value
    }

    pub(crate) fn peek(&self) -> T {
        self.state.borrow().value.clone()
    }

    pub(crate) fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.state.borrow().value)
    }

    pub(crate) fn version(&self) -> u64 {
        self.state.borrow().version
    }

    fn store(&self, value: T) -> u64 {
        let mut state = self.state.borrow_mut();
        state.value = value;
        state.version += 1;
        state.version
    }

    fn write_local(&self, value: T) -> u64 {
        let version = self.store(value);
        self.trigger();
        version
    }

    /// Apply a value received from another context.
    ///
    /// Fails with [`SyncError::RaceCondition`] if the cell has no trigger yet,
    /// in which case the value is left untouched.
    pub(crate) fn apply_remote(&self, value: T) -> Result<u64, SyncError> {
        if self.state.borrow().hooks.is_none() {
            return Err(SyncError::RaceCondition {
                topic: self.topic.as_str().to_owned(),
            });
        }
        let version = self.store(value);
        self.trigger();
        Ok(version)
    }
}

/// A value mirrored across contexts.
///
/// Reads are tracked by the reactive engine; writes notify local observers
/// synchronously and then publish to peers.
pub struct SyncedCell<T> {
    cell: CustomCell<T>,
    bridge: Rc<ReactiveBridge<T>>,
}

impl<T> Clone for SyncedCell<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            bridge: Rc::clone(&self.bridge),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SyncedCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.bridge.state.borrow();
        f.debug_struct("SyncedCell")
            .field("topic", &self.bridge.topic)
            .field("value", &state.value)
            .field("version", &state.version)
            .finish()
    }
}

impl<T: Clone + Serialize + 'static> SyncedCell<T> {
    /// Wire `bridge` into a new cell. `publisher` is `None` for local-only
    /// bindings.
    pub(crate) fn new(bridge: Rc<ReactiveBridge<T>>, publisher: Option<Rc<ChannelManager>>) -> Self {
        let cell = {
            let bridge = Rc::clone(&bridge);
            custom_cell(move |track, trigger| {
                bridge.install(track, trigger);
                let reader = Rc::clone(&bridge);
                CellHooks {
                    get: Box::new(move || reader.read()),
                    set: Box::new(move |value: T| {
                        let frame = publisher.as_ref().and_then(|m| m.encode(&value));
                        bridge.write_local(value);
                        if let (Some(manager), Some(frame)) = (&publisher, frame) {
                            let _: PublishOutcome = manager.publish_frame(&frame);
                        }
                    }),
                }
            })
        };
        Self { cell, bridge }
    }

    /// Current value. Records a dependency when called inside an effect.
    pub fn get(&self) -> T {
        self.cell.get()
    }

    /// Replace the value, notify observers, then publish it.
    pub fn set(&self, value: T) {
        self.cell.set(value);
    }

    /// Read-modify-write with one notification and one publish. The read is
    /// not tracked.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        let mut value = self.bridge.peek();
        f(&mut value);
        self.set(value);
    }

    /// Borrow the current value without cloning. Tracked like [`get`](Self::get).
    ///
    /// `f` must not write to this cell; the value stays borrowed while it runs.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.bridge.with(f)
    }

    /// Current value without recording a dependency.
    pub fn peek(&self) -> T {
        self.bridge.peek()
    }

    /// Writes applied so far, local and remote.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.bridge.version()
    }

    /// Run `callback` after every applied write. Dropping the guard unsubscribes.
    pub fn subscribe(&self, callback: impl Fn() + 'static) -> Subscription {
        self.cell.subscribe(callback)
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        self.bridge.topic()
    }
}
