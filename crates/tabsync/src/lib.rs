#![forbid(unsafe_code)]

//! Reactive values mirrored across browsing contexts.
//!
//! A binding ties one named topic to one reactive cell. Local writes update
//! the cell, notify observers and publish the value to every other context
//! bound to the same topic; values received from those contexts update the
//! cell and notify observers without being published again.
//!
//! # Pieces
//!
//! - [`bind`] creates a [`Binding`]: a [`SyncedCell`] plus a [`ChannelRef`]
//!   for diagnostics.
//! - The channel manager owns the live channel, probes it before every
//!   publish and on a recurring interval, and replaces it when a send fails.
//! - The owning component's [`Lifecycle`] opens the channel on attach and
//!   closes it on detach.
//!
//! The host supplies a [`SyncEnv`]: a [`Capability`] (a [`Transport`] or
//! local-only) and a [`Scheduler`]. [`MemoryHub`] and [`ManualScheduler`]
//! are in-process implementations; `tabsync-web` provides the browser ones.
//!
//! # Example
//!
//! ```
//! use tabsync::{bind, BindOptions, Capability, ComponentScope, ManualScheduler, MemoryHub, SyncEnv};
//! use tabsync::reactive::Effect;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! tabsync::topics! {
//!     enum AppTopic {
//!         Theme => "app.theme",
//!     }
//! }
//!
//! let hub = MemoryHub::new();
//! let env = SyncEnv::new(Capability::transport(hub.clone()), Rc::new(ManualScheduler::new()));
//!
//! let (tab_a, tab_b) = (ComponentScope::new(), ComponentScope::new());
//! let a = bind(&env, &tab_a, &AppTopic::Theme, String::from("light"), BindOptions::default()).unwrap();
//! let b = bind(&env, &tab_b, &AppTopic::Theme, String::from("light"), BindOptions::default()).unwrap();
//! tab_a.attach();
//! tab_b.attach();
//!
//! let renders = Rc::new(Cell::new(0));
//! let (theme, r) = (b.value.clone(), Rc::clone(&renders));
//! let _render = Effect::new(move || {
//!     let _ = theme.get();
//!     r.set(r.get() + 1);
//! });
//!
//! a.value.set("dark".into());
//! hub.dispatch();
//! assert_eq!(b.value.get(), "dark");
//! assert_eq!(renders.get(), 2);
//! ```

pub mod binding;
pub mod bridge;
pub mod channel;
pub mod config;
pub mod envelope;
pub mod error;
mod inbound;
pub mod lifecycle;
pub mod reactive;
pub mod timer;
pub mod topic;
pub mod transport;

pub use binding::{Binding, ChannelRef, SyncEnv, bind};
pub use bridge::SyncedCell;
pub use channel::{ChannelEventKind, ChannelStats, ChannelTransition, PublishOutcome};
pub use config::{BindOptions, DEFAULT_HEALTH_CHECK_INTERVAL, ErrorHook, MIN_HEALTH_CHECK_INTERVAL};
pub use error::{BindError, DeliveryError, SyncError, TopicError, TransportError, TransportErrorKind};
pub use lifecycle::{ComponentScope, Hook, Lifecycle, ScopeState};
pub use timer::{ManualScheduler, Scheduler, TimerId};
pub use topic::{MAX_TOPIC_LEN, Topic, TopicKey};
pub use transport::memory::MemoryHub;
pub use transport::{Capability, Channel, Listener, ListenerId, ListenerKind, Transport};
