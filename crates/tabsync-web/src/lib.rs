#![forbid(unsafe_code)]

//! Browser host for `tabsync`.
//!
//! On `wasm32` this crate provides:
//!
//! - [`BroadcastTransport`]: channels over the platform `BroadcastChannel`.
//! - [`IntervalScheduler`]: `setInterval`/`clearInterval` on the window or
//!   worker global scope.
//! - [`detect_capability`] and [`browser_env`]: pick the transport, or fall
//!   back to local-only when `BroadcastChannel` is missing.
//! - [`SyncedJson`]: a JS-facing binding of a JSON value.
//!
//! The conversions in [`convert`] are target-independent.

pub mod convert;

#[cfg(target_arch = "wasm32")]
mod broadcast;
#[cfg(target_arch = "wasm32")]
mod interval;
#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use broadcast::{BroadcastTransport, browser_env, detect_capability};
#[cfg(target_arch = "wasm32")]
pub use interval::IntervalScheduler;
#[cfg(target_arch = "wasm32")]
pub use wasm::SyncedJson;
