#![forbid(unsafe_code)]

//! Target-independent conversions between `tabsync` values and what the
//! browser APIs accept or report.

use std::time::Duration;

/// Longest delay `setInterval` honors; larger values fire immediately.
pub const MAX_TIMER_DELAY_MS: i32 = i32::MAX;

/// Convert an interval period to the millisecond argument of `setInterval`.
///
/// Periods are rounded down, raised to at least 1 ms, and capped at
/// [`MAX_TIMER_DELAY_MS`].
#[must_use]
pub fn interval_delay_ms(period: Duration) -> i32 {
    let ms = period.as_millis().max(1);
    i32::try_from(ms).unwrap_or(MAX_TIMER_DELAY_MS)
}

/// Render a thrown JS value as text.
///
/// `DOMException`s carry a `name` (`InvalidStateError`, `DataCloneError`,
/// ...) and a `message`; either may be missing for plain thrown values.
#[must_use]
pub fn error_text(name: Option<&str>, message: Option<&str>) -> String {
    match (name.filter(|n| !n.is_empty()), message.filter(|m| !m.is_empty())) {
        (Some(name), Some(message)) => format!("{name}: {message}"),
        (Some(name), None) => name.to_owned(),
        (None, Some(message)) => message.to_owned(),
        (None, None) => String::from("unknown error"),
    }
}
