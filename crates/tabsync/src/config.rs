#![forbid(unsafe_code)]

//! Per-binding options.

use crate::error::DeliveryError;
use crate::topic::Topic;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Default period of the recurring health check.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(1_000);

/// Smallest accepted nonzero health-check period.
pub const MIN_HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Callback receiving inbound delivery failures.
pub type ErrorHook = Rc<dyn Fn(&Topic, &DeliveryError)>;

/// Options accepted by [`bind`](crate::bind).
///
/// ```
/// use tabsync::BindOptions;
/// use std::time::Duration;
///
/// let opts = BindOptions::new().with_health_check_interval_ms(250);
/// assert_eq!(opts.health_check_interval(), Some(Duration::from_millis(250)));
///
/// let opts = BindOptions::new().without_health_check();
/// assert_eq!(opts.health_check_interval(), None);
/// ```
#[derive(Clone)]
pub struct BindOptions {
    health_check_interval: Duration,
    on_error: Option<ErrorHook>,
}

impl Default for BindOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl BindOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            on_error: None,
        }
    }

    /// Set the recurring health-check period. Zero disables the timer.
    #[must_use]
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Millisecond form of [`with_health_check_interval`](Self::with_health_check_interval).
    #[must_use]
    pub fn with_health_check_interval_ms(self, interval_ms: u64) -> Self {
        self.with_health_check_interval(Duration::from_millis(interval_ms))
    }

    /// Disable the recurring health check. Pre-publish probes still run.
    #[must_use]
    pub fn without_health_check(self) -> Self {
        self.with_health_check_interval(Duration::ZERO)
    }

    /// Receive inbound delivery failures for this binding.
    #[must_use]
    pub fn with_on_error(mut self, hook: impl Fn(&Topic, &DeliveryError) + 'static) -> Self {
        self.on_error = Some(Rc::new(hook));
        self
    }

    /// Effective health-check period, or `None` when disabled.
    ///
    /// Nonzero periods below [`MIN_HEALTH_CHECK_INTERVAL`] are raised to it.
    #[must_use]
    pub fn health_check_interval(&self) -> Option<Duration> {
        if self.health_check_interval.is_zero() {
            None
        } else {
            Some(self.health_check_interval.max(MIN_HEALTH_CHECK_INTERVAL))
        }
    }

    #[must_use]
    pub(crate) fn raw_health_check_interval(&self) -> Duration {
        self.health_check_interval
    }

    #[must_use]
    pub(crate) fn on_error(&self) -> Option<ErrorHook> {
        self.on_error.clone()
    }
}

impl fmt::Debug for BindOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindOptions")
            .field("health_check_interval", &self.health_check_interval)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
