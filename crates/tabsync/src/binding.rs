#![forbid(unsafe_code)]

//! Binding factory and lifecycle coordination.
//!
//! [`bind`] validates the topic, builds the bridge and, when the environment
//! has a transport, a channel manager and its inbound router. It then hooks
//! a [`Coordinator`] into the owning component:
//!
//! ```text
//! attach ─▶ open channel ─▶ start health-check interval (if enabled)
//! detach ─▶ stop interval ─▶ remove listeners ─▶ close channel
//! ```
//!
//! Without a transport the binding is a plain local cell and no hooks are
//! registered.

use crate::bridge::{ReactiveBridge, SyncedCell};
use crate::channel::{ChannelManager, ChannelStats, ChannelTransition};
use crate::config::{BindOptions, MIN_HEALTH_CHECK_INTERVAL};
use crate::error::{BindError, SyncError};
use crate::inbound::InboundRouter;
use crate::lifecycle::Lifecycle;
use crate::timer::{Scheduler, TimerId};
use crate::topic::{Topic, TopicKey};
use crate::transport::Capability;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, error, warn};

/// What the host environment provides to bindings.
#[derive(Clone)]
pub struct SyncEnv {
    capability: Capability,
    scheduler: Rc<dyn Scheduler>,
}

impl SyncEnv {
    pub fn new(capability: Capability, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            capability,
            scheduler,
        }
    }

    #[must_use]
    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    #[must_use]
    pub fn scheduler(&self) -> &Rc<dyn Scheduler> {
        &self.scheduler
    }
}

impl std::fmt::Debug for SyncEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEnv")
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

/// A bound value and a handle on its channel.
#[derive(Debug, Clone)]
pub struct Binding<T> {
    pub channel: ChannelRef,
    pub value: SyncedCell<T>,
}

/// Ties one channel manager to the owning component's lifecycle.
struct Coordinator {
    manager: Rc<ChannelManager>,
    _router: Rc<dyn Any>,
    scheduler: Rc<dyn Scheduler>,
    interval: Option<Duration>,
    timer: Cell<Option<TimerId>>,
    attached: Cell<bool>,
}

impl Coordinator {
    fn attach(&self) {
        let topic = self.manager.topic();
        if self.attached.replace(true) {
            debug!(topic = %topic, "already attached");
            return;
        }
        if let Err(err) = self.manager.open() {
            let err = SyncError::InitializationFailure(err);
            error!(topic = %topic, error = %err, "could not open channel; value stays local until re-attached");
            return;
        }
        if let Some(period) = self.interval {
            let manager: Weak<ChannelManager> = Rc::downgrade(&self.manager);
            let id = self.scheduler.set_interval(
                period,
                Rc::new(move || {
                    if let Some(manager) = manager.upgrade() {
                        let _ = manager.health_check();
                    }
                }),
            );
            self.timer.set(Some(id));
        }
        debug!(topic = %topic, generation = self.manager.generation(), "attached");
    }

    fn detach(&self) {
        if !self.attached.replace(false) {
            return;
        }
        if let Some(id) = self.timer.take() {
            self.scheduler.clear_interval(id);
        }
        self.manager.close();
        debug!(topic = %self.manager.topic(), "detached");
    }
}

/// Read-only view of a binding's channel.
#[derive(Clone)]
pub struct ChannelRef {
    topic: Topic,
    coordinator: Option<Rc<Coordinator>>,
}

impl std::fmt::Debug for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRef")
            .field("topic", &self.topic)
            .field("local_only", &self.is_local_only())
            .field("open", &self.is_open())
            .field("generation", &self.generation())
            .finish()
    }
}

impl ChannelRef {
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// `true` when the environment had no transport.
    #[must_use]
    pub fn is_local_only(&self) -> bool {
        self.coordinator.is_none()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.manager().is_some_and(|m| m.is_open())
    }

    /// Generation of the live handle, 0 when none is open.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.manager().map_or(0, |m| m.generation())
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.manager().map_or(0, |m| m.listener_count())
    }

    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.manager().map(|m| m.stats()).unwrap_or_default()
    }

    /// Whether a recurring health check is currently scheduled.
    #[must_use]
    pub fn health_check_scheduled(&self) -> bool {
        self.coordinator
            .as_ref()
            .is_some_and(|c| c.timer.get().is_some())
    }

    /// Probe the channel now, reopening it if the probe fails.
    pub fn health_check(&self) -> bool {
        self.manager().is_some_and(|m| m.health_check())
    }

    /// Take the recorded channel transitions, oldest first.
    #[must_use]
    pub fn drain_transitions(&self) -> Vec<ChannelTransition> {
        self.manager()
            .map(|m| m.drain_transitions())
            .unwrap_or_default()
    }

    /// Take the recorded channel transitions as JSONL lines.
    #[must_use]
    pub fn drain_transition_jsonl(&self, run_id: &str) -> Vec<String> {
        self.drain_transitions()
            .iter()
            .map(|t| t.to_jsonl_line(self.topic.as_str(), run_id))
            .collect()
    }

    fn manager(&self) -> Option<&ChannelManager> {
        self.coordinator.as_deref().map(|c| c.manager.as_ref())
    }
}

/// Bind a value to `key` inside the component owning `scope`.
///
/// Fails only if the topic is invalid. Transport problems never surface
/// here: a missing transport makes the binding local-only, and channel
/// failures are logged and recovered from.
///
/// ```
/// use tabsync::{bind, BindOptions, Capability, ComponentScope, ManualScheduler, MemoryHub, SyncEnv};
/// use std::rc::Rc;
///
/// let hub = MemoryHub::new();
/// let env = SyncEnv::new(Capability::transport(hub.clone()), Rc::new(ManualScheduler::new()));
/// let (tab_a, tab_b) = (ComponentScope::new(), ComponentScope::new());
/// let a = bind(&env, &tab_a, "counter", 0u32, BindOptions::default()).unwrap();
/// let b = bind(&env, &tab_b, "counter", 0u32, BindOptions::default()).unwrap();
/// tab_a.attach();
/// tab_b.attach();
///
/// a.value.set(5);
/// hub.dispatch();
/// assert_eq!(b.value.get(), 5);
/// ```
pub fn bind<K, T>(
    env: &SyncEnv,
    scope: &dyn Lifecycle,
    key: &K,
    initial: T,
    options: BindOptions,
) -> Result<Binding<T>, BindError>
where
    K: TopicKey + ?Sized,
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    let topic = Topic::from_key(key)?;
    let raw = options.raw_health_check_interval();
    if !raw.is_zero() && raw < MIN_HEALTH_CHECK_INTERVAL {
        warn!(
            topic = %topic,
            requested = ?raw,
            min = ?MIN_HEALTH_CHECK_INTERVAL,
            "health-check interval raised to minimum"
        );
    }
    let bridge = Rc::new(ReactiveBridge::new(topic.clone(), initial));

    let transport = match env.capability() {
        Capability::Transport(transport) => Rc::clone(transport),
        Capability::LocalOnly { reason } => {
            error!(topic = %topic, reason = %reason, "no cross-context transport; value is local only");
            return Ok(Binding {
                channel: ChannelRef {
                    topic,
                    coordinator: None,
                },
                value: SyncedCell::new(bridge, None),
            });
        }
    };

    let router = InboundRouter::new(
        Rc::clone(&bridge),
        transport,
        Rc::clone(env.scheduler()),
        options.on_error(),
    );
    let manager = Rc::clone(router.manager());
    let value = SyncedCell::new(bridge, Some(Rc::clone(&manager)));
    let coordinator = Rc::new(Coordinator {
        manager,
        _router: router,
        scheduler: Rc::clone(env.scheduler()),
        interval: options.health_check_interval(),
        timer: Cell::new(None),
        attached: Cell::new(false),
    });

    {
        let c = Rc::clone(&coordinator);
        scope.on_attach(Rc::new(move || c.attach()));
    }
    {
        let c = Rc::clone(&coordinator);
        scope.on_detach(Rc::new(move || c.detach()));
    }

    Ok(Binding {
        channel: ChannelRef {
            topic,
            coordinator: Some(coordinator),
        },
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ComponentScope;
    use crate::timer::ManualScheduler;
    use crate::transport::memory::MemoryHub;

    struct Harness {
        hub: MemoryHub,
        sched: ManualScheduler,
        env: SyncEnv,
    }

    fn harness() -> Harness {
        let hub = MemoryHub::new();
        let sched = ManualScheduler::new();
        let env = SyncEnv::new(Capability::transport(hub.clone()), Rc::new(sched.clone()));
        Harness { hub, sched, env }
    }

    #[test]
    fn registers_one_hook_each() {
        let h = harness();
        let scope = ComponentScope::new();
        let _b = bind(&h.env, &scope, "t", 0u8, BindOptions::default()).unwrap();
        assert_eq!(scope.hook_counts(), (1, 1));
    }

    #[test]
    fn invalid_topic_is_rejected() {
        let h = harness();
        let scope = ComponentScope::new();
        let err = bind(&h.env, &scope, " padded", 0u8, BindOptions::default()).unwrap_err();
        assert!(matches!(err, BindError::InvalidTopic(_)));
        assert_eq!(scope.hook_counts(), (0, 0));
    }

    #[test]
    fn attach_opens_and_schedules() {
        let h = harness();
        let scope = ComponentScope::new();
        let b = bind(&h.env, &scope, "t", 0u8, BindOptions::default()).unwrap();
        assert!(!b.channel.is_open());

        scope.attach();
        assert!(b.channel.is_open());
        assert_eq!(b.channel.generation(), 1);
        assert_eq!(b.channel.listener_count(), 2);
        assert!(b.channel.health_check_scheduled());
        assert_eq!(h.sched.pending_timers(), 1);

        h.sched.advance_ms(3_000);
        assert_eq!(b.channel.stats().probes_sent, 3);
    }

    #[test]
    fn zero_interval_schedules_nothing() {
        let h = harness();
        let scope = ComponentScope::new();
        let b = bind(&h.env, &scope, "t", 0u8, BindOptions::new().without_health_check()).unwrap();
        scope.attach();
        assert!(b.channel.is_open());
        assert_eq!(h.sched.pending_timers(), 0);
        assert!(!b.channel.health_check_scheduled());
    }

    #[test]
    fn detach_stops_timer_and_closes() {
        let h = harness();
        let scope = ComponentScope::new();
        let b = bind(&h.env, &scope, "t", 0u8, BindOptions::default()).unwrap();
        scope.attach();
        scope.detach();

        assert_eq!(h.sched.pending_timers(), 0);
        assert!(!b.channel.is_open());
        assert_eq!(h.hub.open_channels("t"), 0);
        assert_eq!(h.hub.listener_count("t"), 0);
    }

    #[test]
    fn reattach_opens_a_new_generation() {
        let h = harness();
        let scope = ComponentScope::new();
        let b = bind(&h.env, &scope, "t", 0u8, BindOptions::default()).unwrap();
        scope.attach();
        scope.detach();
        scope.attach();
        assert_eq!(b.channel.generation(), 2);
        assert_eq!(h.sched.pending_timers(), 1);
        assert_eq!(h.hub.open_channels("t"), 1);
    }

    #[test]
    fn open_failure_on_attach_stays_local() {
        let h = harness();
        let scope = ComponentScope::new();
        let b = bind(&h.env, &scope, "t", 0u8, BindOptions::default()).unwrap();
        h.hub.fail_next_opens(1);
        scope.attach();

        assert!(!b.channel.is_open());
        assert_eq!(h.sched.pending_timers(), 0);
        b.value.set(4);
        assert_eq!(b.value.get(), 4);
        assert!(h.hub.sent_frames("t").is_empty());

        scope.detach();
        scope.attach();
        assert!(b.channel.is_open());
    }

    #[test]
    fn local_only_binding() {
        let sched = ManualScheduler::new();
        let env = SyncEnv::new(Capability::local_only("unsupported"), Rc::new(sched.clone()));
        let scope = ComponentScope::new();
        let b = bind(&env, &scope, "t", 1i32, BindOptions::default()).unwrap();

        assert!(b.channel.is_local_only());
        assert_eq!(scope.hook_counts(), (0, 0));
        scope.attach();
        b.value.set(2);
        assert_eq!(b.value.get(), 2);
        assert_eq!(b.channel.stats(), ChannelStats::default());
        assert_eq!(sched.pending_timers(), 0);
    }

    #[test]
    fn jsonl_lines_carry_topic() {
        let h = harness();
        let scope = ComponentScope::new();
        let b = bind(&h.env, &scope, "cart", 0u8, BindOptions::default()).unwrap();
        scope.attach();
        scope.detach();
        let lines = b.channel.drain_transition_jsonl("run-7");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"channel_event\":\"opened\""));
        assert!(lines[1].contains("\"channel_event\":\"closed\""));
        assert!(lines.iter().all(|l| l.contains("\"topic\":\"cart\"")));
    }
}
