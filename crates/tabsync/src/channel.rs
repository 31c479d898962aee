#![forbid(unsafe_code)]

//! Channel manager: owns the one live channel of a binding.
//!
//! # Design
//!
//! The manager holds at most one [`Channel`] at a time, together with the
//! ids of the two inbound listeners registered on it. Every outbound frame
//! goes through [`ChannelManager::publish_frame`], which first probes the
//! channel with a sentinel frame and then sends the payload. Either failure
//! replaces the channel:
//!
//! ```text
//! probe ──fail──▶ reopen ─▶ send payload on the new handle
//!   │
//!   ok ─▶ send payload ──fail──▶ reopen (payload dropped)
//! ```
//!
//! # Invariants
//!
//! 1. While open, exactly one channel is held and it carries exactly one
//!    listener of each [`ListenerKind`].
//! 2. `reopen` registers listeners on the replacement before the old channel
//!    is released, so the slot is never observed empty while open.
//! 3. `close` always releases the channel currently in the slot.
//! 4. No `RefCell` borrow is held while calling into the transport.
//!
//! # Failure Modes
//!
//! | Mode | Behavior |
//! |------|----------|
//! | probe fails | logged, reopen, payload still sent on the new handle |
//! | payload send fails | logged, reopen, payload dropped |
//! | reopen's open fails | logged, broken handle kept, next probe retries |
//! | publish while closed | skipped, counted |

use crate::envelope::{encode_payload, encode_probe};
use crate::error::{SyncError, TransportError};
use crate::timer::Scheduler;
use crate::topic::Topic;
use crate::transport::{Channel, Listener, ListenerId, ListenerKind, Transport};
use serde::Serialize;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, error, trace, warn};

const TRANSITION_LOG_CAPACITY: usize = 256;

/// Counters kept per binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub payloads_sent: u64,
    pub probes_sent: u64,
    pub send_failures: u64,
    pub probe_failures: u64,
    pub reopens: u64,
    pub reopen_failures: u64,
    pub messages_received: u64,
    pub probes_received: u64,
    pub delivery_errors: u64,
    pub dropped_messages: u64,
    pub topic_mismatches: u64,
    pub skipped_publishes: u64,
    pub encode_failures: u64,
}

/// Channel lifecycle events recorded for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventKind {
    Opened,
    OpenFailed,
    ProbeFailed,
    SendFailed,
    Reopened,
    ReopenFailed,
    Closed,
}

impl ChannelEventKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::OpenFailed => "open_failed",
            Self::ProbeFailed => "probe_failed",
            Self::SendFailed => "send_failed",
            Self::Reopened => "reopened",
            Self::ReopenFailed => "reopen_failed",
            Self::Closed => "closed",
        }
    }
}

/// One recorded channel event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelTransition {
    pub seq: u64,
    pub at_ms: u64,
    pub event: ChannelEventKind,
    /// Generation of the handle the event concerns (0 if none was opened).
    pub generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ChannelTransition {
    /// Serialize one JSONL line for diagnostics.
    #[must_use]
    pub fn to_jsonl_line(&self, topic: &str, run_id: &str) -> String {
        let record = ChannelTransitionJsonl {
            schema_version: "tabsync-jsonl-v1",
            event: "channel_transition",
            run_id,
            topic,
            ts_ms: self.at_ms,
            seq: self.seq,
            channel_event: self.event.as_str(),
            generation: self.generation,
            reason: self.reason.as_deref(),
        };
        match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(error) => json!({
                "schema_version": "tabsync-jsonl-v1",
                "event": "channel_transition_encode_error",
                "run_id": run_id,
                "seq": self.seq,
                "error": error.to_string(),
            })
            .to_string(),
        }
    }
}

#[derive(Serialize)]
struct ChannelTransitionJsonl<'a> {
    schema_version: &'static str,
    event: &'static str,
    run_id: &'a str,
    topic: &'a str,
    ts_ms: u64,
    seq: u64,
    channel_event: &'static str,
    generation: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

/// Result of one publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The payload was accepted by the handle of this generation.
    Sent { generation: u64 },
    /// The payload send failed; the channel was reopened and the payload dropped.
    Failed,
    /// No channel is open; nothing was sent.
    Detached,
}

/// The two inbound listeners registered on every handle.
pub(crate) struct InboundHandlers {
    pub(crate) on_message: Listener,
    pub(crate) on_error: Listener,
}

struct ChannelSlot {
    channel: Rc<dyn Channel>,
    generation: u64,
    listeners: Vec<(ListenerKind, ListenerId)>,
}

impl ChannelSlot {
    fn release(self) {
        for (kind, id) in self.listeners {
            self.channel.remove_listener(kind, id);
        }
        self.channel.close();
    }
}

/// Owner of the live channel for one topic.
pub struct ChannelManager {
    topic: Topic,
    transport: Rc<dyn Transport>,
    scheduler: Rc<dyn Scheduler>,
    handlers: InboundHandlers,
    probe_frame: String,
    slot: RefCell<Option<ChannelSlot>>,
    generation: Cell<u64>,
    stats: Cell<ChannelStats>,
    seq: Cell<u64>,
    transitions: RefCell<VecDeque<ChannelTransition>>,
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("topic", &self.topic)
            .field("transport", &self.transport.name())
            .field("generation", &self.generation())
            .field("stats", &self.stats.get())
            .finish()
    }
}

impl ChannelManager {
    pub(crate) fn new(
        topic: Topic,
        transport: Rc<dyn Transport>,
        scheduler: Rc<dyn Scheduler>,
        handlers: InboundHandlers,
    ) -> Self {
        let probe_frame = encode_probe(topic.as_str());
        Self {
            topic,
            transport,
            scheduler,
            handlers,
            probe_frame,
            slot: RefCell::new(None),
            generation: Cell::new(0),
            stats: Cell::new(ChannelStats::default()),
            seq: Cell::new(0),
            transitions: RefCell::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Generation of the current handle, or 0 when closed.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.slot.borrow().as_ref().map_or(0, |s| s.generation)
    }

    /// Listeners registered on the current handle.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.slot.borrow().as_ref().map_or(0, |s| s.listeners.len())
    }

    #[must_use]
    pub fn stats(&self) -> ChannelStats {
        self.stats.get()
    }

    #[must_use]
    pub fn drain_transitions(&self) -> Vec<ChannelTransition> {
        self.transitions.borrow_mut().drain(..).collect()
    }

    pub(crate) fn note(&self, f: impl FnOnce(&mut ChannelStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    /// Open the channel if none is held. Returns the live generation.
    pub(crate) fn open(&self) -> Result<u64, TransportError> {
        if let Some(generation) = self.slot.borrow().as_ref().map(|s| s.generation) {
            return Ok(generation);
        }
        match self.open_slot() {
            Ok(slot) => {
                let generation = slot.generation;
                *self.slot.borrow_mut() = Some(slot);
                self.record(ChannelEventKind::Opened, generation, None);
                debug!(topic = %self.topic, generation, transport = self.transport.name(), "channel opened");
                Ok(generation)
            }
            Err(err) => {
                self.record(ChannelEventKind::OpenFailed, 0, Some(err.to_string()));
                Err(err)
            }
        }
    }

    /// Encode a payload frame. Encoding failures are logged and counted.
    pub(crate) fn encode<T: Serialize>(&self, value: &T) -> Option<String> {
        match encode_payload(self.topic.as_str(), value) {
            Ok(frame) => Some(frame),
            Err(err) => {
                let err = SyncError::Encode(err.to_string());
                warn!(topic = %self.topic, error = %err, "publish dropped");
                self.note(|s| s.encode_failures += 1);
                None
            }
        }
    }

    /// Probe, then send `frame` once. Never retries the frame.
    pub(crate) fn publish_frame(&self, frame: &str) -> PublishOutcome {
        if !self.is_open() {
            debug!(topic = %self.topic, "channel not open; publish skipped");
            self.note(|s| s.skipped_publishes += 1);
            return PublishOutcome::Detached;
        }
        self.health_check();
        let Some((channel, generation)) = self.current() else {
            return PublishOutcome::Detached;
        };
        match channel.send(frame) {
            Ok(()) => {
                self.note(|s| s.payloads_sent += 1);
                trace!(topic = %self.topic, generation, "payload published");
                PublishOutcome::Sent { generation }
            }
            Err(err) => {
                let reason = err.to_string();
                let err = SyncError::TransportBroken(err);
                warn!(topic = %self.topic, generation, error = %err, "publish failed; reopening channel");
                self.note(|s| s.send_failures += 1);
                self.record(ChannelEventKind::SendFailed, generation, Some(reason));
                self.reopen();
                PublishOutcome::Failed
            }
        }
    }

    /// Send a sentinel frame; reopen on failure. Returns whether the probe
    /// went through on the handle that was current when called.
    pub fn health_check(&self) -> bool {
        let Some((channel, generation)) = self.current() else {
            return false;
        };
        match channel.send(&self.probe_frame) {
            Ok(()) => {
                self.note(|s| s.probes_sent += 1);
                true
            }
            Err(err) => {
                let reason = err.to_string();
                let err = SyncError::TransportBroken(err);
                warn!(topic = %self.topic, generation, error = %err, "health check failed; reopening channel");
                self.note(|s| s.probe_failures += 1);
                self.record(ChannelEventKind::ProbeFailed, generation, Some(reason));
                self.reopen();
                false
            }
        }
    }

    /// Remove both listeners and close the current handle. Idempotent.
    pub(crate) fn close(&self) {
        let Some(slot) = self.slot.borrow_mut().take() else {
            return;
        };
        let generation = slot.generation;
        slot.release();
        self.record(ChannelEventKind::Closed, generation, None);
        debug!(topic = %self.topic, generation, "channel closed");
    }

    fn reopen(&self) -> bool {
        match self.open_slot() {
            Ok(slot) => {
                let generation = slot.generation;
                let old = self.slot.borrow_mut().replace(slot);
                if let Some(old) = old {
                    old.release();
                }
                self.note(|s| s.reopens += 1);
                self.record(ChannelEventKind::Reopened, generation, None);
                debug!(topic = %self.topic, generation, "channel reopened");
                true
            }
            Err(err) => {
                error!(
                    topic = %self.topic,
                    error = %err,
                    "could not reopen channel; keeping the broken handle until the next attempt"
                );
                self.note(|s| s.reopen_failures += 1);
                self.record(ChannelEventKind::ReopenFailed, self.generation(), Some(err.to_string()));
                false
            }
        }
    }

    fn open_slot(&self) -> Result<ChannelSlot, TransportError> {
        let channel = self.transport.open(self.topic.as_str())?;
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        let listeners = [
            (ListenerKind::Message, &self.handlers.on_message),
            (ListenerKind::MessageError, &self.handlers.on_error),
        ]
        .into_iter()
        .map(|(kind, listener)| (kind, channel.add_listener(kind, Rc::clone(listener))))
        .collect();
        Ok(ChannelSlot {
            channel,
            generation,
            listeners,
        })
    }

    fn current(&self) -> Option<(Rc<dyn Channel>, u64)> {
        self.slot
            .borrow()
            .as_ref()
            .map(|s| (Rc::clone(&s.channel), s.generation))
    }

    fn record(&self, event: ChannelEventKind, generation: u64, reason: Option<String>) {
        let seq = self.seq.get() + 1;
        self.seq.set(seq);
        let transition = ChannelTransition {
            seq,
            at_ms: self.scheduler.now_ms(),
            event,
            generation,
            reason,
        };
        let mut transitions = self.transitions.borrow_mut();
        if transitions.len() >= TRANSITION_LOG_CAPACITY {
            let _ = transitions.pop_front();
        }
        transitions.push_back(transition);
    }
}
