#![forbid(unsafe_code)]

//! In-process transport with `BroadcastChannel` semantics.
//!
//! # Design
//!
//! [`MemoryHub`] plays the role of the browser: every channel opened through
//! it is an endpoint keyed by topic. A frame sent from one endpoint is queued
//! for every *other* open endpoint on the same topic, never for the sender.
//! Nothing is delivered until the host calls [`MemoryHub::dispatch`], which
//! stands in for the event loop and keeps tests deterministic.
//!
//! Failure injection covers the cases the channel manager must survive:
//!
//! | Injection | Effect |
//! |-----------|--------|
//! | [`fail_next_sends`](MemoryHub::fail_next_sends) | next `n` sends on the topic fail |
//! | [`fail_sends_after`](MemoryHub::fail_sends_after) | skip `k` sends, then fail `n` |
//! | [`sever`](MemoryHub::sever) | every currently open endpoint on the topic fails all sends |
//! | [`fail_next_opens`](MemoryHub::fail_next_opens) | next `n` opens fail |
//! | [`inject_message_error`](MemoryHub::inject_message_error) | queue a `messageerror` event |
//!
//! Closing a channel drops its endpoint. Accepted frames are kept in a ring
//! of the last [`SENT_LOG_CAPACITY`] entries.

use super::{Channel, Listener, ListenerId, ListenerKind, Transport};
use crate::error::TransportError;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

/// Accepted frames retained for [`MemoryHub::sent_frames`].
pub const SENT_LOG_CAPACITY: usize = 1024;

struct SentFrame {
    topic: String,
    frame: String,
}

struct Endpoint {
    topic: String,
    broken: bool,
    listeners: Vec<(ListenerId, ListenerKind, Listener)>,
}

#[derive(Debug, Clone, Copy, Default)]
struct SendFaults {
    skip: usize,
    fail: usize,
}

struct Delivery {
    target: u64,
    kind: ListenerKind,
    data: String,
}

#[derive(Default)]
struct HubInner {
    next_endpoint: u64,
    next_listener: u64,
    endpoints: BTreeMap<u64, Endpoint>,
    queue: VecDeque<Delivery>,
    faults: HashMap<String, SendFaults>,
    open_failures: usize,
    opened: HashMap<String, usize>,
    sent: VecDeque<SentFrame>,
}

impl HubInner {
    fn enqueue_for_topic(&mut self, topic: &str, except: Option<u64>, kind: ListenerKind, data: &str) {
        let targets: Vec<u64> = self
            .endpoints
            .iter()
            .filter(|(id, ep)| ep.topic == topic && Some(**id) != except)
            .map(|(id, _)| *id)
            .collect();
        for target in targets {
            self.queue.push_back(Delivery {
                target,
                kind,
                data: data.to_owned(),
            });
        }
    }

    fn record_sent(&mut self, topic: &str, frame: &str) {
        if self.sent.len() == SENT_LOG_CAPACITY {
            self.sent.pop_front();
        }
        self.sent.push_back(SentFrame {
            topic: topic.to_owned(),
            frame: frame.to_owned(),
        });
    }
}

/// Shared in-process broadcast bus. Clones are handles to the same bus.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Rc<RefCell<HubInner>>,
}

impl std::fmt::Debug for MemoryHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("MemoryHub")
            .field("endpoints", &inner.endpoints.len())
            .field("opened", &inner.opened.values().sum::<usize>())
            .field("pending", &inner.queue.len())
            .field("sent", &inner.sent.len())
            .finish()
    }
}

impl MemoryHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver queued frames until the queue is empty, including frames sent
    /// by listeners during delivery. Returns the number of deliveries made to
    /// open endpoints.
    pub fn dispatch(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.inner.borrow_mut().queue.pop_front();
            let Some(delivery) = next else {
                break;
            };
            let listeners: Vec<Listener> = {
                let inner = self.inner.borrow();
                match inner.endpoints.get(&delivery.target) {
                    Some(ep) => ep
                        .listeners
                        .iter()
                        .filter(|(_, kind, _)| *kind == delivery.kind)
                        .map(|(_, _, listener)| Rc::clone(listener))
                        .collect(),
                    None => continue,
                }
            };
            delivered += 1;
            for listener in &listeners {
                listener(&delivery.data);
            }
        }
        delivered
    }

    /// Deliveries waiting for [`dispatch`](Self::dispatch).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Make the next `count` sends on `topic` fail.
    pub fn fail_next_sends(&self, topic: &str, count: usize) {
        self.fail_sends_after(topic, 0, count);
    }

    /// Let `skip` sends on `topic` succeed, then fail the following `count`.
    pub fn fail_sends_after(&self, topic: &str, skip: usize, count: usize) {
        self.inner
            .borrow_mut()
            .faults
            .insert(topic.to_owned(), SendFaults { skip, fail: count });
    }

    /// Break every endpoint currently open on `topic`. Endpoints opened
    /// afterwards work normally.
    pub fn sever(&self, topic: &str) {
        let mut inner = self.inner.borrow_mut();
        for ep in inner.endpoints.values_mut() {
            if ep.topic == topic {
                ep.broken = true;
            }
        }
    }

    /// Make the next `count` calls to `open` fail.
    pub fn fail_next_opens(&self, count: usize) {
        self.inner.borrow_mut().open_failures = count;
    }

    /// Queue a frame for every open endpoint on `topic`, as if posted by a
    /// context outside this hub.
    pub fn inject_frame(&self, topic: &str, frame: &str) {
        self.inner
            .borrow_mut()
            .enqueue_for_topic(topic, None, ListenerKind::Message, frame);
    }

    /// Queue a `messageerror` event for every open endpoint on `topic`.
    pub fn inject_message_error(&self, topic: &str, detail: &str) {
        self.inner
            .borrow_mut()
            .enqueue_for_topic(topic, None, ListenerKind::MessageError, detail);
    }

    /// Frames accepted for `topic`, in send order, out of the most recent
    /// [`SENT_LOG_CAPACITY`] across all topics.
    #[must_use]
    pub fn sent_frames(&self, topic: &str) -> Vec<String> {
        self.inner
            .borrow()
            .sent
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| s.frame.clone())
            .collect()
    }

    /// Endpoints currently open on `topic`.
    #[must_use]
    pub fn open_channels(&self, topic: &str) -> usize {
        self.inner
            .borrow()
            .endpoints
            .values()
            .filter(|ep| ep.topic == topic)
            .count()
    }

    /// Endpoints held by the hub across all topics.
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.inner.borrow().endpoints.len()
    }

    /// Successful opens on `topic` since the hub was created.
    #[must_use]
    pub fn opened_total(&self, topic: &str) -> usize {
        self.inner.borrow().opened.get(topic).copied().unwrap_or(0)
    }

    /// Listeners registered across the open endpoints on `topic`.
    #[must_use]
    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner
            .borrow()
            .endpoints
            .values()
            .filter(|ep| ep.topic == topic)
            .map(|ep| ep.listeners.len())
            .sum()
    }
}

impl Transport for MemoryHub {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&self, topic: &str) -> Result<Rc<dyn Channel>, TransportError> {
        let mut inner = self.inner.borrow_mut();
        if inner.open_failures > 0 {
            inner.open_failures -= 1;
            return Err(TransportError::open_failed("injected open failure"));
        }
        inner.next_endpoint += 1;
        let id = inner.next_endpoint;
        *inner.opened.entry(topic.to_owned()).or_default() += 1;
        inner.endpoints.insert(
            id,
            Endpoint {
                topic: topic.to_owned(),
                broken: false,
                listeners: Vec::new(),
            },
        );
        Ok(Rc::new(MemoryChannel {
            hub: self.clone(),
            id,
        }))
    }
}

/// One endpoint of a [`MemoryHub`].
struct MemoryChannel {
    hub: MemoryHub,
    id: u64,
}

impl Channel for MemoryChannel {
    fn send(&self, frame: &str) -> Result<(), TransportError> {
        let mut inner = self.hub.inner.borrow_mut();
        let topic = match inner.endpoints.get(&self.id) {
            Some(ep) if ep.broken => {
                return Err(TransportError::send_failed("channel is broken"));
            }
            Some(ep) => ep.topic.clone(),
            None => return Err(TransportError::closed("channel is closed")),
        };
        if let Some(faults) = inner.faults.get_mut(&topic) {
            if faults.skip > 0 {
                faults.skip -= 1;
            } else if faults.fail > 0 {
                faults.fail -= 1;
                return Err(TransportError::send_failed("injected send failure"));
            }
        }
        inner.record_sent(&topic, frame);
        inner.enqueue_for_topic(&topic, Some(self.id), ListenerKind::Message, frame);
        Ok(())
    }

    fn add_listener(&self, kind: ListenerKind, listener: Listener) -> ListenerId {
        let mut inner = self.hub.inner.borrow_mut();
        inner.next_listener += 1;
        let id = ListenerId(inner.next_listener);
        if let Some(ep) = inner.endpoints.get_mut(&self.id) {
            ep.listeners.push((id, kind, listener));
        }
        id
    }

    fn remove_listener(&self, kind: ListenerKind, id: ListenerId) {
        if let Some(ep) = self.hub.inner.borrow_mut().endpoints.get_mut(&self.id) {
            ep.listeners
                .retain(|(lid, lkind, _)| !(*lid == id && *lkind == kind));
        }
    }

    fn close(&self) {
        // Listeners drop after the hub borrow is released.
        let removed = self.hub.inner.borrow_mut().endpoints.remove(&self.id);
        drop(removed);
    }
}
