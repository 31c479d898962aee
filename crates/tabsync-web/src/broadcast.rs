#![forbid(unsafe_code)]

//! `BroadcastChannel` transport.

use crate::convert::error_text;
use crate::interval::IntervalScheduler;
use js_sys::Reflect;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tabsync::{
    Capability, Channel, Listener, ListenerId, ListenerKind, SyncEnv, Transport, TransportError,
};
use tracing::{debug, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{BroadcastChannel, MessageEvent};

pub(crate) fn js_error_text(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    let field = |key: &str| {
        Reflect::get(value, &JsValue::from_str(key))
            .ok()
            .and_then(|v| v.as_string())
    };
    error_text(field("name").as_deref(), field("message").as_deref())
}

/// Opens a `BroadcastChannel` per topic.
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastTransport;

impl BroadcastTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transport for BroadcastTransport {
    fn name(&self) -> &'static str {
        "broadcast-channel"
    }

    fn open(&self, topic: &str) -> Result<Rc<dyn Channel>, TransportError> {
        let channel = BroadcastChannel::new(topic)
            .map_err(|err| TransportError::open_failed(js_error_text(&err)))?;
        debug!(topic, "BroadcastChannel opened");
        Ok(Rc::new(BroadcastHandle {
            channel,
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
            closed: Cell::new(false),
        }))
    }
}

type EventClosure = Closure<dyn FnMut(MessageEvent)>;

struct BroadcastHandle {
    channel: BroadcastChannel,
    listeners: RefCell<Vec<(ListenerId, ListenerKind, EventClosure)>>,
    next_listener: Cell<u64>,
    closed: Cell<bool>,
}

impl BroadcastHandle {
    fn detach_callback(&self, kind: ListenerKind, callback: &EventClosure) {
        if let Err(err) = self
            .channel
            .remove_event_listener_with_callback(kind.as_str(), callback.as_ref().unchecked_ref())
        {
            warn!(event = kind.as_str(), error = %js_error_text(&err), "could not remove listener");
        }
    }
}

fn event_text(kind: ListenerKind, event: &MessageEvent) -> String {
    match kind {
        ListenerKind::Message => {
            let data = event.data();
            // Frames are always strings; anything else is handed on as-is and
            // fails decoding downstream.
            data.as_string()
                .or_else(|| js_sys::JSON::stringify(&data).ok().and_then(|s| s.as_string()))
                .unwrap_or_default()
        }
        ListenerKind::MessageError => {
            format!("message from {:?} could not be deserialized", event.origin())
        }
    }
}

impl Channel for BroadcastHandle {
    fn send(&self, frame: &str) -> Result<(), TransportError> {
        if self.closed.get() {
            return Err(TransportError::closed("channel is closed"));
        }
        self.channel
            .post_message(&JsValue::from_str(frame))
            .map_err(|err| TransportError::send_failed(js_error_text(&err)))
    }

    fn add_listener(&self, kind: ListenerKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener.get() + 1);
        self.next_listener.set(id.0);
        let callback = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            listener(&event_text(kind, &event));
        });
        if let Err(err) = self
            .channel
            .add_event_listener_with_callback(kind.as_str(), callback.as_ref().unchecked_ref())
        {
            warn!(event = kind.as_str(), error = %js_error_text(&err), "could not add listener");
        }
        self.listeners.borrow_mut().push((id, kind, callback));
        id
    }

    fn remove_listener(&self, kind: ListenerKind, id: ListenerId) {
        let removed = {
            let mut listeners = self.listeners.borrow_mut();
            listeners
                .iter()
                .position(|(lid, lkind, _)| *lid == id && *lkind == kind)
                .map(|index| listeners.remove(index))
        };
        if let Some((_, kind, callback)) = removed {
            self.detach_callback(kind, &callback);
        }
    }

    fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for (_, kind, callback) in &listeners {
            self.detach_callback(*kind, callback);
        }
        self.channel.close();
    }
}

impl Drop for BroadcastHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Check the global scope for `BroadcastChannel`.
#[must_use]
pub fn detect_capability() -> Capability {
    match Reflect::has(&js_sys::global(), &JsValue::from_str("BroadcastChannel")) {
        Ok(true) => Capability::transport(BroadcastTransport::new()),
        Ok(false) => Capability::local_only("BroadcastChannel is not available in this context"),
        Err(err) => Capability::local_only(format!(
            "could not inspect the global scope: {}",
            js_error_text(&err)
        )),
    }
}

/// Environment for bindings in the current window or worker.
#[must_use]
pub fn browser_env() -> SyncEnv {
    SyncEnv::new(detect_capability(), Rc::new(IntervalScheduler::new()))
}
