#![forbid(unsafe_code)]

//! Inbound routing: the single entry point for frames from peers.

use crate::bridge::ReactiveBridge;
use crate::channel::{ChannelManager, InboundHandlers};
use crate::config::ErrorHook;
use crate::envelope::{Inbound, decode};
use crate::error::{DeliveryError, SyncError};
use crate::timer::Scheduler;
use crate::transport::{Listener, Transport};
use serde::de::DeserializeOwned;
use std::rc::{Rc, Weak};
use tracing::{debug, error, trace};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InboundOutcome {
    Applied { version: u64 },
    Probe,
    TopicMismatch,
    Dropped,
    Rejected,
    Closed,
}

/// Validates inbound frames and forwards payloads to the bridge.
///
/// Owns the [`ChannelManager`]; the manager's listeners only hold a `Weak`
/// back to the router.
pub(crate) struct InboundRouter<T> {
    bridge: Rc<ReactiveBridge<T>>,
    manager: Rc<ChannelManager>,
    on_error: Option<ErrorHook>,
}

impl<T: Clone + DeserializeOwned + 'static> InboundRouter<T> {
    pub(crate) fn new(
        bridge: Rc<ReactiveBridge<T>>,
        transport: Rc<dyn Transport>,
        scheduler: Rc<dyn Scheduler>,
        on_error: Option<ErrorHook>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let on_message: Listener = {
                let weak = weak.clone();
                Rc::new(move |frame: &str| {
                    if let Some(router) = weak.upgrade() {
                        let _ = router.route(frame);
                    }
                })
            };
            let on_error_event: Listener = {
                let weak = weak.clone();
                Rc::new(move |detail: &str| {
                    if let Some(router) = weak.upgrade() {
                        router.on_message_error(detail);
                    }
                })
            };
            let manager = Rc::new(ChannelManager::new(
                bridge.topic().clone(),
                transport,
                scheduler,
                InboundHandlers {
                    on_message,
                    on_error: on_error_event,
                },
            ));
            Self {
                bridge,
                manager,
                on_error,
            }
        })
    }

    pub(crate) fn manager(&self) -> &Rc<ChannelManager> {
        &self.manager
    }

    pub(crate) fn route(&self, frame: &str) -> InboundOutcome {
        let topic = self.manager.topic();
        if !self.manager.is_open() {
            trace!(topic = %topic, "frame after close ignored");
            return InboundOutcome::Closed;
        }
        let inbound = match decode::<T>(frame) {
            Ok(inbound) => inbound,
            Err(err) => {
                self.report(DeliveryError::Decode {
                    detail: err.to_string(),
                });
                return InboundOutcome::Rejected;
            }
        };
        if inbound.topic() != topic.as_str() {
            debug!(topic = %topic, received = inbound.topic(), "frame for another topic ignored");
            self.manager.note(|s| s.topic_mismatches += 1);
            return InboundOutcome::TopicMismatch;
        }
        match inbound {
            Inbound::Probe { .. } => {
                self.manager.note(|s| s.probes_received += 1);
                InboundOutcome::Probe
            }
            Inbound::Payload { value, .. } => {
                self.manager.note(|s| s.messages_received += 1);
                match self.bridge.apply_remote(value) {
                    Ok(version) => {
                        trace!(topic = %topic, version, "remote value applied");
                        InboundOutcome::Applied { version }
                    }
                    Err(err) => {
                        error!(topic = %topic, error = %err, "inbound message dropped");
                        self.manager.note(|s| s.dropped_messages += 1);
                        InboundOutcome::Dropped
                    }
                }
            }
        }
    }

    fn on_message_error(&self, detail: &str) {
        if !self.manager.is_open() {
            return;
        }
        self.report(DeliveryError::MessageError {
            detail: detail.to_owned(),
        });
    }

    fn report(&self, err: DeliveryError) {
        let topic = self.manager.topic();
        error!(topic = %topic, error = %SyncError::Delivery(err.clone()), "inbound delivery failed");
        self.manager.note(|s| s.delivery_errors += 1);
        if let Some(hook) = &self.on_error {
            hook(topic, &err);
        }
    }
}
