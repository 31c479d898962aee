#![forbid(unsafe_code)]

//! Transport seam.
//!
//! A [`Transport`] constructs [`Channel`]s by topic name; a channel carries
//! text frames to every *other* channel open on the same name and reports
//! inbound frames through two listener kinds. This is the shape of the
//! browser's `BroadcastChannel`, which `tabsync-web` implements. The
//! in-process [`memory::MemoryHub`] implements the same contract for tests
//! and non-browser hosts.
//!
//! Which transport a binding uses is decided once, up front, through
//! [`Capability`].

pub mod memory;

use crate::error::TransportError;
use std::fmt;
use std::rc::Rc;

/// Inbound event classes a channel reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// A frame was received.
    Message,
    /// A frame arrived but could not be delivered.
    MessageError,
}

impl ListenerKind {
    /// DOM event name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::MessageError => "messageerror",
        }
    }
}

/// Identifies a registered listener on one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Inbound handler. Receives the frame text, or a description of the failure
/// for [`ListenerKind::MessageError`].
pub type Listener = Rc<dyn Fn(&str)>;

/// An open channel bound to one topic.
pub trait Channel {
    /// Post a frame to every other channel on the same topic.
    fn send(&self, frame: &str) -> Result<(), TransportError>;

    fn add_listener(&self, kind: ListenerKind, listener: Listener) -> ListenerId;

    fn remove_listener(&self, kind: ListenerKind, id: ListenerId);

    /// Close the channel. Further sends fail; nothing more is delivered.
    fn close(&self);
}

/// Constructs channels by topic name.
pub trait Transport {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    fn open(&self, topic: &str) -> Result<Rc<dyn Channel>, TransportError>;
}

/// What cross-context capability the environment offers.
#[derive(Clone)]
pub enum Capability {
    /// A working transport.
    Transport(Rc<dyn Transport>),
    /// No transport; bindings stay local to this context.
    LocalOnly { reason: String },
}

impl Capability {
    pub fn transport(transport: impl Transport + 'static) -> Self {
        Self::Transport(Rc::new(transport))
    }

    pub fn local_only(reason: impl Into<String>) -> Self {
        Self::LocalOnly {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_local_only(&self) -> bool {
        matches!(self, Self::LocalOnly { .. })
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(t) => f.debug_tuple("Transport").field(&t.name()).finish(),
            Self::LocalOnly { reason } => f
                .debug_struct("LocalOnly")
                .field("reason", reason)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_dom_events() {
        assert_eq!(ListenerKind::Message.as_str(), "message");
        assert_eq!(ListenerKind::MessageError.as_str(), "messageerror");
    }

    #[test]
    fn capability_debug() {
        let local = Capability::local_only("no BroadcastChannel");
        assert!(local.is_local_only());
        assert!(format!("{local:?}").contains("no BroadcastChannel"));

        let hub = memory::MemoryHub::new();
        let cap = Capability::transport(hub);
        assert!(!cap.is_local_only());
        assert_eq!(format!("{cap:?}"), "Transport(\"memory\")");
    }
}
