#![forbid(unsafe_code)]

//! Error taxonomy for synchronized bindings.
//!
//! Only [`BindError`] ever reaches a caller, and only from [`bind`](crate::bind).
//! Everything else is handled where it happens: logged, counted in
//! [`ChannelStats`](crate::ChannelStats), and (for delivery failures)
//! forwarded to the user's `on_error` hook.

use std::fmt;

/// Reasons a topic string is rejected at bind time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// The topic is the empty string.
    Empty,
    /// The topic exceeds the maximum encoded length.
    TooLong { len: usize, max: usize },
    /// The topic contains a control character at the given byte offset.
    ControlCharacter { offset: usize },
    /// The topic starts or ends with whitespace.
    SurroundingWhitespace,
}

impl fmt::Display for TopicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "topic must not be empty"),
            Self::TooLong { len, max } => {
                write!(f, "topic is {len} bytes long, maximum is {max}")
            }
            Self::ControlCharacter { offset } => {
                write!(f, "topic contains a control character at byte {offset}")
            }
            Self::SurroundingWhitespace => {
                write!(f, "topic must not start or end with whitespace")
            }
        }
    }
}

impl std::error::Error for TopicError {}

/// Errors returned from [`bind`](crate::bind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The topic key did not pass validation.
    InvalidTopic(TopicError),
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTopic(err) => write!(f, "invalid topic: {err}"),
        }
    }
}

impl std::error::Error for BindError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidTopic(err) => Some(err),
        }
    }
}

impl From<TopicError> for BindError {
    fn from(err: TopicError) -> Self {
        Self::InvalidTopic(err)
    }
}

/// Classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// A channel could not be constructed.
    OpenFailed,
    /// The channel was already closed when used.
    Closed,
    /// The send call itself failed.
    SendFailed,
}

impl TransportErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenFailed => "open_failed",
            Self::Closed => "closed",
            Self::SendFailed => "send_failed",
        }
    }
}

/// A failure reported by a [`Transport`](crate::Transport) or
/// [`Channel`](crate::Channel).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn open_failed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::OpenFailed, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Closed, message)
    }

    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::SendFailed, message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for TransportError {}

/// An inbound message that could not be delivered to the value cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The transport raised a `messageerror` event.
    MessageError { detail: String },
    /// The message arrived but is not a valid envelope for this value type.
    Decode { detail: String },
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageError { detail } => write!(f, "message error event: {detail}"),
            Self::Decode { detail } => write!(f, "undecodable message: {detail}"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// Everything that can go wrong after a binding has been constructed.
///
/// None of these are returned to writers; they are the vocabulary used in
/// logs and internal results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No transport could be constructed; the binding runs local-only.
    InitializationFailure(TransportError),
    /// A send or probe failed; the channel gets reopened.
    TransportBroken(TransportError),
    /// An inbound message could not be delivered.
    Delivery(DeliveryError),
    /// An inbound payload arrived before the cell's trigger was wired.
    RaceCondition { topic: String },
    /// An outbound value could not be serialized.
    Encode(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailure(err) => write!(f, "initialization failure: {err}"),
            Self::TransportBroken(err) => write!(f, "transport broken: {err}"),
            Self::Delivery(err) => write!(f, "delivery error: {err}"),
            Self::RaceCondition { topic } => write!(
                f,
                "message on topic {topic:?} arrived before the reactive trigger was registered"
            ),
            Self::Encode(msg) => write!(f, "could not encode value: {msg}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InitializationFailure(err) | Self::TransportBroken(err) => Some(err),
            Self::Delivery(err) => Some(err),
            Self::RaceCondition { .. } | Self::Encode(_) => None,
        }
    }
}
