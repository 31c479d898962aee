#![forbid(unsafe_code)]

//! Wire envelope.
//!
//! Every frame is a JSON object tagged by `kind`:
//!
//! ```text
//! {"kind":"payload","topic":"cart","value":[1,2,3]}
//! {"kind":"probe","topic":"cart"}
//! ```
//!
//! Probes carry no data; receivers count and discard them.
//!
//! Decoding reads the header first and keeps `value` as raw JSON, so the
//! value is deserialized straight from its own text. Types that need the
//! original number tokens (`u128`, `i128`) survive the trip.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Outbound<'a, T> {
    Payload { topic: &'a str, value: &'a T },
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum FrameKind {
    Payload,
    Probe,
}

#[derive(Deserialize)]
struct FrameHeader {
    kind: FrameKind,
    topic: String,
    #[serde(default)]
    value: Option<Box<RawValue>>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<T> {
    Payload { topic: String, value: T },
    Probe { topic: String },
}

impl<T> Inbound<T> {
    #[must_use]
    pub fn topic(&self) -> &str {
        match self {
            Self::Payload { topic, .. } | Self::Probe { topic } => topic,
        }
    }
}

/// Encode a value frame.
pub fn encode_payload<T: Serialize>(topic: &str, value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Outbound::Payload { topic, value })
}

/// Encode a probe frame.
#[must_use]
pub fn encode_probe(topic: &str) -> String {
    serde_json::json!({ "kind": "probe", "topic": topic }).to_string()
}

/// Decode any frame.
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<Inbound<T>, serde_json::Error> {
    let header: FrameHeader = serde_json::from_str(frame)?;
    match header.kind {
        FrameKind::Probe => Ok(Inbound::Probe {
            topic: header.topic,
        }),
        FrameKind::Payload => {
            // `null` and a missing `value` both arrive as `None`.
            let value = match header.value {
                Some(raw) => serde_json::from_str(raw.get())?,
                None => serde_json::from_str("null")?,
            };
            Ok(Inbound::Payload {
                topic: header.topic,
                value,
            })
        }
    }
}
