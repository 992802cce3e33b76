use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single progress event pushed to a session's queue.
///
/// `payload` stays a loosely-typed `serde_json::Value` rather than a closed
/// enum: the event catalog is open-ended and each agent shapes its own
/// payload. Typing the *event type name* is what the SSE Gateway's
/// terminal-set check needs; typing every payload shape buys nothing a
/// reviewer of the wire format would want, since the payload is serialized
/// straight to the client anyway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Event {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Event {
            event_type: event_type.into(),
            payload,
            timestamp: chrono::Utc::now(),
        }
    }
}
