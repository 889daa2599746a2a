//! Wire framing for the session channel.
//!
//! Messages are JSON request/reply envelopes. Each request carries a
//! unique client `ref` echoed by the reply; broadcasts carry an event
//! name and payload with no ref. All keys on the wire are strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An inbound client request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "ref")]
    pub reference: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// Status discriminant of a reply envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// A direct reply to a single request, echoing its `ref`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    #[serde(rename = "ref")]
    pub reference: String,
    pub status: ReplyStatus,
    pub payload: Value,
}

impl Reply {
    pub fn ok(reference: impl Into<String>, payload: Value) -> Self {
        Self {
            reference: reference.into(),
            status: ReplyStatus::Ok,
            payload,
        }
    }

    pub fn error(reference: impl Into<String>, payload: Value) -> Self {
        Self {
            reference: reference.into(),
            status: ReplyStatus::Error,
            payload,
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

/// A fan-out message delivered to every other session on a topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Broadcast {
    pub event: String,
    pub payload: Value,
}

impl Broadcast {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_owned())
    }
}
