//! Change-log entries.
//!
//! Exactly one event is appended per successful document mutation, in
//! the same transaction as the document write. `sequence` is a global
//! bigserial; per user it is strictly increasing along insertion order
//! and drives incremental recovery.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Kind of mutation a change event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeEventType {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ChangeEventType::Create => "create",
            ChangeEventType::Update => "update",
            ChangeEventType::Delete => "delete",
        };
        write!(f, "{text}")
    }
}

impl FromStr for ChangeEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeEventType::Create),
            "update" => Ok(ChangeEventType::Update),
            "delete" => Ok(ChangeEventType::Delete),
            other => Err(format!("unknown change event type: {other}")),
        }
    }
}

/// One entry in the per-user change log.
///
/// `forward_patch` for `create` is the full content and `reverse_patch`
/// is absent; `update` carries both; `delete` records the prior content
/// as `reverse_patch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub sequence: i64,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub event_type: ChangeEventType,
    pub forward_patch: Option<Value>,
    pub reverse_patch: Option<Value>,
    pub applied: bool,
    pub server_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
