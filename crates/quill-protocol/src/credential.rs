//! API credential rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of every API key (`rpa_` + 64 lowercase hex).
pub const API_KEY_PREFIX: &str = "rpa_";
/// Prefix of every API secret (`rps_` + 64 lowercase hex).
pub const SECRET_PREFIX: &str = "rps_";

/// A persisted API key/secret pair used to sign channel joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCredential {
    pub id: Uuid,
    pub api_key: String,
    pub secret: String,
    pub name: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
