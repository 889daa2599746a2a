//! User identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user, created lazily on first authenticated join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Deterministic user id: `UUIDv5(UUIDv5(DNS, app_namespace_id), email)`.
///
/// Identical emails on independent nodes yield identical ids, so the
/// server and its clients must agree on `app_namespace_id`.
pub fn deterministic_user_id(app_namespace_id: &str, email: &str) -> Uuid {
    let app_namespace = Uuid::new_v5(&Uuid::NAMESPACE_DNS, app_namespace_id.as_bytes());
    Uuid::new_v5(&app_namespace, email.as_bytes())
}
