//! Document model and content derivation helpers.
//!
//! A document's `content_hash` is the lowercase-hex SHA-256 of the
//! canonical JSON encoding of its content. serde_json serializes object
//! keys in sorted order (its map is a BTreeMap), so two semantically
//! equal objects always hash identically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A synchronized JSON document owned by a single user.
///
/// `sync_revision` starts at 1 and increments on every committed
/// content update; soft deletion tombstones the row via `deleted_at`
/// without touching the revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: Value,
    pub sync_revision: i32,
    pub content_hash: Option<String>,
    pub title: Option<String>,
    pub size_bytes: Option<i32>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Lowercase-hex SHA-256 of the canonical JSON encoding of `content`.
///
/// Returns `None` when the content is not a JSON object; the expected
/// case is always an object but the function is total.
pub fn content_hash(content: &Value) -> Option<String> {
    if !content.is_object() {
        return None;
    }
    let encoded = serde_json::to_vec(content).ok()?;
    let digest = Sha256::digest(&encoded);
    Some(hex::encode(digest))
}

/// Check a content value against a previously computed hash.
pub fn verify_hash(content: &Value, hash: &str) -> bool {
    content_hash(content).is_some_and(|computed| computed == hash)
}

/// Best-effort title extraction from `content.title`.
pub fn extract_title(content: &Value) -> Option<String> {
    content
        .get("title")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Byte length of the JSON encoding of `content`.
pub fn content_size_bytes(content: &Value) -> i32 {
    serde_json::to_vec(content)
        .map(|encoded| encoded.len() as i32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn hash_is_deterministic_for_equal_objects() {
        let a = json!({"title": "T", "body": "hello"});
        let b = json!({"body": "hello", "title": "T"});
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        let content = json!({"title": "T"});
        let hash = content_hash(&content).expect("object content hashes");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn hash_is_none_for_non_objects() {
        assert_eq!(content_hash(&json!([1, 2, 3])), None);
        assert_eq!(content_hash(&json!("text")), None);
        assert_eq!(content_hash(&Value::Null), None);
    }

    #[test]
    fn verify_hash_round_trips() {
        let content = json!({"title": "T", "nested": {"z": 1, "a": 2}});
        let hash = content_hash(&content).expect("hash");
        assert!(verify_hash(&content, &hash));
        assert!(!verify_hash(&json!({"title": "other"}), &hash));
    }

    #[test]
    fn title_extraction_is_best_effort() {
        assert_eq!(
            extract_title(&json!({"title": "Notes"})),
            Some("Notes".to_owned())
        );
        assert_eq!(extract_title(&json!({"title": 7})), None);
        assert_eq!(extract_title(&json!({})), None);
    }

    #[test]
    fn size_counts_encoded_bytes() {
        assert_eq!(content_size_bytes(&json!({})), 2);
        assert_eq!(content_size_bytes(&json!({"a": 1})), 7);
    }
}
