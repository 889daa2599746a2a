//! Error taxonomy for the quill sync service.
//!
//! Every variant carries a stable `reason` string that is surfaced
//! verbatim on the wire, so clients can match on it without parsing
//! human-readable messages.

use thiserror::Error;

use crate::document::Document;

/// Errors that can occur across authentication, document operations,
/// and transformation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("missing required join parameters")]
    MissingParams,
    #[error("timestamp is not an integer")]
    InvalidTimestamp,
    #[error("timestamp outside the accepted window")]
    TimestampExpired,
    #[error("unknown or inactive api key")]
    InvalidApiKey,
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("document not found")]
    NotFound,
    #[error("document id already exists")]
    Conflict { existing: Box<Document> },
    #[error("revision mismatch: current revision is {}", current.sync_revision)]
    VersionMismatch { current: Box<Document> },
    #[error("invalid patch: {0}")]
    InvalidPatch(String),
    #[error("insert failed: {0}")]
    InsertFailed(String),
    #[error("update failed: {0}")]
    UpdateFailed(String),
    #[error("delete failed: {0}")]
    DeleteFailed(String),
    #[error("transform failed: {0}")]
    Transform(String),
    #[error("session has not joined a sync topic")]
    NotJoined,
    #[error("topic must take the form sync:<scope>")]
    InvalidTopic,
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("database error: {0}")]
    Database(String),
}

impl SyncError {
    /// Stable machine-readable reason surfaced as the wire `reason` field.
    pub fn reason(&self) -> &'static str {
        match self {
            SyncError::MissingParams => "missing_params",
            SyncError::InvalidTimestamp => "invalid_timestamp",
            SyncError::TimestampExpired => "timestamp_expired",
            SyncError::InvalidApiKey => "invalid_api_key",
            SyncError::InvalidSignature => "invalid_signature",
            SyncError::NotFound => "not_found",
            SyncError::Conflict { .. } => "conflict",
            SyncError::VersionMismatch { .. } => "version_mismatch",
            SyncError::InvalidPatch(_) => "invalid_patch",
            SyncError::InsertFailed(_) => "insert_failed",
            SyncError::UpdateFailed(_) => "update_failed",
            SyncError::DeleteFailed(_) => "delete_failed",
            SyncError::Transform(_) => "transform_failed",
            SyncError::NotJoined => "not_joined",
            SyncError::InvalidTopic => "invalid_topic",
            SyncError::InvalidParams(_) => "invalid_params",
            SyncError::UnknownEvent(_) => "unknown_event",
            SyncError::Database(_) => "database_error",
        }
    }
}

/// Convenience result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_reasons_are_stable() {
        assert_eq!(SyncError::MissingParams.reason(), "missing_params");
        assert_eq!(SyncError::InvalidTimestamp.reason(), "invalid_timestamp");
        assert_eq!(SyncError::TimestampExpired.reason(), "timestamp_expired");
        assert_eq!(SyncError::InvalidApiKey.reason(), "invalid_api_key");
        assert_eq!(SyncError::InvalidSignature.reason(), "invalid_signature");
    }

    #[test]
    fn document_reasons_are_stable() {
        assert_eq!(SyncError::NotFound.reason(), "not_found");
        assert_eq!(
            SyncError::InvalidPatch("bad op".to_owned()).reason(),
            "invalid_patch"
        );
        assert_eq!(
            SyncError::InsertFailed("boom".to_owned()).reason(),
            "insert_failed"
        );
    }
}
