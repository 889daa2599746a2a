//! Transactional document store.
//!
//! Every mutation writes the document row and appends a change event
//! inside one transaction. Updates are guarded by optimistic
//! concurrency only: the read is a plain snapshot read (no row lock),
//! the caller's `expected_revision` is compared against the stored
//! `sync_revision`, and the UPDATE re-asserts the revision in its
//! WHERE clause. A racing writer makes that compare-and-set match
//! zero rows, which is surfaced as a version mismatch.

use chrono::Utc;
use quill_patch::{apply_patch, inverse_patch, normalize_patch};
use quill_protocol::{
    ChangeEventType, Document, SyncError, SyncResult, content_hash, content_size_bytes,
    extract_title,
};
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::instrument;
use uuid::Uuid;

use crate::changes::ChangeEventParams;
use crate::{Store, db_error, is_unique_violation};

const SELECT_LIVE: &str = "SELECT id, user_id, content, sync_revision, content_hash, \
     title, size_bytes, deleted_at, created_at, updated_at \
     FROM documents WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL";

impl Store {
    /// Insert a client-chosen document id with revision 1 and log the
    /// `create` event. A duplicate id reports `conflict` carrying the
    /// existing row.
    #[instrument(skip(self, content), fields(%document_id, %user_id))]
    pub async fn create_document(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        content: Value,
    ) -> SyncResult<Document> {
        let now = Utc::now();
        let document = Document {
            id: document_id,
            user_id,
            content_hash: content_hash(&content),
            title: extract_title(&content),
            size_bytes: Some(content_size_bytes(&content)),
            content,
            sync_revision: 1,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let inserted = sqlx::query(
            "INSERT INTO documents (id, user_id, content, sync_revision, content_hash, \
             title, size_bytes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(document.id)
        .bind(document.user_id)
        .bind(&document.content)
        .bind(document.sync_revision)
        .bind(document.content_hash.as_deref())
        .bind(document.title.as_deref())
        .bind(document.size_bytes)
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            if is_unique_violation(&error) {
                drop(tx);
                let existing = self.get_document(document.id).await?.ok_or_else(|| {
                    SyncError::InsertFailed("conflicting document disappeared".to_owned())
                })?;
                return Err(SyncError::Conflict {
                    existing: Box::new(existing),
                });
            }
            return Err(SyncError::InsertFailed(error.to_string()));
        }

        self.append_change_event(
            &mut tx,
            ChangeEventParams {
                document_id: document.id,
                user_id,
                event_type: ChangeEventType::Create,
                forward_patch: Some(&document.content),
                reverse_patch: None,
                server_timestamp: now,
            },
        )
        .await
        .map_err(|error| SyncError::InsertFailed(error.to_string()))?;

        tx.commit()
            .await
            .map_err(|error| SyncError::InsertFailed(error.to_string()))?;

        Ok(document)
    }

    /// Apply an RFC 6902 patch under optimistic concurrency, bump the
    /// revision, and log the `update` event with forward and reverse
    /// patches.
    #[instrument(skip(self, patch), fields(%document_id, %user_id, expected_revision))]
    pub async fn update_document(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        patch: &Value,
        expected_revision: i32,
    ) -> SyncResult<Document> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let row = sqlx::query(SELECT_LIVE)
            .bind(document_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
        let Some(row) = row else {
            return Err(SyncError::NotFound);
        };
        let current = document_from_row(&row).map_err(db_error)?;

        if current.sync_revision != expected_revision {
            return Err(SyncError::VersionMismatch {
                current: Box::new(current),
            });
        }

        let normalized =
            normalize_patch(patch).map_err(|error| SyncError::InvalidPatch(error.to_string()))?;
        let new_content = apply_patch(&current.content, &normalized)
            .map_err(|error| SyncError::InvalidPatch(error.to_string()))?;
        let reverse = serde_json::to_value(inverse_patch(&current.content, &new_content))
            .map_err(|error| SyncError::UpdateFailed(error.to_string()))?;

        let now = Utc::now();
        let new_hash = content_hash(&new_content);
        let new_title = extract_title(&new_content);
        let new_size = content_size_bytes(&new_content);

        let updated = sqlx::query(
            "UPDATE documents SET content = $3, content_hash = $4, title = $5, \
             size_bytes = $6, sync_revision = sync_revision + 1, updated_at = $7 \
             WHERE id = $1 AND user_id = $2 AND sync_revision = $8",
        )
        .bind(document_id)
        .bind(user_id)
        .bind(&new_content)
        .bind(new_hash.as_deref())
        .bind(new_title.as_deref())
        .bind(new_size)
        .bind(now)
        .bind(expected_revision)
        .execute(&mut *tx)
        .await
        .map_err(|error| SyncError::UpdateFailed(error.to_string()))?;

        if updated.rows_affected() == 0 {
            // A concurrent writer committed between the snapshot read
            // and the guarded update; report the row it left behind.
            let row = sqlx::query(SELECT_LIVE)
                .bind(document_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;
            return match row {
                Some(row) => Err(SyncError::VersionMismatch {
                    current: Box::new(document_from_row(&row).map_err(db_error)?),
                }),
                None => Err(SyncError::NotFound),
            };
        }

        self.append_change_event(
            &mut tx,
            ChangeEventParams {
                document_id,
                user_id,
                event_type: ChangeEventType::Update,
                forward_patch: Some(patch),
                reverse_patch: Some(&reverse),
                server_timestamp: now,
            },
        )
        .await
        .map_err(|error| SyncError::UpdateFailed(error.to_string()))?;

        tx.commit()
            .await
            .map_err(|error| SyncError::UpdateFailed(error.to_string()))?;

        Ok(Document {
            id: current.id,
            user_id: current.user_id,
            content: new_content,
            sync_revision: current.sync_revision + 1,
            content_hash: new_hash,
            title: new_title,
            size_bytes: Some(new_size),
            deleted_at: None,
            created_at: current.created_at,
            updated_at: now,
        })
    }

    /// Tombstone a document. The revision is left untouched; the
    /// `delete` event records the prior content as its reverse patch.
    #[instrument(skip(self), fields(%document_id, %user_id))]
    pub async fn delete_document(&self, user_id: Uuid, document_id: Uuid) -> SyncResult<Document> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let row = sqlx::query(SELECT_LIVE)
            .bind(document_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
        let Some(row) = row else {
            return Err(SyncError::NotFound);
        };
        let current = document_from_row(&row).map_err(db_error)?;

        let now = Utc::now();
        let tombstoned = sqlx::query(
            "UPDATE documents SET deleted_at = $3, updated_at = $3 \
             WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(document_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|error| SyncError::DeleteFailed(error.to_string()))?;

        if tombstoned.rows_affected() == 0 {
            // A concurrent delete won the race; the document is gone.
            return Err(SyncError::NotFound);
        }

        self.append_change_event(
            &mut tx,
            ChangeEventParams {
                document_id,
                user_id,
                event_type: ChangeEventType::Delete,
                forward_patch: None,
                reverse_patch: Some(&current.content),
                server_timestamp: now,
            },
        )
        .await
        .map_err(|error| SyncError::DeleteFailed(error.to_string()))?;

        tx.commit()
            .await
            .map_err(|error| SyncError::DeleteFailed(error.to_string()))?;

        Ok(Document {
            deleted_at: Some(now),
            updated_at: now,
            ..current
        })
    }

    /// Fetch by id alone (tombstoned rows included); used for conflict
    /// replies.
    pub async fn get_document(&self, document_id: Uuid) -> SyncResult<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, user_id, content, sync_revision, content_hash, title, size_bytes, \
             deleted_at, created_at, updated_at FROM documents WHERE id = $1",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|row| document_from_row(&row).map_err(db_error))
            .transpose()
    }

    /// All live documents for a user, most recently updated first.
    #[instrument(skip(self), fields(%user_id))]
    pub async fn list_documents(&self, user_id: Uuid) -> SyncResult<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, user_id, content, sync_revision, content_hash, title, size_bytes, \
             deleted_at, created_at, updated_at \
             FROM documents WHERE user_id = $1 AND deleted_at IS NULL \
             ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter()
            .map(|row| document_from_row(row).map_err(db_error))
            .collect()
    }
}

fn document_from_row(row: &PgRow) -> Result<Document, sqlx::Error> {
    Ok(Document {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        content: row.try_get("content")?,
        sync_revision: row.try_get("sync_revision")?,
        content_hash: row.try_get("content_hash")?,
        title: row.try_get("title")?,
        size_bytes: row.try_get("size_bytes")?,
        deleted_at: row.try_get("deleted_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
