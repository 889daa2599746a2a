//! Change-log append and per-user monotonic reads.

use chrono::{DateTime, Utc};
use quill_protocol::{ChangeEvent, ChangeEventType, SyncResult};
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{Store, db_error};

pub const CHANGES_DEFAULT_LIMIT: i64 = 100;
pub const CHANGES_MAX_LIMIT: i64 = 1000;

pub(crate) struct ChangeEventParams<'a> {
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub event_type: ChangeEventType,
    pub forward_patch: Option<&'a Value>,
    pub reverse_patch: Option<&'a Value>,
    pub server_timestamp: DateTime<Utc>,
}

impl Store {
    /// Append one event inside the caller's transaction; the sequence
    /// is assigned by the database at insert.
    pub(crate) async fn append_change_event(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        params: ChangeEventParams<'_>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO change_events (document_id, user_id, event_type, forward_patch, \
             reverse_patch, applied, server_timestamp) \
             VALUES ($1, $2, $3, $4, $5, TRUE, $6)",
        )
        .bind(params.document_id)
        .bind(params.user_id)
        .bind(params.event_type.to_string())
        .bind(params.forward_patch)
        .bind(params.reverse_patch)
        .bind(params.server_timestamp)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Events after `last_sequence` for one user, ascending, capped at
    /// 1000 per page.
    #[instrument(skip(self), fields(%user_id, last_sequence))]
    pub async fn changes_since(
        &self,
        user_id: Uuid,
        last_sequence: i64,
        limit: Option<i64>,
    ) -> SyncResult<Vec<ChangeEvent>> {
        let limit = limit.unwrap_or(CHANGES_DEFAULT_LIMIT).clamp(1, CHANGES_MAX_LIMIT);
        let rows = sqlx::query(
            "SELECT sequence, document_id, user_id, event_type, forward_patch, reverse_patch, \
             applied, server_timestamp, created_at \
             FROM change_events WHERE user_id = $1 AND sequence > $2 \
             ORDER BY sequence ASC LIMIT $3",
        )
        .bind(user_id)
        .bind(last_sequence)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            match event_from_row(row).map_err(db_error)? {
                Some(event) => events.push(event),
                None => warn!("skipping change event with unknown type"),
            }
        }
        Ok(events)
    }

    /// Highest sequence for a user, 0 when the log is empty.
    pub async fn latest_sequence(&self, user_id: Uuid) -> SyncResult<i64> {
        sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence), 0) FROM change_events WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }
}

fn event_from_row(row: &PgRow) -> Result<Option<ChangeEvent>, sqlx::Error> {
    let event_type: String = row.try_get("event_type")?;
    let Ok(event_type) = event_type.parse::<ChangeEventType>() else {
        return Ok(None);
    };
    Ok(Some(ChangeEvent {
        sequence: row.try_get("sequence")?,
        document_id: row.try_get("document_id")?,
        user_id: row.try_get("user_id")?,
        event_type,
        forward_patch: row.try_get("forward_patch")?,
        reverse_patch: row.try_get("reverse_patch")?,
        applied: row.try_get("applied")?,
        server_timestamp: row.try_get("server_timestamp")?,
        created_at: row.try_get("created_at")?,
    }))
}
