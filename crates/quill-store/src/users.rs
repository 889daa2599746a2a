//! User directory: deterministic identity plus presence touch.

use quill_protocol::{SyncResult, User, deterministic_user_id};
use sqlx::Row;
use sqlx::postgres::PgRow;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::{Store, db_error};

impl Store {
    /// Upsert the user whose id is derived from the email. Re-joining
    /// with the same email always lands on the same row, on any node
    /// configured with the same namespace id.
    #[instrument(skip(self))]
    pub async fn get_or_create_user(&self, email: &str) -> SyncResult<User> {
        let id = deterministic_user_id(&self.app_namespace_id, email);
        let row = sqlx::query(
            "INSERT INTO users (id, email) VALUES ($1, $2) \
             ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email \
             RETURNING id, email, last_seen_at, created_at",
        )
        .bind(id)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        user_from_row(&row).map_err(db_error)
    }

    /// Best-effort presence update; failures are logged, not surfaced.
    pub async fn touch_last_seen(&self, user_id: Uuid) {
        let result = sqlx::query("UPDATE users SET last_seen_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await;
        if let Err(error) = result {
            warn!(%error, %user_id, "failed to update last_seen_at");
        }
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        last_seen_at: row.try_get("last_seen_at")?,
        created_at: row.try_get("created_at")?,
    })
}
