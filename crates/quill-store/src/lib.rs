//! # quill-store — shared persistence for the quill sync service
//!
//! A [`Store`] wraps a PostgreSQL pool and exposes the credential
//! store, user directory, transactional document store, and change-log
//! reader. Every document mutation writes the document row *and*
//! appends a change event inside one transaction; either both commit
//! or neither.

use std::time::Duration;

use quill_protocol::{SyncError, SyncResult};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, instrument};

mod auth;
mod changes;
mod documents;
mod users;

pub use auth::{
    GeneratedCredentials, TIMESTAMP_WINDOW_SECS, create_signature, generate_credentials,
    verify_signature,
};
pub use changes::{CHANGES_DEFAULT_LIMIT, CHANGES_MAX_LIMIT};

/// Shared handle to the relational backend. Cloning is cheap; the pool
/// is reference-counted.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
    app_namespace_id: String,
}

impl Store {
    /// Connect with production pool defaults.
    pub async fn connect(
        database_url: &str,
        app_namespace_id: impl Into<String>,
    ) -> SyncResult<Self> {
        Self::connect_with_options(database_url, app_namespace_id, 10).await
    }

    /// Connect with an explicit pool size (tests use small pools so
    /// parallel suites do not exhaust PostgreSQL connections).
    #[instrument(skip(database_url, app_namespace_id))]
    pub async fn connect_with_options(
        database_url: &str,
        app_namespace_id: impl Into<String>,
        max_connections: u32,
    ) -> SyncResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .max_lifetime(Duration::from_secs(1800))
            .idle_timeout(Duration::from_secs(60))
            .connect(database_url)
            .await
            .map_err(db_error)?;

        Ok(Self {
            pool,
            app_namespace_id: app_namespace_id.into(),
        })
    }

    /// Apply the embedded baseline migrations.
    pub async fn run_migrations(&self) -> SyncResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|error| SyncError::Database(error.to_string()))?;
        info!("migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The UUIDv5 namespace seed shared with clients.
    pub fn app_namespace_id(&self) -> &str {
        &self.app_namespace_id
    }
}

pub(crate) fn db_error(error: sqlx::Error) -> SyncError {
    SyncError::Database(error.to_string())
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}
