//! # quill-protocol — shared contract for the quill sync service
//!
//! This crate defines the domain models, wire envelopes, and error
//! taxonomy shared by the store and the session channel.
//!
//! It is intentionally dependency-light (no tokio, axum, or sqlx) so it
//! can be used as a pure contract crate by clients and servers alike.
//!
//! ## Module Overview
//!
//! - [`document`] — `Document` plus content hashing / title / size helpers
//! - [`event`] — `ChangeEvent`, the per-user monotonic change log entry
//! - [`user`] — `User` and the deterministic UUIDv5 identity derivation
//! - [`credential`] — `ApiCredential` row and key/secret format constants
//! - [`envelope`] — request / reply / broadcast framing for the channel
//! - [`error`] — `SyncError` with stable wire `reason` strings

pub mod credential;
pub mod document;
pub mod envelope;
pub mod error;
pub mod event;
pub mod user;

pub use credential::{API_KEY_PREFIX, ApiCredential, SECRET_PREFIX};
pub use document::{Document, content_hash, content_size_bytes, extract_title, verify_hash};
pub use envelope::{Broadcast, Reply, ReplyStatus, Request};
pub use error::{SyncError, SyncResult};
pub use event::{ChangeEvent, ChangeEventType};
pub use user::{User, deterministic_user_id};
