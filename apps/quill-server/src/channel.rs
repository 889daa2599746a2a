//! The session channel: one task per WebSocket connection.
//!
//! A fresh socket is unauthenticated; the client must `join` a
//! `sync:<scope>` topic with HMAC parameters before any data message
//! is dispatched. Replies go only to the requester; write operations
//! additionally fan out a broadcast to the other sessions on the
//! topic via an unbounded per-session queue, so fan-out never holds
//! up write latency.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use quill_patch::{EditOp, transform_lists};
use quill_protocol::{Broadcast, Reply, Request, SyncError, SyncResult};
use serde_json::{Value, json};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::AppState;

struct Session {
    id: u64,
    joined: Option<JoinedTopic>,
}

struct JoinedTopic {
    topic: String,
    user_id: Uuid,
    email: String,
}

pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let session_id = state.next_session_id();
    let (sink, mut stream) = socket.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(forward_outbound(out_rx, sink));

    let mut session = Session {
        id: session_id,
        joined: None,
    };
    info!(session_id, "session connected");

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let Some(reply) = handle_text(&state, &mut session, &out_tx, &text).await else {
                    continue;
                };
                if out_tx.send(Message::Text(reply.to_text().into())).is_err() {
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                if out_tx.send(Message::Pong(payload)).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(error) => {
                debug!(session_id, %error, "socket error");
                break;
            }
        }
    }

    if let Some(joined) = &session.joined {
        state.registry.unsubscribe(&joined.topic, session.id);
    }
    drop(out_tx);
    let _ = writer.await;
    info!(session_id, "session disconnected");
}

async fn forward_outbound(
    mut out_rx: UnboundedReceiver<Message>,
    mut sink: SplitSink<WebSocket, Message>,
) {
    while let Some(message) = out_rx.recv().await {
        if sink.send(message).await.is_err() {
            break;
        }
    }
}

async fn handle_text(
    state: &AppState,
    session: &mut Session,
    out_tx: &UnboundedSender<Message>,
    text: &str,
) -> Option<Reply> {
    let request: Request = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(error) => {
            debug!(session_id = session.id, %error, "discarding unparseable frame");
            return None;
        }
    };

    let reference = request.reference.clone();
    let reply = match dispatch(state, session, out_tx, request).await {
        Ok(payload) => Reply::ok(reference, payload),
        Err(error) => Reply::error(reference, error_payload(&error)),
    };
    Some(reply)
}

async fn dispatch(
    state: &AppState,
    session: &mut Session,
    out_tx: &UnboundedSender<Message>,
    request: Request,
) -> SyncResult<Value> {
    match request.event.as_str() {
        "join" => join(state, session, out_tx, request).await,
        "create_document" => create_document(state, session, &request.payload).await,
        "update_document" => update_document(state, session, &request.payload).await,
        "delete_document" => delete_document(state, session, &request.payload).await,
        "request_full_sync" => request_full_sync(state, session).await,
        "get_changes_since" => get_changes_since(state, session, &request.payload).await,
        "transform_operations" => {
            joined(session)?;
            transform_operations(&request.payload)
        }
        other => Err(SyncError::UnknownEvent(other.to_owned())),
    }
}

#[instrument(skip_all, fields(session_id = session.id))]
async fn join(
    state: &AppState,
    session: &mut Session,
    out_tx: &UnboundedSender<Message>,
    request: Request,
) -> SyncResult<Value> {
    let topic = request.topic.ok_or(SyncError::InvalidTopic)?;
    if !topic.starts_with("sync:") {
        return Err(SyncError::InvalidTopic);
    }

    let payload = &request.payload;
    let email = required_str(payload, "email")?;
    let api_key = required_str(payload, "api_key")?;
    let signature = required_str(payload, "signature")?;
    let timestamp = parse_timestamp(payload.get("timestamp").ok_or(SyncError::MissingParams)?)?;

    state
        .store
        .verify_hmac(api_key, signature, timestamp, email, "")
        .await?;

    let user = state.store.get_or_create_user(email).await?;
    state.store.touch_last_seen(user.id).await;

    state.registry.subscribe(&topic, session.id, out_tx.clone());
    info!(user_id = %user.id, %topic, "session joined");
    session.joined = Some(JoinedTopic {
        topic,
        user_id: user.id,
        email: email.to_owned(),
    });

    Ok(json!({ "user_id": user.id }))
}

async fn create_document(
    state: &AppState,
    session: &Session,
    payload: &Value,
) -> SyncResult<Value> {
    let joined = joined(session)?;
    let document_id = required_uuid(payload, "id")?;
    let content = payload
        .get("content")
        .cloned()
        .ok_or_else(|| SyncError::InvalidParams("content is required".to_owned()))?;

    let document = state
        .store
        .create_document(joined.user_id, document_id, content)
        .await?;

    let delivered = state.registry.publish(
        &joined.topic,
        session.id,
        &Broadcast::new(
            "document_created",
            json!({
                "document_id": document.id,
                "content": document.content,
                "sync_revision": document.sync_revision,
                "content_hash": document.content_hash,
            }),
        ),
    );
    debug!(document_id = %document.id, delivered, "document created");

    Ok(json!({
        "document_id": document.id,
        "sync_revision": document.sync_revision,
        "content_hash": document.content_hash,
    }))
}

async fn update_document(
    state: &AppState,
    session: &Session,
    payload: &Value,
) -> SyncResult<Value> {
    let joined = joined(session)?;
    let document_id = required_uuid(payload, "document_id")?;
    let patch = payload
        .get("patch")
        .cloned()
        .ok_or_else(|| SyncError::InvalidParams("patch is required".to_owned()))?;
    let expected_revision = payload
        .get("expected_revision")
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            SyncError::InvalidParams("expected_revision must be an integer".to_owned())
        })? as i32;

    let document = state
        .store
        .update_document(joined.user_id, document_id, &patch, expected_revision)
        .await?;

    let delivered = state.registry.publish(
        &joined.topic,
        session.id,
        &Broadcast::new(
            "document_updated",
            json!({
                "document_id": document.id,
                "patch": patch,
                "sync_revision": document.sync_revision,
                "content_hash": document.content_hash,
            }),
        ),
    );
    debug!(document_id = %document.id, delivered, "document updated");

    Ok(json!({ "sync_revision": document.sync_revision }))
}

async fn delete_document(
    state: &AppState,
    session: &Session,
    payload: &Value,
) -> SyncResult<Value> {
    let joined = joined(session)?;
    let document_id = required_uuid(payload, "document_id")?;

    let document = state
        .store
        .delete_document(joined.user_id, document_id)
        .await?;

    let delivered = state.registry.publish(
        &joined.topic,
        session.id,
        &Broadcast::new("document_deleted", json!({ "document_id": document.id })),
    );
    debug!(document_id = %document.id, delivered, "document deleted");

    Ok(json!({}))
}

async fn request_full_sync(state: &AppState, session: &Session) -> SyncResult<Value> {
    let joined = joined(session)?;
    let documents = state.store.list_documents(joined.user_id).await?;
    let latest_sequence = state.store.latest_sequence(joined.user_id).await?;
    debug!(email = %joined.email, count = documents.len(), "full sync");
    Ok(json!({
        "documents": documents,
        "latest_sequence": latest_sequence,
    }))
}

async fn get_changes_since(
    state: &AppState,
    session: &Session,
    payload: &Value,
) -> SyncResult<Value> {
    let joined = joined(session)?;
    let last_sequence = match payload.get("last_sequence") {
        None | Some(Value::Null) => 0,
        Some(value) => value.as_i64().ok_or_else(|| {
            SyncError::InvalidParams("last_sequence must be an integer".to_owned())
        })?,
    };

    let events = state
        .store
        .changes_since(joined.user_id, last_sequence, None)
        .await?;
    let latest_sequence = state.store.latest_sequence(joined.user_id).await?;
    Ok(json!({
        "events": events,
        "latest_sequence": latest_sequence,
    }))
}

fn transform_operations(payload: &Value) -> SyncResult<Value> {
    let local_ops = ops_param(payload, "local_ops")?;
    let remote_ops = ops_param(payload, "remote_ops")?;

    let (transformed_local, transformed_remote) = transform_lists(&local_ops, &remote_ops)
        .map_err(|error| SyncError::Transform(error.to_string()))?;

    Ok(json!({
        "transformed_local": transformed_local,
        "transformed_remote": transformed_remote,
    }))
}

fn ops_param(payload: &Value, key: &str) -> SyncResult<Vec<EditOp>> {
    let raw = payload.get(key).cloned().unwrap_or(Value::Array(Vec::new()));
    serde_json::from_value(raw)
        .map_err(|error| SyncError::InvalidParams(format!("{key}: {error}")))
}

fn joined(session: &Session) -> SyncResult<&JoinedTopic> {
    session.joined.as_ref().ok_or(SyncError::NotJoined)
}

fn required_str<'a>(payload: &'a Value, key: &str) -> SyncResult<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or(SyncError::MissingParams)
}

fn required_uuid(payload: &Value, key: &str) -> SyncResult<Uuid> {
    let raw = payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::InvalidParams(format!("{key} is required")))?;
    Uuid::parse_str(raw)
        .map_err(|error| SyncError::InvalidParams(format!("{key} is not a uuid: {error}")))
}

fn parse_timestamp(value: &Value) -> SyncResult<i64> {
    match value {
        Value::Number(number) => number.as_i64().ok_or(SyncError::InvalidTimestamp),
        Value::String(text) => text.parse().map_err(|_| SyncError::InvalidTimestamp),
        _ => Err(SyncError::InvalidTimestamp),
    }
}

fn error_payload(error: &SyncError) -> Value {
    match error {
        SyncError::Conflict { existing } => json!({
            "reason": error.reason(),
            "existing_id": existing.id,
            "sync_revision": existing.sync_revision,
        }),
        SyncError::VersionMismatch { current } => json!({
            "reason": error.reason(),
            "current_revision": current.sync_revision,
            "current_content": current.content,
            "current_hash": current.content_hash,
        }),
        other => json!({
            "reason": other.reason(),
            "message": other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use quill_protocol::Document;

    use super::*;

    fn sample_document(revision: i32) -> Document {
        let content = json!({"title": "T2"});
        Document {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            content_hash: quill_protocol::content_hash(&content),
            title: Some("T2".to_owned()),
            size_bytes: Some(quill_protocol::content_size_bytes(&content)),
            content,
            sync_revision: revision,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn timestamps_accept_integers_and_integer_strings() {
        assert_eq!(parse_timestamp(&json!(1700000000)).unwrap(), 1700000000);
        assert_eq!(parse_timestamp(&json!("1700000000")).unwrap(), 1700000000);
        assert!(matches!(
            parse_timestamp(&json!(12.5)),
            Err(SyncError::InvalidTimestamp)
        ));
        assert!(matches!(
            parse_timestamp(&json!("soon")),
            Err(SyncError::InvalidTimestamp)
        ));
        assert!(matches!(
            parse_timestamp(&json!(null)),
            Err(SyncError::InvalidTimestamp)
        ));
    }

    #[test]
    fn missing_join_params_map_to_missing_params() {
        let payload = json!({"email": "a@b.c"});
        assert!(matches!(
            required_str(&payload, "api_key"),
            Err(SyncError::MissingParams)
        ));
        assert_eq!(required_str(&payload, "email").unwrap(), "a@b.c");
    }

    #[test]
    fn conflict_reply_carries_the_existing_row() {
        let existing = sample_document(1);
        let existing_id = existing.id;
        let payload = error_payload(&SyncError::Conflict {
            existing: Box::new(existing),
        });
        assert_eq!(payload["reason"], "conflict");
        assert_eq!(payload["existing_id"], json!(existing_id));
        assert_eq!(payload["sync_revision"], 1);
    }

    #[test]
    fn version_mismatch_reply_carries_current_state() {
        let current = sample_document(2);
        let hash = current.content_hash.clone();
        let payload = error_payload(&SyncError::VersionMismatch {
            current: Box::new(current),
        });
        assert_eq!(payload["reason"], "version_mismatch");
        assert_eq!(payload["current_revision"], 2);
        assert_eq!(payload["current_content"], json!({"title": "T2"}));
        assert_eq!(payload["current_hash"], json!(hash));
    }

    #[test]
    fn plain_errors_reply_with_reason_and_message() {
        let payload = error_payload(&SyncError::NotFound);
        assert_eq!(payload["reason"], "not_found");
        assert!(payload["message"].is_string());
    }

    #[test]
    fn transform_operations_shifts_the_remote_stream() {
        let payload = json!({
            "local_ops": [{"op": "add", "path": "/items/2", "value": "L"}],
            "remote_ops": [{"op": "add", "path": "/items/5", "value": "R"}],
        });
        let result = transform_operations(&payload).unwrap();
        assert_eq!(result["transformed_local"][0]["path"], "/items/2");
        assert_eq!(result["transformed_remote"][0]["path"], "/items/6");
    }

    #[test]
    fn transform_operations_rejects_malformed_ops() {
        let payload = json!({
            "local_ops": [{"op": "explode", "path": "/items/2"}],
            "remote_ops": [],
        });
        assert!(matches!(
            transform_operations(&payload),
            Err(SyncError::InvalidParams(_))
        ));
    }

    #[test]
    fn uuid_params_are_validated() {
        let payload = json!({"id": "not-a-uuid"});
        assert!(matches!(
            required_uuid(&payload, "id"),
            Err(SyncError::InvalidParams(_))
        ));
        let id = Uuid::new_v4();
        let payload = json!({"id": id.to_string()});
        assert_eq!(required_uuid(&payload, "id").unwrap(), id);
    }
}
