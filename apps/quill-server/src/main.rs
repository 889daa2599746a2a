use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use quill_store::Store;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

mod channel;
mod registry;

use crate::registry::TopicRegistry;

#[derive(Debug, Parser)]
#[command(name = "quill-server")]
#[command(about = "quill document synchronization server")]
struct Cli {
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:4000")]
    listen: SocketAddr,
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,
    /// UUIDv5 namespace seed; must match the clients' value so user
    /// ids line up across nodes.
    #[arg(long, env = "APP_NAMESPACE_ID", default_value = "quill.app")]
    app_namespace_id: String,
    #[arg(long, env = "SESSION_SECRET")]
    session_secret: Option<String>,
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 10)]
    database_max_connections: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub registry: Arc<TopicRegistry>,
    next_session: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            registry: Arc::new(TopicRegistry::new()),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn next_session_id(&self) -> u64 {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if cli.session_secret.is_none() {
        warn!("SESSION_SECRET is not set; configure it in production deployments");
    }

    let store = Store::connect_with_options(
        &cli.database_url,
        cli.app_namespace_id.clone(),
        cli.database_max_connections,
    )
    .await
    .map_err(|error| anyhow::anyhow!("store connection failed: {error}"))?;
    store
        .run_migrations()
        .await
        .map_err(|error| anyhow::anyhow!("migrations failed: {error}"))?;

    let state = AppState::new(store);

    let app = Router::new()
        .route("/health", get(health))
        .route("/sync", get(channel::websocket_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!(listen = %cli.listen, namespace = %cli.app_namespace_id, "quill-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to install SIGTERM handler");
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
