//! HTTP server for public share pages.
//!
//! Provides:
//! - `GET /health`
//! - `GET /share/{id}`: read-only snapshot of a conversation, fetched from the backend

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::Backend;
use crate::api::types::ConversationId;

use super::SharedConversation;

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default origin used to build share links.
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// State shared by the share handlers.
pub struct ShareState {
    /// Backend conversations are read from.
    pub backend: Arc<dyn Backend>,
    /// Public origin share links are built on.
    pub origin: String,
}

impl ShareState {
    /// Create share state over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, origin: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            origin: origin.into(),
        })
    }
}

/// Create the share router.
pub fn create_router(state: Arc<ShareState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/share/{id}", get(shared_conversation))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "scribe-share",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Serve the read-only view of one conversation.
async fn shared_conversation(
    State(state): State<Arc<ShareState>>,
    Path(id): Path<i64>,
) -> Result<Json<SharedConversation>, (StatusCode, String)> {
    let id = ConversationId(id);
    match state.backend.get_conversation(id).await {
        Ok(detail) => Ok(Json(SharedConversation::from_detail(detail, &state.origin))),
        Err(e) if e.status() == Some(404) => Err((
            StatusCode::NOT_FOUND,
            format!("Conversation {id} not found"),
        )),
        Err(e) => {
            tracing::error!(conversation_id = %id, error = %e, "share lookup failed");
            Err((StatusCode::BAD_GATEWAY, format!("Backend error: {e}")))
        }
    }
}

/// Start the share server, stopping when `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server_with_shutdown<F>(
    state: Arc<ShareState>,
    port: u16,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app: Router = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Scribe share server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}
