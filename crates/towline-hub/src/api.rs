//! Webhook HTTP server.
//!
//! Endpoints:
//! - POST /webhook — Chatwoot event envelope; always acknowledged unless
//!   the dispatcher fails, which answers a generic 500
//! - GET  /health  — liveness
//! - GET  /stats   — runtime counters

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use tracing::{error, info};

use towline_core::event::WebhookEvent;

use crate::dispatcher::Dispatcher;
use crate::metrics::SharedMetrics;
use crate::middleware::logging_middleware;

/// Shared API state.
pub struct ApiState {
    pub dispatcher: Dispatcher,
    pub metrics: SharedMetrics,
}

type SharedState = Arc<ApiState>;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn stats(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(state.metrics.to_json())
}

async fn webhook(
    State(state): State<SharedState>,
    Json(event): Json<WebhookEvent>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.dispatcher.handle_event(&event).await {
        Ok(()) => Ok(Json(serde_json::json!({ "ok": true }))),
        Err(e) => {
            // The platform may retry; the user never sees this text.
            error!("Webhook handling failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal error" })),
            ))
        }
    }
}

/// Build the API router.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/webhook", post(webhook))
        .layer(axum::middleware::from_fn(logging_middleware))
        .with_state(state)
}

/// Start the webhook server.
pub async fn start_server(state: ApiState, host: &str, port: u16) -> anyhow::Result<()> {
    let shared = Arc::new(state);
    let app = build_router(shared);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("🌐 Webhook server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
