//! HTTP surface of the alert webhook.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::handler::AlertDispatcher;
use super::payload::WebhookPayload;

/// Path Alertmanager posts to.
pub const WEBHOOK_PATH: &str = "/alertmanager-webhook";

/// Builds the webhook router.
pub fn build_router(dispatcher: Arc<AlertDispatcher>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(alertmanager_webhook))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// Always answers 200 so that Alertmanager does not retry; undecodable
/// bodies are logged and dropped.
async fn alertmanager_webhook(
    State(dispatcher): State<Arc<AlertDispatcher>>,
    body: Bytes,
) -> StatusCode {
    match WebhookPayload::from_slice(&body) {
        Ok(payload) if payload.alerts.is_empty() => {}
        Ok(payload) => {
            dispatcher.handle(&payload).await;
        }
        Err(e) => warn!(error = %e, bytes = body.len(), "Ignoring undecodable webhook body"),
    }
    StatusCode::OK
}

async fn health() -> &'static str {
    "ok"
}

/// Serves the webhook on `addr` until Ctrl+C.
pub async fn serve(addr: SocketAddr, dispatcher: Arc<AlertDispatcher>) -> std::io::Result<()> {
    let app = build_router(dispatcher);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, path = WEBHOOK_PATH, "Alert webhook listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Alert webhook shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
