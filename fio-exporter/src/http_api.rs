//! HTTP endpoints.
//!
//! Provides:
//! - `/metrics` - Prometheus metrics export
//! - `/health` - Exporter health and last benchmark outcome

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use prometheus::Registry;
use serde_json::json;

use crate::metrics::{self, FioGauges};

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Registry rendered on `/metrics`.
    pub registry: Registry,
    /// Gauges of the active benchmark.
    pub gauges: FioGauges,
    /// Label of the active benchmark profile.
    pub benchmark: &'static str,
    pub version: &'static str,
    pub started_at: Instant,
    pub pid: u32,
}

pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(state))
}

async fn metrics_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    match metrics::encode_registry(&state.registry) {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            output,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

/// Always 200 while the process is up; the body reports whether the last
/// decoded record was clean, or `null` before any record arrived.
async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": state.version,
        "pid": state.pid,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "benchmark": state.benchmark,
        "runs_total": state.gauges.runs_total(state.benchmark).unwrap_or(0.0),
        "last_success": state.gauges.success(state.benchmark).map(|v| v >= 1.0),
    }))
}

/// Bind the listener and serve in the background.
///
/// Binding happens before this returns so a taken port is reported at
/// startup rather than from inside the task.
pub async fn start_server(
    port: u16,
    state: HttpState,
) -> std::io::Result<tokio::task::JoinHandle<std::io::Result<()>>> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", listener.local_addr()?);

    Ok(tokio::spawn(async move {
        axum::serve(listener, router).await
    }))
}
