//! Prometheus exposition endpoint
//!
//! Every gpupulse process serves its registry over a small axum app with
//! `/metrics` and `/health` routes.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::Result;

/// Build the axum app serving the given registry.
pub fn metrics_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(registry)
}

/// Bind and serve the metrics endpoint until the process exits.
pub async fn serve_metrics(addr: SocketAddr, registry: Arc<Registry>) -> Result<()> {
    let app = metrics_router(registry);
    let listener = TcpListener::bind(addr).await?;
    info!("metrics listening on {}", addr);
    axum::serve(listener, app)
        .await
        .map_err(|e| crate::MetricsError::Export(e.to_string()))
}

/// Handler for /metrics
async fn metrics_handler(State(registry): State<Arc<Registry>>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => match String::from_utf8(buffer) {
            Ok(text) => (
                StatusCode::OK,
                [("content-type", encoder.format_type())],
                text,
            )
                .into_response(),
            Err(e) => {
                warn!("metrics encoding produced invalid UTF-8: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
            }
        },
        Err(e) => {
            warn!("failed to encode prometheus metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// Handler for /health
async fn health_handler() -> Response {
    (StatusCode::OK, "OK").into_response()
}
