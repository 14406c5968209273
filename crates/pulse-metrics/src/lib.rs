//! # pulse-metrics
//!
//! Prometheus metrics for gpupulse components.
//!
//! Each process constructs its metric handles once at startup against an
//! injected `prometheus::Registry` and serves the registry over an axum
//! `/metrics` endpoint. There is no process-wide registry singleton.

pub mod exporter;
pub mod handles;

pub use exporter::{metrics_router, serve_metrics};
pub use handles::{BrokerMetrics, CollectorMetrics, StreamerMetrics};

/// Metric namespace shared by all gpupulse processes.
pub const NAMESPACE: &str = "gpu_telemetry";

// Error handling
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Registry error: {0}")]
    Registry(#[from] prometheus::Error),

    #[error("Export error: {0}")]
    Export(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MetricsError>;
