//! # pulse-core
//!
//! Core types, errors, and configuration for gpupulse - a backpressured
//! GPU telemetry pipeline.
//!
//! This crate provides the foundational pieces shared across all other
//! gpupulse components:
//!
//! - The `TelemetryRecord` data model
//! - A unified error type
//! - Per-component configuration structs with file/env layering
//! - Logging bootstrap for the daemon binaries

pub mod backoff;
pub mod config;
pub mod error;
pub mod logging;
pub mod signals;
pub mod types;

// Re-export commonly used types at the crate root
pub use backoff::Backoff;
pub use config::{BrokerConfig, CollectorConfig, GatewayConfig, ReplayMode, StreamerConfig};
pub use error::{Error, Result};
pub use types::TelemetryRecord;
