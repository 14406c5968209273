//! # pulse-proto
//!
//! Protocol buffer definitions and generated gRPC bindings for gpupulse.
//!
//! This crate provides the wire API between the streamer, broker, and
//! collector: a unary `PublishBatch` with an accepted-prefix contract
//! and a server-streaming `Subscribe`.

pub mod conversions;

// Generated protobuf code
pub mod telemetry {
    pub mod v1 {
        tonic::include_proto!("gpupulse.telemetry.v1");
    }
}

// Re-export commonly used types for convenience (both server and client)
pub use telemetry::v1::{
    telemetry_client::TelemetryClient,
    telemetry_server::{Telemetry, TelemetryServer},
    PublishResponse, SubscriptionRequest, TelemetryBatch, TelemetryData,
};

/// Publish response status for a fully accepted batch.
pub const STATUS_OK: &str = "OK";

/// Publish response status when the broker stopped at a full queue.
pub const STATUS_BACKPRESSURE: &str = "BACKPRESSURE";

// Common error type for proto operations
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, ProtoError>;

/// Utility functions for working with protobuf timestamps
pub mod timestamp {
    use chrono::{DateTime, TimeZone, Utc};
    use prost_types::Timestamp;

    /// Convert a chrono UTC time to a protobuf Timestamp
    pub fn from_datetime(time: DateTime<Utc>) -> Timestamp {
        Timestamp {
            seconds: time.timestamp(),
            nanos: time.timestamp_subsec_nanos() as i32,
        }
    }

    /// Convert a protobuf Timestamp to a chrono UTC time. Out-of-range
    /// values clamp to the epoch.
    pub fn to_datetime(timestamp: &Timestamp) -> DateTime<Utc> {
        Utc.timestamp_opt(timestamp.seconds, timestamp.nanos.max(0) as u32)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap())
    }

    /// Current time as a protobuf Timestamp
    pub fn now() -> Timestamp {
        from_datetime(Utc::now())
    }
}
