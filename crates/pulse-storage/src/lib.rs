//! # pulse-storage
//!
//! Time-ordered telemetry storage for gpupulse.
//!
//! A store holds one timeline per GPU, readable in ascending timestamp
//! order. Two implementations are provided: an in-memory store for tests
//! and demos, and a SQLite-backed store for durable persistence.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_core::{Result, TelemetryRecord};

/// Storage interface for telemetry records.
///
/// `query` bounds are inclusive on both sides; a missing bound is
/// unbounded on that side. Duplicate timestamps are allowed and
/// idempotency is not required.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Durably append one record.
    async fn save(&self, record: &TelemetryRecord) -> Result<()>;

    /// Sorted unique GPU ids present in the store.
    async fn list_gpus(&self) -> Result<Vec<String>>;

    /// Records for one GPU in ascending timestamp order, filtered to the
    /// optional inclusive window. `gpu_id` must be non-empty.
    async fn query(
        &self,
        gpu_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<TelemetryRecord>>;
}

/// Reject queries with an empty gpu id before touching the backend.
pub(crate) fn check_gpu_id(gpu_id: &str) -> Result<()> {
    if gpu_id.trim().is_empty() {
        return Err(pulse_core::Error::invalid_request("gpu_id is empty"));
    }
    Ok(())
}
