//! # pulse-collector
//!
//! Subscribing telemetry consumer for gpupulse.
//!
//! Opens a subscription stream against the broker, validates and
//! batches incoming records, and hands batches to a pool of flush
//! workers that write to storage. Stream failures are handled by a
//! supervised reconnect loop with bounded backoff.

pub mod pipeline;
pub mod stream;
pub mod supervisor;

pub use pipeline::{run_collector_loop, FlushPool};
pub use stream::{subscribe, GrpcRecordStream, RecordStream};
pub use supervisor::run_collector;
