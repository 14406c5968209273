//! # pulse-streamer
//!
//! Telemetry producer for gpupulse.
//!
//! Reads rows from a CSV source, maps them to wire records, assembles
//! fixed-size/timed batches, and publishes them to the broker with
//! partial-accept handling and exponential backoff.

pub mod mapping;
pub mod publish;
pub mod source;
pub mod streamer;

pub use mapping::map_row;
pub use publish::{drain_remaining, GrpcPublisher, PublishOutcome, PublishTransport};
pub use source::CsvSource;
pub use streamer::run_streamer;
