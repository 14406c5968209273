//! # pulse-broker
//!
//! In-memory fan-out broker for gpupulse telemetry.
//!
//! The broker accepts publishes into a bounded inbound queue with an
//! accepted-prefix backpressure contract, and dispatches each record to
//! exactly one streaming subscriber using round-robin with
//! requeue-on-failure. Delivery is at-most-once: the broker holds no
//! persistent state.

pub mod service;

pub use service::{Dispatcher, TelemetryService};
