//! # pulse-gateway
//!
//! Read-only HTTP API over gpupulse telemetry storage: health, GPU
//! listing, and per-GPU time-window queries, plus the OpenAPI document
//! and a Swagger UI page.

pub mod server;

pub use server::router;
