//! Subscription stream abstraction
//!
//! The collector loop consumes records through a small trait so tests
//! can drive it from a channel instead of a live gRPC stream.

use async_trait::async_trait;
use pulse_core::{Error, Result};
use pulse_proto::{SubscriptionRequest, TelemetryClient, TelemetryData};
use tonic::Streaming;

/// A stream of telemetry records from the broker.
#[async_trait]
pub trait RecordStream: Send {
    /// The next record; `None` when the stream ended cleanly.
    async fn next_record(&mut self) -> Result<Option<TelemetryData>>;
}

/// Production stream over a tonic server-streaming response.
pub struct GrpcRecordStream {
    inner: Streaming<TelemetryData>,
}

#[async_trait]
impl RecordStream for GrpcRecordStream {
    async fn next_record(&mut self) -> Result<Option<TelemetryData>> {
        self.inner
            .message()
            .await
            .map_err(|s| Error::transport(format!("recv: {}", s)))
    }
}

/// Dial the broker and open a subscription for the given group.
pub async fn subscribe(broker_addr: String, group: String) -> Result<GrpcRecordStream> {
    let mut client = TelemetryClient::connect(broker_addr)
        .await
        .map_err(|e| Error::transport(format!("dial broker: {}", e)))?;

    let stream = client
        .subscribe(SubscriptionRequest { group })
        .await
        .map_err(|s| Error::transport(format!("subscribe: {}", s)))?
        .into_inner();

    Ok(GrpcRecordStream { inner: stream })
}
