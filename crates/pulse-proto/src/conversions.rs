//! Conversions between pulse-core types and protobuf types
//!
//! Wire records carry producer and host identity that the persisted
//! model does not; converting to a `TelemetryRecord` drops them and
//! enforces the data-model invariants.

use crate::{timestamp, ProtoError, TelemetryData};
use pulse_core::TelemetryRecord;

impl TryFrom<TelemetryData> for TelemetryRecord {
    type Error = ProtoError;

    fn try_from(proto: TelemetryData) -> Result<Self, Self::Error> {
        let ts = proto
            .ts
            .as_ref()
            .ok_or_else(|| ProtoError::InvalidData("missing timestamp".to_string()))?;

        TelemetryRecord::new(proto.gpu_id, timestamp::to_datetime(ts), proto.metrics)
            .map_err(|e| ProtoError::InvalidData(e.to_string()))
    }
}

impl From<TelemetryRecord> for TelemetryData {
    fn from(record: TelemetryRecord) -> Self {
        Self {
            producer_id: String::new(),
            host_id: String::new(),
            gpu_id: record.gpu_id,
            ts: Some(timestamp::from_datetime(record.timestamp)),
            metrics: record.metrics,
        }
    }
}
