//! Core data model for gpupulse
//!
//! A `TelemetryRecord` is one fact about one GPU at one instant. Records
//! are immutable after creation and move through the pipeline by value:
//! producer batch, broker queue, subscriber buffer, consumer batch,
//! storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single telemetry observation for one GPU.
///
/// Invariants enforced by [`TelemetryRecord::new`]:
/// - `gpu_id` is non-empty after trimming
/// - every metric value is a finite number
///
/// Unknown metric names are allowed; an empty metrics map is a valid
/// record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub gpu_id: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: HashMap<String, f64>,
}

impl TelemetryRecord {
    /// Create a record, validating the data-model invariants.
    pub fn new(
        gpu_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        metrics: HashMap<String, f64>,
    ) -> crate::Result<Self> {
        let gpu_id = gpu_id.into();
        if gpu_id.trim().is_empty() {
            return Err(crate::Error::invalid_record("gpu_id is empty"));
        }
        if let Some((name, value)) = metrics.iter().find(|(_, v)| !v.is_finite()) {
            return Err(crate::Error::invalid_record(format!(
                "metric {} has non-finite value {}",
                name, value
            )));
        }
        Ok(Self {
            gpu_id,
            timestamp,
            metrics,
        })
    }

    /// Whether the record satisfies the consumer-side validation rule:
    /// trimmed `gpu_id` non-empty. The timestamp is always present on
    /// this type; wire-level records without one are rejected during
    /// conversion.
    pub fn is_valid(&self) -> bool {
        !self.gpu_id.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 18, 13, 42, 33).unwrap()
    }

    #[test]
    fn test_record_creation() {
        let mut metrics = HashMap::new();
        metrics.insert("gpu_utilization".to_string(), 87.5);
        let rec = TelemetryRecord::new("GPU-0", ts(), metrics).unwrap();
        assert_eq!(rec.gpu_id, "GPU-0");
        assert!(rec.is_valid());
    }

    #[test]
    fn test_empty_metrics_is_valid() {
        let rec = TelemetryRecord::new("GPU-0", ts(), HashMap::new()).unwrap();
        assert!(rec.metrics.is_empty());
        assert!(rec.is_valid());
    }

    #[test]
    fn test_whitespace_gpu_id_rejected() {
        let err = TelemetryRecord::new("   ", ts(), HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("gpu_id"));
    }

    #[test]
    fn test_non_finite_metric_rejected() {
        let mut metrics = HashMap::new();
        metrics.insert("power_watts".to_string(), f64::NAN);
        assert!(TelemetryRecord::new("GPU-0", ts(), metrics).is_err());

        let mut metrics = HashMap::new();
        metrics.insert("power_watts".to_string(), f64::INFINITY);
        assert!(TelemetryRecord::new("GPU-0", ts(), metrics).is_err());
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut metrics = HashMap::new();
        metrics.insert("temperature_c".to_string(), 61.0);
        let rec = TelemetryRecord::new("GPU-1", ts(), metrics).unwrap();

        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"gpu_id\":\"GPU-1\""));
        let back: TelemetryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
