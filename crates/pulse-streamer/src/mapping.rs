//! Row-to-record mapping
//!
//! Maps one CSV row to a wire telemetry record. Column names arrive
//! lower-cased and trimmed from the source. The rules:
//!
//! - GPU-id column aliases: `gpu`, `gpu_id`, `gpuuuid`, `gpu_uuid`.
//!   Missing, empty, or `gpu-unknown` drops the row.
//! - Host-id aliases (`host`, `host_id`, `hostname`) are recognized but
//!   never become metrics.
//! - Any remaining column whose value parses as a finite float becomes a
//!   metric under the column name.
//! - Pivot: a generic `value`/`_value` number is keyed by the row's
//!   metric-name column (`_field`, `field_name`, `metric_name`,
//!   `metric`, `name`) when one exists, lower-cased.

use pulse_proto::{timestamp, TelemetryData};
use std::collections::HashMap;

const GPU_ID_ALIASES: [&str; 4] = ["gpu", "gpu_id", "gpuuuid", "gpu_uuid"];
const HOST_ID_ALIASES: [&str; 3] = ["host", "host_id", "hostname"];
const FIELD_NAME_ALIASES: [&str; 5] = ["_field", "field_name", "metric_name", "metric", "name"];

/// Map one row to a record, stamping the current time. Returns `None`
/// when the row has no usable GPU id.
pub fn map_row(
    headers: &[String],
    fields: &[String],
    producer_id: &str,
    host_id: &str,
) -> Option<TelemetryData> {
    let mut gpu_id = String::new();
    let mut metrics = HashMap::new();

    // Metric-name column common in DCGM/Influx exports.
    let field_name_idx = headers
        .iter()
        .position(|h| FIELD_NAME_ALIASES.contains(&h.as_str()));

    for (i, header) in headers.iter().enumerate() {
        let Some(raw) = fields.get(i) else { continue };
        let value = raw.trim();

        if GPU_ID_ALIASES.contains(&header.as_str()) {
            gpu_id = value.to_string();
            continue;
        }
        if HOST_ID_ALIASES.contains(&header.as_str()) {
            continue;
        }

        let Ok(parsed) = value.parse::<f64>() else { continue };
        if !parsed.is_finite() {
            continue;
        }

        if header == "value" || header == "_value" {
            if let Some(key) = field_name_idx.and_then(|idx| fields.get(idx)) {
                let key = key.trim().to_lowercase();
                if !key.is_empty() {
                    metrics.insert(key, parsed);
                    continue;
                }
            }
        }
        metrics.insert(header.clone(), parsed);
    }

    if gpu_id.is_empty() || gpu_id == "gpu-unknown" {
        return None;
    }

    Some(TelemetryData {
        producer_id: producer_id.to_string(),
        host_id: host_id.to_string(),
        gpu_id,
        ts: Some(timestamp::now()),
        metrics,
    })
}
