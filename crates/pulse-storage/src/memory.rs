//! In-memory telemetry store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_core::{Result, TelemetryRecord};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{check_gpu_id, TelemetryStore};

/// Thread-safe in-memory implementation of [`TelemetryStore`].
///
/// Each GPU timeline is kept sorted on insert; reads return copies so
/// callers cannot mutate internal state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, Vec<TelemetryRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn save(&self, record: &TelemetryRecord) -> Result<()> {
        let mut data = self.data.write().await;
        let timeline = data.entry(record.gpu_id.clone()).or_default();
        timeline.push(record.clone());
        // Stable sort keeps equal timestamps in insertion order.
        timeline.sort_by_key(|r| r.timestamp);
        Ok(())
    }

    async fn list_gpus(&self) -> Result<Vec<String>> {
        let data = self.data.read().await;
        let mut out: Vec<String> = data.keys().cloned().collect();
        out.sort();
        Ok(out)
    }

    async fn query(
        &self,
        gpu_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<TelemetryRecord>> {
        check_gpu_id(gpu_id)?;
        let data = self.data.read().await;
        let timeline = match data.get(gpu_id) {
            Some(t) => t,
            None => return Ok(Vec::new()),
        };
        let out = timeline
            .iter()
            .filter(|r| start.map_or(true, |s| r.timestamp >= s))
            .filter(|r| end.map_or(true, |e| r.timestamp <= e))
            .cloned()
            .collect();
        Ok(out)
    }
}
