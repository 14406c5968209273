//! SQLite-backed telemetry store
//!
//! Single table with second-resolution timestamps and metrics as a JSON
//! object of numbers, indexed on `(gpu_id, ts)`. Writes go through a
//! single pooled connection with a busy timeout; SQLite serializes them.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pulse_core::{Error, Result, TelemetryRecord};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::{check_gpu_id, TelemetryStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS telemetry (
  gpu_id TEXT NOT NULL,
  ts INTEGER NOT NULL,
  metrics TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_telemetry_gpu_ts ON telemetry(gpu_id, ts);
";

/// [`TelemetryStore`] backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and initialize) a SQLite database.
    ///
    /// Example DSN: `sqlite:gpu-telemetry.db` or `sqlite::memory:`.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| Error::storage(format!("parse dsn: {}", e)))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Error::storage(format!("open sqlite: {}", e)))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| Error::storage(format!("init schema: {}", e)))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl TelemetryStore for SqliteStore {
    async fn save(&self, record: &TelemetryRecord) -> Result<()> {
        let metrics_json = serde_json::to_string(&record.metrics)?;
        sqlx::query("INSERT INTO telemetry(gpu_id, ts, metrics) VALUES (?1, ?2, ?3)")
            .bind(&record.gpu_id)
            .bind(record.timestamp.timestamp())
            .bind(metrics_json)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("insert telemetry: {}", e)))?;
        Ok(())
    }

    async fn list_gpus(&self) -> Result<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT gpu_id FROM telemetry ORDER BY gpu_id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::storage(format!("list gpus: {}", e)))?;
        Ok(ids)
    }

    async fn query(
        &self,
        gpu_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<TelemetryRecord>> {
        check_gpu_id(gpu_id)?;

        let mut sql = String::from("SELECT ts, metrics FROM telemetry WHERE gpu_id = ?1");
        if start.is_some() {
            sql.push_str(" AND ts >= ?");
        }
        if end.is_some() {
            sql.push_str(" AND ts <= ?");
        }
        sql.push_str(" ORDER BY ts ASC");

        let mut query = sqlx::query(&sql).bind(gpu_id);
        if let Some(s) = start {
            query = query.bind(s.timestamp());
        }
        if let Some(e) = end {
            query = query.bind(e.timestamp());
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("query telemetry: {}", e)))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let ts: i64 = row.get(0);
            let metrics_json: String = row.get(1);
            let metrics: HashMap<String, f64> = serde_json::from_str(&metrics_json)?;
            let timestamp = Utc
                .timestamp_opt(ts, 0)
                .single()
                .ok_or_else(|| Error::storage(format!("timestamp out of range: {}", ts)))?;
            out.push(TelemetryRecord {
                gpu_id: gpu_id.to_string(),
                timestamp,
                metrics,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn record(gpu: &str, ts: DateTime<Utc>, metrics: HashMap<String, f64>) -> TelemetryRecord {
        TelemetryRecord::new(gpu, ts, metrics).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 18, 12, 0, 0).unwrap()
    }

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_save_and_query_round_trip() {
        let store = memory_store().await;
        let metrics = HashMap::from([("gpu_utilization".to_string(), 88.0)]);
        store.save(&record("g1", t0(), metrics.clone())).await.unwrap();

        let items = store.query("g1", None, None).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].gpu_id, "g1");
        assert_eq!(items[0].timestamp, t0());
        assert_eq!(items[0].metrics, metrics);
    }

    #[tokio::test]
    async fn test_query_ascending_order() {
        let store = memory_store().await;
        for offset in [2, 1, 3] {
            store
                .save(&record("g1", t0() + ChronoDuration::seconds(offset), HashMap::new()))
                .await
                .unwrap();
        }
        let items = store.query("g1", None, None).await.unwrap();
        let ts: Vec<_> = items.iter().map(|r| r.timestamp).collect();
        assert_eq!(
            ts,
            vec![
                t0() + ChronoDuration::seconds(1),
                t0() + ChronoDuration::seconds(2),
                t0() + ChronoDuration::seconds(3)
            ]
        );
    }

    #[tokio::test]
    async fn test_window_bounds_inclusive() {
        let store = memory_store().await;
        for offset in 0..5 {
            store
                .save(&record("g1", t0() + ChronoDuration::seconds(offset), HashMap::new()))
                .await
                .unwrap();
        }
        let items = store
            .query(
                "g1",
                Some(t0() + ChronoDuration::seconds(1)),
                Some(t0() + ChronoDuration::seconds(3)),
            )
            .await
            .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].timestamp, t0() + ChronoDuration::seconds(1));
        assert_eq!(items[2].timestamp, t0() + ChronoDuration::seconds(3));
    }

    #[tokio::test]
    async fn test_list_gpus_sorted() {
        let store = memory_store().await;
        for gpu in ["g2", "g0", "g1"] {
            store.save(&record(gpu, t0(), HashMap::new())).await.unwrap();
        }
        assert_eq!(store.list_gpus().await.unwrap(), vec!["g0", "g1", "g2"]);
    }

    #[tokio::test]
    async fn test_empty_gpu_id_rejected() {
        let store = memory_store().await;
        assert!(store.query("", None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let dsn = format!("sqlite:{}", dir.path().join("telemetry.db").display());

        {
            let store = SqliteStore::connect(&dsn).await.unwrap();
            store.save(&record("g1", t0(), HashMap::new())).await.unwrap();
        }

        let store = SqliteStore::connect(&dsn).await.unwrap();
        let items = store.query("g1", None, None).await.unwrap();
        assert_eq!(items.len(), 1);
    }
}
