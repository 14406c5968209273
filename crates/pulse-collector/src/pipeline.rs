//! Collector pipeline: validation, batching, and the flush worker pool
//!
//! The loop validates each record, appends it to an in-memory batch,
//! and flushes on size, timer, stream end, or shutdown. A flush copies
//! the batch into a job and sends it to a bounded jobs channel; when
//! the channel is full the flush blocks, pushing backpressure upstream
//! through the subscriber buffer and the broker queue.

use crate::stream::RecordStream;
use pulse_core::{Result, TelemetryRecord};
use pulse_metrics::CollectorMetrics;
use pulse_storage::TelemetryStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of the jobs channel feeding the workers.
const JOBS_CHANNEL_CAPACITY: usize = 64;

/// A pool of flush workers writing records to storage.
///
/// Workers write records one by one; per-record failures are counted
/// and do not abort the job.
pub struct FlushPool {
    jobs_tx: mpsc::Sender<Vec<TelemetryRecord>>,
    handles: Vec<JoinHandle<()>>,
}

impl FlushPool {
    /// Spawn `workers` flush tasks over the given store.
    pub fn spawn(
        workers: usize,
        store: Arc<dyn TelemetryStore>,
        metrics: CollectorMetrics,
    ) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Vec<TelemetryRecord>>(JOBS_CHANNEL_CAPACITY);
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let jobs_rx = jobs_rx.clone();
            let store = store.clone();
            let metrics = metrics.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let job = { jobs_rx.lock().await.recv().await };
                    let Some(job) = job else { break };

                    let start = Instant::now();
                    let mut flushed = 0usize;
                    for record in &job {
                        match store.save(record).await {
                            Ok(()) => {
                                metrics.flushed.inc();
                                flushed += 1;
                            }
                            Err(e) => {
                                metrics.flush_errors.inc();
                                warn!(
                                    gpu = %record.gpu_id,
                                    ts = %record.timestamp.to_rfc3339(),
                                    "flush error: {}",
                                    e
                                );
                            }
                        }
                    }
                    let elapsed = start.elapsed();
                    metrics.flush_latency.observe(elapsed.as_secs_f64());
                    debug!(worker = worker_id, flushed, ?elapsed, "flushed batch");
                }
            }));
        }

        Self { jobs_tx, handles }
    }

    /// Hand a job to the pool, blocking while the channel is full.
    pub async fn submit(&self, job: Vec<TelemetryRecord>) {
        if self.jobs_tx.send(job).await.is_err() {
            warn!("jobs channel closed, dropping batch");
        }
    }

    /// Close the jobs channel and wait for workers to drain, bounded by
    /// `timeout`. On timeout the remaining jobs are abandoned.
    pub async fn shutdown(self, timeout: Duration) {
        let Self { jobs_tx, handles } = self;
        drop(jobs_tx);

        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!("shutdown timeout after {:?}; exiting now", timeout);
        }
    }
}

async fn flush(batch: &mut Vec<TelemetryRecord>, pool: &FlushPool, metrics: &CollectorMetrics) {
    if batch.is_empty() {
        return;
    }
    let job = std::mem::take(batch);
    metrics.backlog.set(0.0);
    pool.submit(job).await;
}

/// Consume one subscription stream until it ends or shutdown.
///
/// Returns `Ok(())` on cancellation and a transport error when the
/// stream fails or closes; the caller decides whether to reconnect.
/// The current batch is always flushed before returning.
pub async fn run_collector_loop<S: RecordStream>(
    stream: &mut S,
    pool: &FlushPool,
    batch_size: usize,
    flush_interval: Duration,
    metrics: &CollectorMetrics,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut batch: Vec<TelemetryRecord> = Vec::with_capacity(batch_size);

    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                flush(&mut batch, pool, metrics).await;
                return Ok(());
            }
            _ = ticker.tick() => {
                debug!(batch = batch.len(), "timer flush");
                flush(&mut batch, pool, metrics).await;
            }
            result = stream.next_record() => {
                match result {
                    Ok(Some(msg)) => {
                        metrics.received.inc();
                        match TelemetryRecord::try_from(msg) {
                            Ok(record) => {
                                batch.push(record);
                                metrics.batched.inc();
                                metrics.backlog.set(batch.len() as f64);
                                if batch.len() >= batch_size {
                                    debug!(batch = batch.len(), "size flush");
                                    flush(&mut batch, pool, metrics).await;
                                }
                            }
                            Err(e) => {
                                metrics.dropped_invalid.inc();
                                debug!("dropping invalid record: {}", e);
                            }
                        }
                    }
                    Ok(None) => {
                        flush(&mut batch, pool, metrics).await;
                        return Err(pulse_core::Error::transport("stream closed"));
                    }
                    Err(e) => {
                        flush(&mut batch, pool, metrics).await;
                        return Err(e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use pulse_proto::{timestamp, TelemetryData};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// Channel-backed fake subscription stream.
    struct FakeStream {
        rx: mpsc::Receiver<TelemetryData>,
    }

    fn fake_stream(buf: usize) -> (mpsc::Sender<TelemetryData>, FakeStream) {
        let (tx, rx) = mpsc::channel(buf);
        (tx, FakeStream { rx })
    }

    #[async_trait]
    impl RecordStream for FakeStream {
        async fn next_record(&mut self) -> Result<Option<TelemetryData>> {
            Ok(self.rx.recv().await)
        }
    }

    /// Store that captures saved records and can be set to fail.
    #[derive(Default)]
    struct CaptureStore {
        items: StdMutex<Vec<TelemetryRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl TelemetryStore for CaptureStore {
        async fn save(&self, record: &TelemetryRecord) -> Result<()> {
            if self.fail {
                return Err(pulse_core::Error::storage("save failed"));
            }
            self.items.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn list_gpus(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn query(
            &self,
            _gpu_id: &str,
            _start: Option<chrono::DateTime<Utc>>,
            _end: Option<chrono::DateTime<Utc>>,
        ) -> Result<Vec<TelemetryRecord>> {
            Ok(Vec::new())
        }
    }

    fn data(gpu_id: &str) -> TelemetryData {
        TelemetryData {
            gpu_id: gpu_id.to_string(),
            ts: Some(timestamp::now()),
            metrics: HashMap::new(),
            ..Default::default()
        }
    }

    fn test_metrics() -> CollectorMetrics {
        CollectorMetrics::new().unwrap()
    }

    const LONG_TICK: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_flush_on_size() {
        let (tx, mut stream) = fake_stream(10);
        let store = Arc::new(CaptureStore::default());
        let metrics = test_metrics();
        let pool = FlushPool::spawn(1, store.clone(), metrics.clone());

        for i in 0..3 {
            tx.send(data(&format!("g{}", i))).await.unwrap();
        }
        drop(tx); // stream ends after the queued records

        let err = run_collector_loop(
            &mut stream,
            &pool,
            3,
            LONG_TICK,
            &metrics,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("stream closed"));

        pool.shutdown(Duration::from_secs(2)).await;
        assert_eq!(store.items.lock().unwrap().len(), 3);
        assert_eq!(metrics.received.get(), 3.0);
        assert_eq!(metrics.batched.get(), 3.0);
        assert_eq!(metrics.flushed.get(), 3.0);
    }

    #[tokio::test]
    async fn test_invalid_records_dropped_and_counted() {
        let (tx, mut stream) = fake_stream(10);
        let store = Arc::new(CaptureStore::default());
        let metrics = test_metrics();
        let pool = FlushPool::spawn(1, store.clone(), metrics.clone());

        tx.send(data("g1")).await.unwrap();
        // Whitespace gpu id and missing timestamp are both invalid.
        tx.send(data("   ")).await.unwrap();
        tx.send(TelemetryData {
            gpu_id: "g2".to_string(),
            ts: None,
            ..Default::default()
        })
        .await
        .unwrap();
        drop(tx);

        let _ = run_collector_loop(
            &mut stream,
            &pool,
            100,
            LONG_TICK,
            &metrics,
            &CancellationToken::new(),
        )
        .await;

        pool.shutdown(Duration::from_secs(2)).await;
        let saved = store.items.lock().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].gpu_id, "g1");
        assert_eq!(metrics.dropped_invalid.get(), 2.0);
        assert_eq!(metrics.batched.get(), 1.0);
    }

    #[tokio::test]
    async fn test_timer_flush() {
        let (tx, mut stream) = fake_stream(10);
        let store = Arc::new(CaptureStore::default());
        let metrics = test_metrics();
        let pool = FlushPool::spawn(1, store.clone(), metrics.clone());

        tx.send(data("g1")).await.unwrap();

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            stop.cancel();
            // Keep the stream open until the loop has observed the
            // cancellation, so it exits through the shutdown path.
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(tx);
        });

        run_collector_loop(
            &mut stream,
            &pool,
            100,
            Duration::from_millis(20),
            &metrics,
            &cancel,
        )
        .await
        .unwrap();

        pool.shutdown(Duration::from_secs(2)).await;
        // The record was flushed by the timer, well before cancellation.
        assert_eq!(store.items.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_errors_counted_but_not_fatal() {
        let (tx, mut stream) = fake_stream(10);
        let store = Arc::new(CaptureStore {
            fail: true,
            ..Default::default()
        });
        let metrics = test_metrics();
        let pool = FlushPool::spawn(2, store.clone(), metrics.clone());

        for i in 0..4 {
            tx.send(data(&format!("g{}", i))).await.unwrap();
        }
        drop(tx);

        let _ = run_collector_loop(
            &mut stream,
            &pool,
            2,
            LONG_TICK,
            &metrics,
            &CancellationToken::new(),
        )
        .await;

        pool.shutdown(Duration::from_secs(2)).await;
        assert_eq!(metrics.flush_errors.get(), 4.0);
        assert_eq!(metrics.flushed.get(), 0.0);
        assert!(store.items.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_final_flush_on_cancellation() {
        let (tx, mut stream) = fake_stream(10);
        let store = Arc::new(CaptureStore::default());
        let metrics = test_metrics();
        let pool = FlushPool::spawn(1, store.clone(), metrics.clone());

        tx.send(data("g1")).await.unwrap();
        tx.send(data("g2")).await.unwrap();

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            // Give the loop time to batch both records, then stop it.
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.cancel();
        });

        run_collector_loop(&mut stream, &pool, 100, LONG_TICK, &metrics, &cancel)
            .await
            .unwrap();

        pool.shutdown(Duration::from_secs(2)).await;
        assert_eq!(store.items.lock().unwrap().len(), 2);
    }
}
