//! Supervised subscribe/consume loop
//!
//! Wraps the collector loop in a reconnect supervisor: when the stream
//! fails or closes, the current batch has already been flushed, and the
//! supervisor re-subscribes after a bounded backoff. With reconnection
//! disabled the first stream failure shuts the pool down and propagates
//! the error, leaving the restart to the process supervisor.

use crate::pipeline::{run_collector_loop, FlushPool};
use crate::stream::RecordStream;
use pulse_core::{Backoff, CollectorConfig, Result};
use pulse_metrics::CollectorMetrics;
use pulse_storage::TelemetryStore;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the collector until shutdown, reconnecting on stream failures.
///
/// `connect` opens a fresh subscription stream; it is called once per
/// (re)connection attempt.
pub async fn run_collector<S, F, Fut>(
    config: &CollectorConfig,
    metrics: &CollectorMetrics,
    store: Arc<dyn TelemetryStore>,
    connect: F,
    mut reconnect_backoff: Backoff,
    cancel: CancellationToken,
) -> Result<()>
where
    S: RecordStream,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<S>>,
{
    let pool = FlushPool::spawn(config.workers, store, metrics.clone());
    let shutdown_timeout = Duration::from_millis(config.shutdown_timeout_ms);
    let flush_interval = Duration::from_millis(config.flush_ms);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match connect().await {
            Ok(mut stream) => {
                info!("subscribed to broker");
                reconnect_backoff.reset();
                match run_collector_loop(
                    &mut stream,
                    &pool,
                    config.batch_size,
                    flush_interval,
                    metrics,
                    &cancel,
                )
                .await
                {
                    Ok(()) => break, // shutdown requested
                    Err(e) => {
                        warn!("stream error: {}", e);
                        if !config.reconnect {
                            pool.shutdown(shutdown_timeout).await;
                            return Err(e);
                        }
                    }
                }
            }
            Err(e) => {
                warn!("subscribe failed: {}", e);
                if !config.reconnect {
                    pool.shutdown(shutdown_timeout).await;
                    return Err(e);
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(reconnect_backoff.current()) => {}
        }
        reconnect_backoff.advance();
    }

    pool.shutdown(shutdown_timeout).await;
    info!("collector stopped");
    Ok(())
}
