//! The streamer loop: batch assembly and flush triggers
//!
//! Flushes when the batch reaches its size limit, when the tick
//! interval elapses with a non-empty batch, and on shutdown. The final
//! shutdown drain runs under a fresh cancellation bounded by the grace
//! window, so in-flight records get one last chance before being
//! abandoned.

use crate::publish::{drain_remaining, PublishTransport};
use crate::source::CsvSource;
use crate::mapping::map_row;
use pulse_core::{Backoff, Result, StreamerConfig};
use pulse_metrics::StreamerMetrics;
use pulse_proto::TelemetryData;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Run the streamer until the source is exhausted or shutdown.
pub async fn run_streamer<T: PublishTransport>(
    config: &StreamerConfig,
    metrics: &StreamerMetrics,
    transport: &mut T,
    mut source: CsvSource,
    cancel: CancellationToken,
) -> Result<()> {
    let headers = source.headers().to_vec();
    let mut batch: Vec<TelemetryData> = Vec::with_capacity(config.batch_size);
    let mut backoff = Backoff::new(
        Duration::from_millis(config.backoff_initial_ms),
        Duration::from_millis(config.backoff_max_ms),
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a tokio interval fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if !batch.is_empty() {
                    info!(batch = batch.len(), "shutdown, draining final batch");
                    let grace = Duration::from_millis(config.shutdown_grace_ms);
                    let final_cancel = CancellationToken::new();
                    let _ = tokio::time::timeout(
                        grace,
                        drain_remaining(transport, std::mem::take(&mut batch), &mut backoff, metrics, &final_cancel),
                    )
                    .await;
                }
                info!("streamer exiting");
                return Ok(());
            }
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    debug!(batch = batch.len(), "timer flush");
                    drain_remaining(transport, std::mem::take(&mut batch), &mut backoff, metrics, &cancel).await;
                    metrics.batch_pending.set(0.0);
                }
            }
            maybe_row = source.next_row() => {
                match maybe_row {
                    Some(fields) => {
                        metrics.rows_ingested.inc();
                        if let Some(item) = map_row(&headers, &fields, &config.producer_id, &config.host_id) {
                            batch.push(item);
                        }
                        metrics.batch_pending.set(batch.len() as f64);
                        if batch.len() >= config.batch_size {
                            debug!(batch = batch.len(), "size flush");
                            drain_remaining(transport, std::mem::take(&mut batch), &mut backoff, metrics, &cancel).await;
                            metrics.batch_pending.set(0.0);
                        }
                    }
                    None => {
                        if !batch.is_empty() {
                            drain_remaining(transport, std::mem::take(&mut batch), &mut backoff, metrics, &cancel).await;
                            metrics.batch_pending.set(0.0);
                        }
                        info!("source exhausted, streamer exiting");
                        return Ok(());
                    }
                }
            }
        }
    }
}
