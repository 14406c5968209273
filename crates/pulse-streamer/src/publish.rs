//! Publish transport and the partial-accept drain loop

use async_trait::async_trait;
use pulse_core::{Backoff, Error, Result};
use pulse_metrics::StreamerMetrics;
use pulse_proto::{TelemetryBatch, TelemetryClient, TelemetryData, STATUS_BACKPRESSURE};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tracing::{debug, warn};

/// Client-side view of a publish response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub accepted: usize,
    pub backpressure: bool,
}

/// Seam between the drain loop and the broker transport.
#[async_trait]
pub trait PublishTransport: Send {
    async fn publish(&mut self, items: &[TelemetryData]) -> Result<PublishOutcome>;
}

/// Production transport over a tonic channel.
pub struct GrpcPublisher {
    client: TelemetryClient<Channel>,
}

impl GrpcPublisher {
    pub async fn connect(addr: String) -> Result<Self> {
        let client = TelemetryClient::connect(addr)
            .await
            .map_err(|e| Error::transport(format!("dial broker: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PublishTransport for GrpcPublisher {
    async fn publish(&mut self, items: &[TelemetryData]) -> Result<PublishOutcome> {
        let response = self
            .client
            .publish_batch(TelemetryBatch {
                items: items.to_vec(),
            })
            .await
            .map_err(|s| Error::transport(s.to_string()))?
            .into_inner();

        let accepted = usize::try_from(response.accepted).unwrap_or(0).min(items.len());
        Ok(PublishOutcome {
            accepted,
            backpressure: response.status == STATUS_BACKPRESSURE,
        })
    }
}

/// Publish `remaining` until the broker has accepted everything.
///
/// Backpressure advances past the accepted prefix and waits out the
/// current backoff; transport errors retry the whole remainder. The
/// backoff doubles after every wait and resets to its initial value
/// once a drain completes with a full accept. Cancellation during a
/// wait abandons the remainder.
pub async fn drain_remaining<T: PublishTransport>(
    transport: &mut T,
    mut remaining: Vec<TelemetryData>,
    backoff: &mut Backoff,
    metrics: &StreamerMetrics,
    cancel: &CancellationToken,
) {
    while !remaining.is_empty() {
        if cancel.is_cancelled() {
            return;
        }

        let start = Instant::now();
        let result = transport.publish(&remaining).await;
        metrics.publish_latency.observe(start.elapsed().as_secs_f64());

        match result {
            Err(e) => {
                metrics.errors.inc();
                warn!(
                    "publish error: {} (retrying in {:?})",
                    e,
                    backoff.current()
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(backoff.current()) => {}
                }
                backoff.advance();
            }
            Ok(outcome) => {
                metrics.items_published.inc_by(outcome.accepted as f64);
                if outcome.backpressure {
                    metrics.backpressure.inc();
                    remaining.drain(..outcome.accepted);
                    debug!(
                        accepted = outcome.accepted,
                        remaining = remaining.len(),
                        "backpressure"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(backoff.current()) => {}
                    }
                    backoff.advance();
                } else {
                    debug!(accepted = outcome.accepted, "published ok");
                    remaining.clear();
                    backoff.reset();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Scripted fake transport: pops one outcome (or error) per call.
    struct ScriptedTransport {
        script: Vec<Result<PublishOutcome>>,
        calls: usize,
        seen_lens: Vec<usize>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<PublishOutcome>>) -> Self {
            Self {
                script,
                calls: 0,
                seen_lens: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl PublishTransport for ScriptedTransport {
        async fn publish(&mut self, items: &[TelemetryData]) -> Result<PublishOutcome> {
            self.seen_lens.push(items.len());
            let result = self.script.remove(0);
            self.calls += 1;
            result
        }
    }

    fn items(n: usize) -> Vec<TelemetryData> {
        (0..n)
            .map(|i| TelemetryData {
                gpu_id: format!("g{}", i),
                ts: Some(pulse_proto::timestamp::now()),
                ..Default::default()
            })
            .collect()
    }

    fn test_metrics() -> StreamerMetrics {
        StreamerMetrics::new().unwrap()
    }

    fn test_backoff() -> Backoff {
        // Keep waits tiny so retry tests run fast; the reset invariant
        // is checked against this initial value.
        Backoff::new(Duration::from_millis(1), Duration::from_millis(8))
    }

    #[tokio::test]
    async fn test_drain_partial_accept_then_ok() {
        let mut transport = ScriptedTransport::new(vec![
            Ok(PublishOutcome { accepted: 1, backpressure: true }),
            Ok(PublishOutcome { accepted: 2, backpressure: false }),
        ]);
        let mut backoff = test_backoff();
        let metrics = test_metrics();
        let cancel = CancellationToken::new();

        drain_remaining(&mut transport, items(3), &mut backoff, &metrics, &cancel).await;

        assert_eq!(transport.calls, 2);
        assert_eq!(transport.seen_lens, vec![3, 2]);
        // Backoff is back at its initial value after the OK.
        assert_eq!(backoff.current(), Duration::from_millis(1));
        assert_eq!(metrics.items_published.get(), 3.0);
        assert_eq!(metrics.backpressure.get(), 1.0);
    }

    #[tokio::test]
    async fn test_drain_ok_first_call() {
        let mut transport = ScriptedTransport::new(vec![Ok(PublishOutcome {
            accepted: 3,
            backpressure: false,
        })]);
        let mut backoff = test_backoff();
        let metrics = test_metrics();
        let cancel = CancellationToken::new();

        drain_remaining(&mut transport, items(3), &mut backoff, &metrics, &cancel).await;

        assert_eq!(transport.calls, 1);
        assert_eq!(metrics.items_published.get(), 3.0);
        assert_eq!(metrics.backpressure.get(), 0.0);
    }

    #[tokio::test]
    async fn test_drain_retries_transport_errors() {
        let mut transport = ScriptedTransport::new(vec![
            Err(Error::transport("connection refused")),
            Err(Error::transport("connection refused")),
            Ok(PublishOutcome { accepted: 2, backpressure: false }),
        ]);
        let mut backoff = test_backoff();
        let metrics = test_metrics();
        let cancel = CancellationToken::new();

        drain_remaining(&mut transport, items(2), &mut backoff, &metrics, &cancel).await;

        assert_eq!(transport.calls, 3);
        assert_eq!(metrics.errors.get(), 2.0);
        assert_eq!(metrics.items_published.get(), 2.0);
    }

    #[tokio::test]
    async fn test_drain_zero_accept_backpressure_keeps_remainder() {
        let mut transport = ScriptedTransport::new(vec![
            Ok(PublishOutcome { accepted: 0, backpressure: true }),
            Ok(PublishOutcome { accepted: 2, backpressure: false }),
        ]);
        let mut backoff = test_backoff();
        let metrics = test_metrics();
        let cancel = CancellationToken::new();

        drain_remaining(&mut transport, items(2), &mut backoff, &metrics, &cancel).await;

        assert_eq!(transport.seen_lens, vec![2, 2]);
    }

    #[tokio::test]
    async fn test_drain_exits_on_cancellation() {
        let mut transport = ScriptedTransport::new(vec![Ok(PublishOutcome {
            accepted: 0,
            backpressure: true,
        })]);
        let mut backoff = Backoff::new(Duration::from_secs(60), Duration::from_secs(60));
        let metrics = test_metrics();
        let cancel = CancellationToken::new();

        let drain = drain_remaining(&mut transport, items(1), &mut backoff, &metrics, &cancel);
        tokio::pin!(drain);

        // The drain is parked in its backoff wait; cancellation must
        // release it promptly.
        tokio::select! {
            _ = &mut drain => panic!("drain finished before cancellation"),
            _ = tokio::time::sleep(Duration::from_millis(50)) => cancel.cancel(),
        }
        tokio::time::timeout(Duration::from_secs(1), drain)
            .await
            .expect("drain did not observe cancellation");
    }

    #[tokio::test]
    async fn test_drain_empty_batch_makes_no_calls() {
        let mut transport = ScriptedTransport::new(vec![]);
        let mut backoff = test_backoff();
        let metrics = test_metrics();
        let cancel = CancellationToken::new();

        drain_remaining(&mut transport, Vec::new(), &mut backoff, &metrics, &cancel).await;
        assert_eq!(transport.calls, 0);
    }
}
