//! Telemetry broker service
//!
//! One bounded inbound queue feeds a single dispatcher task that routes
//! each record to exactly one subscriber, round-robin from a rotating
//! cursor. Publishes never block: the first item that does not fit ends
//! the batch with a BACKPRESSURE response carrying the accepted prefix
//! length. A subscriber whose stream fails is unregistered and its
//! in-flight record is requeued non-blockingly; if the inbound queue is
//! full at that moment the record is dropped.

use pulse_metrics::BrokerMetrics;
use pulse_proto::{
    PublishResponse, SubscriptionRequest, Telemetry, TelemetryBatch, TelemetryData,
    STATUS_BACKPRESSURE, STATUS_OK,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info};
use uuid::Uuid;

/// Sleep when no subscriber is registered.
const NO_SUBSCRIBER_BACKOFF: Duration = Duration::from_millis(5);

/// Sleep when every subscriber buffer is full.
const ALL_FULL_BACKOFF: Duration = Duration::from_millis(1);

/// Queue depth sampling interval (~5 Hz).
const QUEUE_DEPTH_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// Buffer between a subscriber's forward task and the gRPC stream.
const STREAM_BUFFER: usize = 16;

#[derive(Debug, Clone)]
struct SubscriberHandle {
    id: Uuid,
    tx: mpsc::Sender<TelemetryData>,
}

type SubscriberRegistry = Arc<Mutex<Vec<SubscriberHandle>>>;

/// The broker's gRPC service.
///
/// Cheap to clone; all clones share the inbound queue, the subscriber
/// registry, and the metric handles.
#[derive(Debug, Clone)]
pub struct TelemetryService {
    inbound_tx: mpsc::Sender<TelemetryData>,
    registry: SubscriberRegistry,
    metrics: BrokerMetrics,
    sub_buf: usize,
}

/// The dispatcher half of a broker, consuming the inbound queue.
///
/// Separated from [`TelemetryService::new`] so tests can exercise the
/// publish path without a running dispatcher draining the queue.
pub struct Dispatcher {
    inbound_rx: mpsc::Receiver<TelemetryData>,
    registry: SubscriberRegistry,
}

impl TelemetryService {
    /// Create a service and its (not yet running) dispatcher.
    pub fn new(queue_cap: usize, sub_buf: usize, metrics: BrokerMetrics) -> (Self, Dispatcher) {
        let (inbound_tx, inbound_rx) = mpsc::channel(queue_cap);
        let registry: SubscriberRegistry = Arc::new(Mutex::new(Vec::new()));
        let service = Self {
            inbound_tx,
            registry: registry.clone(),
            metrics,
            sub_buf,
        };
        let dispatcher = Dispatcher {
            inbound_rx,
            registry,
        };
        (service, dispatcher)
    }

    /// Create a fully running broker: dispatcher plus queue-depth
    /// sampler tasks are spawned onto the current runtime.
    pub fn start(queue_cap: usize, sub_buf: usize, metrics: BrokerMetrics) -> Self {
        let (service, dispatcher) = Self::new(queue_cap, sub_buf, metrics);
        tokio::spawn(dispatcher.run());
        tokio::spawn(service.clone().sample_queue_depth());
        service
    }

    /// Non-blocking batch enqueue with the accepted-prefix contract.
    pub fn publish(&self, items: Vec<TelemetryData>) -> Result<PublishResponse, Status> {
        let mut accepted: i64 = 0;
        for item in items {
            match self.inbound_tx.try_send(item) {
                Ok(()) => {
                    accepted += 1;
                    self.metrics.enqueued.inc();
                }
                Err(TrySendError::Full(_)) => {
                    self.metrics.backpressure_events.inc();
                    debug!(accepted, depth = self.queue_depth(), "backpressure");
                    return Ok(PublishResponse {
                        accepted,
                        status: STATUS_BACKPRESSURE.to_string(),
                    });
                }
                Err(TrySendError::Closed(_)) => {
                    return Err(Status::unavailable("broker is shutting down"));
                }
            }
        }
        Ok(PublishResponse {
            accepted,
            status: STATUS_OK.to_string(),
        })
    }

    /// Register a new subscriber and return its buffer receiver.
    pub async fn add_subscriber(&self) -> (Uuid, mpsc::Receiver<TelemetryData>) {
        let (tx, rx) = mpsc::channel(self.sub_buf);
        let id = Uuid::new_v4();
        let mut subs = self.registry.lock().await;
        subs.push(SubscriberHandle { id, tx });
        self.metrics.subscribers.set(subs.len() as f64);
        (id, rx)
    }

    /// Unregister a subscriber by id.
    pub async fn remove_subscriber(&self, id: Uuid) {
        let mut subs = self.registry.lock().await;
        subs.retain(|s| s.id != id);
        self.metrics.subscribers.set(subs.len() as f64);
        debug!(%id, remain = subs.len(), "subscriber removed");
    }

    /// Number of active subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.registry.lock().await.len()
    }

    fn queue_depth(&self) -> usize {
        self.inbound_tx.max_capacity() - self.inbound_tx.capacity()
    }

    async fn sample_queue_depth(self) {
        let mut interval = tokio::time::interval(QUEUE_DEPTH_SAMPLE_INTERVAL);
        loop {
            interval.tick().await;
            self.metrics.queue_depth.set(self.queue_depth() as f64);
        }
    }

    /// Drain a subscriber's buffer into its outbound stream.
    ///
    /// Runs until the client disconnects or the buffer closes. On a send
    /// failure the in-flight record is handed back to the inbound queue;
    /// a full queue at that point drops the record.
    pub async fn forward(
        &self,
        id: Uuid,
        mut rx: mpsc::Receiver<TelemetryData>,
        out: mpsc::Sender<Result<TelemetryData, Status>>,
    ) {
        loop {
            tokio::select! {
                biased;
                maybe = rx.recv() => {
                    let Some(msg) = maybe else { break };
                    if let Err(send_err) = out.send(Ok(msg)).await {
                        self.remove_subscriber(id).await;
                        if let Ok(msg) = send_err.0 {
                            match self.inbound_tx.try_send(msg) {
                                Ok(()) => {
                                    self.metrics.requeued.inc();
                                    debug!(%id, "requeued after send error");
                                }
                                Err(_) => {
                                    // Queue full (or closing): drop on the
                                    // floor to avoid deadlock.
                                    debug!(%id, "dropping record, inbound queue full at requeue");
                                }
                            }
                        }
                        return;
                    }
                    self.metrics.delivered.inc();
                }
                _ = out.closed() => {
                    // Clean stream end; nothing in flight.
                    self.remove_subscriber(id).await;
                    return;
                }
            }
        }
        self.remove_subscriber(id).await;
    }
}

impl Dispatcher {
    /// Route inbound records to subscribers until the queue closes.
    ///
    /// The round-robin cursor lives here: a single writer, so fairness
    /// does not depend on cross-task cursor races.
    pub async fn run(mut self) {
        let mut cursor: usize = 0;
        while let Some(msg) = self.inbound_rx.recv().await {
            let mut msg = Some(msg);
            loop {
                let subs: Vec<SubscriberHandle> = self.registry.lock().await.clone();
                if subs.is_empty() {
                    tokio::time::sleep(NO_SUBSCRIBER_BACKOFF).await;
                    continue;
                }
                let mut delivered = false;
                for i in 0..subs.len() {
                    let idx = (cursor + i) % subs.len();
                    match subs[idx].tx.try_send(msg.take().expect("msg present for retry")) {
                        Ok(()) => {
                            cursor = (idx + 1) % subs.len();
                            delivered = true;
                            break;
                        }
                        Err(TrySendError::Full(m)) | Err(TrySendError::Closed(m)) => {
                            // Target full or already gone, try the next one.
                            msg = Some(m);
                        }
                    }
                }
                if delivered {
                    break;
                }
                tokio::time::sleep(ALL_FULL_BACKOFF).await;
            }
        }
        // Queue closed: broker is shutting down.
        info!("dispatcher exiting, inbound queue closed");
    }
}

#[tonic::async_trait]
impl Telemetry for TelemetryService {
    async fn publish_batch(
        &self,
        request: Request<TelemetryBatch>,
    ) -> Result<Response<PublishResponse>, Status> {
        let batch = request.into_inner();
        let response = self.publish(batch.items)?;
        Ok(Response::new(response))
    }

    type SubscribeStream = ReceiverStream<Result<TelemetryData, Status>>;

    async fn subscribe(
        &self,
        request: Request<SubscriptionRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let group = request.into_inner().group;
        let (id, rx) = self.add_subscriber().await;
        info!(%id, %group, "subscriber added");

        let (tx, out_rx) = mpsc::channel(STREAM_BUFFER);
        let service = self.clone();
        tokio::spawn(async move {
            service.forward(id, rx, tx).await;
        });

        Ok(Response::new(ReceiverStream::new(out_rx)))
    }
}
