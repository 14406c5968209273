//! Per-component metric handle structs
//!
//! One struct per process, constructed once at startup and registered
//! against the injected registry. Names and namespaces are part of the
//! stable metrics surface; do not rename without updating dashboards.

use prometheus::{Counter, Gauge, Histogram, HistogramOpts, Opts, Registry};

use crate::NAMESPACE;

fn counter(subsystem: &str, name: &str, help: &str) -> prometheus::Result<Counter> {
    Counter::with_opts(Opts::new(name, help).namespace(NAMESPACE).subsystem(subsystem))
}

fn gauge(subsystem: &str, name: &str, help: &str) -> prometheus::Result<Gauge> {
    Gauge::with_opts(Opts::new(name, help).namespace(NAMESPACE).subsystem(subsystem))
}

fn histogram(subsystem: &str, name: &str, help: &str) -> prometheus::Result<Histogram> {
    Histogram::with_opts(
        HistogramOpts::new(name, help)
            .namespace(NAMESPACE)
            .subsystem(subsystem),
    )
}

/// Broker-side metrics
#[derive(Debug, Clone)]
pub struct BrokerMetrics {
    /// Messages accepted into the inbound queue
    pub enqueued: Counter,

    /// Messages delivered to subscribers
    pub delivered: Counter,

    /// Publish calls that hit a full inbound queue
    pub backpressure_events: Counter,

    /// Messages requeued after a subscriber send failure
    pub requeued: Counter,

    /// Current depth of the inbound queue
    pub queue_depth: Gauge,

    /// Current number of active subscribers
    pub subscribers: Gauge,
}

impl BrokerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            enqueued: counter(
                "broker",
                "messages_enqueued_total",
                "Total messages accepted into the broker queue.",
            )?,
            delivered: counter(
                "broker",
                "messages_delivered_total",
                "Total messages delivered to subscribers.",
            )?,
            backpressure_events: counter(
                "broker",
                "backpressure_events_total",
                "Total backpressure events when queue was full.",
            )?,
            requeued: counter(
                "broker",
                "messages_requeued_total",
                "Total messages requeued due to subscriber send errors.",
            )?,
            queue_depth: gauge("broker", "queue_depth", "Current depth of the inbound queue.")?,
            subscribers: gauge("broker", "subscribers", "Current number of active subscribers.")?,
        })
    }

    /// Register all metrics with the given registry
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.enqueued.clone()))?;
        registry.register(Box::new(self.delivered.clone()))?;
        registry.register(Box::new(self.backpressure_events.clone()))?;
        registry.register(Box::new(self.requeued.clone()))?;
        registry.register(Box::new(self.queue_depth.clone()))?;
        registry.register(Box::new(self.subscribers.clone()))?;
        Ok(())
    }
}

/// Streamer-side metrics
#[derive(Debug, Clone)]
pub struct StreamerMetrics {
    /// CSV rows read from the source
    pub rows_ingested: Counter,

    /// Telemetry items accepted by the broker
    pub items_published: Counter,

    /// Backpressure responses from the broker
    pub backpressure: Counter,

    /// Transport errors during publish
    pub errors: Counter,

    /// Latency of PublishBatch calls
    pub publish_latency: Histogram,

    /// Items buffered before publish
    pub batch_pending: Gauge,
}

impl StreamerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            rows_ingested: counter("streamer", "rows_ingested_total", "CSV rows read.")?,
            items_published: counter(
                "streamer",
                "items_published_total",
                "Telemetry items published.",
            )?,
            backpressure: counter(
                "streamer",
                "backpressure_total",
                "Backpressure responses from broker.",
            )?,
            errors: counter("streamer", "errors_total", "Errors encountered.")?,
            publish_latency: histogram(
                "streamer",
                "publish_latency_seconds",
                "Latency of PublishBatch calls.",
            )?,
            batch_pending: gauge(
                "streamer",
                "batch_pending",
                "Current items buffered before publish.",
            )?,
        })
    }

    /// Register all metrics with the given registry
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.rows_ingested.clone()))?;
        registry.register(Box::new(self.items_published.clone()))?;
        registry.register(Box::new(self.backpressure.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        registry.register(Box::new(self.publish_latency.clone()))?;
        registry.register(Box::new(self.batch_pending.clone()))?;
        Ok(())
    }
}

/// Collector-side metrics
#[derive(Debug, Clone)]
pub struct CollectorMetrics {
    /// Messages received from the broker
    pub received: Counter,

    /// Messages added to a batch
    pub batched: Counter,

    /// Messages flushed to storage
    pub flushed: Counter,

    /// Messages dropped by validation
    pub dropped_invalid: Counter,

    /// Errors during flush to storage
    pub flush_errors: Counter,

    /// Current in-memory batch size
    pub backlog: Gauge,

    /// Latency of batch flush to storage
    pub flush_latency: Histogram,
}

impl CollectorMetrics {
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            received: counter(
                "collector",
                "messages_received_total",
                "Messages received from broker.",
            )?,
            batched: counter(
                "collector",
                "messages_batched_total",
                "Messages added to a batch.",
            )?,
            flushed: counter(
                "collector",
                "messages_flushed_total",
                "Messages flushed to storage.",
            )?,
            dropped_invalid: counter(
                "collector",
                "messages_dropped_invalid_total",
                "Messages dropped due to validation.",
            )?,
            flush_errors: counter(
                "collector",
                "flush_errors_total",
                "Errors during flush to storage.",
            )?,
            backlog: gauge("collector", "backlog", "Current in-memory batch size.")?,
            flush_latency: histogram(
                "collector",
                "flush_latency_seconds",
                "Latency of batch flush to storage.",
            )?,
        })
    }

    /// Register all metrics with the given registry
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.received.clone()))?;
        registry.register(Box::new(self.batched.clone()))?;
        registry.register(Box::new(self.flushed.clone()))?;
        registry.register(Box::new(self.dropped_invalid.clone()))?;
        registry.register(Box::new(self.flush_errors.clone()))?;
        registry.register(Box::new(self.backlog.clone()))?;
        registry.register(Box::new(self.flush_latency.clone()))?;
        Ok(())
    }
}
