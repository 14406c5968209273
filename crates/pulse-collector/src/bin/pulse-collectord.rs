//! Collector daemon for gpupulse
//!
//! Subscribes to the broker, validates and batches records, and flushes
//! them to storage through a worker pool.

use clap::Parser;
use prometheus::Registry;
use pulse_collector::{run_collector, stream};
use pulse_core::{config::CollectorConfig, logging, signals, Backoff};
use pulse_metrics::{serve_metrics, CollectorMetrics};
use pulse_storage::{MemoryStore, SqliteStore, TelemetryStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Initial delay between reconnect attempts.
const RECONNECT_BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Cap on the reconnect delay.
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "pulse-collectord")]
#[command(about = "Subscribing telemetry consumer for gpupulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker gRPC address
    #[arg(long, value_name = "ADDR")]
    broker: Option<String>,

    /// Consumer group label
    #[arg(long)]
    group: Option<String>,

    /// Collector batch size
    #[arg(long)]
    batch: Option<usize>,

    /// Max flush interval in milliseconds
    #[arg(long)]
    flush_ms: Option<u64>,

    /// Flush worker count
    #[arg(long)]
    workers: Option<usize>,

    /// Metrics HTTP listen address
    #[arg(long, value_name = "ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// SQLite DSN, e.g. sqlite:gpu-telemetry.db (in-memory store when unset)
    #[arg(long, value_name = "DSN")]
    sqlite: Option<String>,

    /// Max time to wait for flush workers on shutdown (ms)
    #[arg(long)]
    shutdown_timeout_ms: Option<u64>,

    /// Exit on stream errors instead of reconnecting
    #[arg(long)]
    no_reconnect: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = CollectorConfig::load(cli.config.as_ref())?;
    if let Some(addr) = cli.broker {
        config.broker_addr = addr;
    }
    if let Some(group) = cli.group {
        config.group = group;
    }
    if let Some(batch) = cli.batch {
        config.batch_size = batch;
    }
    if let Some(flush) = cli.flush_ms {
        config.flush_ms = flush;
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(addr) = cli.metrics_addr {
        config.metrics_addr = addr;
    }
    if let Some(dsn) = cli.sqlite {
        config.sqlite_dsn = Some(dsn);
    }
    if let Some(timeout) = cli.shutdown_timeout_ms {
        config.shutdown_timeout_ms = timeout;
    }
    if cli.no_reconnect {
        config.reconnect = false;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    logging::init(&config.logging)?;

    let store: Arc<dyn TelemetryStore> = match &config.sqlite_dsn {
        Some(dsn) => {
            info!(dsn = %dsn, "using sqlite store");
            Arc::new(SqliteStore::connect(dsn).await?)
        }
        None => {
            info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let registry = Arc::new(Registry::new());
    let metrics = CollectorMetrics::new()?;
    metrics.register(&registry)?;

    let metrics_addr = config.metrics_addr;
    let metrics_registry = registry.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_metrics(metrics_addr, metrics_registry).await {
            tracing::warn!("metrics server error: {}", e);
        }
    });

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            signals::shutdown().await;
            info!("shutdown signal");
            cancel.cancel();
        });
    }

    info!(
        broker = %config.broker_addr,
        group = %config.group,
        workers = config.workers,
        reconnect = config.reconnect,
        "collector starting"
    );

    let broker_addr = config.broker_addr.clone();
    let group = config.group.clone();
    let connect = move || stream::subscribe(broker_addr.clone(), group.clone());

    run_collector(
        &config,
        &metrics,
        store,
        connect,
        Backoff::new(RECONNECT_BACKOFF_INITIAL, RECONNECT_BACKOFF_MAX),
        cancel,
    )
    .await?;

    Ok(())
}
