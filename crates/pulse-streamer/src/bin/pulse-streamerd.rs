//! Streamer daemon for gpupulse
//!
//! Reads telemetry rows from a CSV file and publishes them to the
//! broker in batches with backpressure-aware draining.

use clap::Parser;
use prometheus::Registry;
use pulse_core::{config::StreamerConfig, logging, signals, ReplayMode};
use pulse_metrics::{serve_metrics, StreamerMetrics};
use pulse_streamer::{run_streamer, CsvSource, GrpcPublisher};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "pulse-streamerd")]
#[command(about = "CSV telemetry producer for gpupulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the telemetry CSV file
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// Broker gRPC address
    #[arg(long, value_name = "ADDR")]
    broker: Option<String>,

    /// Batch size for publish
    #[arg(long)]
    batch: Option<usize>,

    /// Flush interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Metrics HTTP listen address
    #[arg(long, value_name = "ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Producer ID
    #[arg(long)]
    producer_id: Option<String>,

    /// Override host ID (default: OS hostname)
    #[arg(long)]
    host_id: Option<String>,

    /// Source replay behavior: once or loop
    #[arg(long)]
    replay: Option<ReplayMode>,

    /// Grace window for the final drain on shutdown (ms)
    #[arg(long)]
    shutdown_grace_ms: Option<u64>,

    /// Log level
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = StreamerConfig::load(cli.config.as_ref())?;
    if let Some(path) = cli.csv {
        config.csv_path = path;
    }
    if let Some(addr) = cli.broker {
        config.broker_addr = addr;
    }
    if let Some(batch) = cli.batch {
        config.batch_size = batch;
    }
    if let Some(tick) = cli.tick_ms {
        config.tick_ms = tick;
    }
    if let Some(addr) = cli.metrics_addr {
        config.metrics_addr = addr;
    }
    if let Some(id) = cli.producer_id {
        config.producer_id = id;
    }
    if let Some(id) = cli.host_id {
        config.host_id = id;
    }
    if let Some(replay) = cli.replay {
        config.replay = replay;
    }
    if let Some(grace) = cli.shutdown_grace_ms {
        config.shutdown_grace_ms = grace;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    logging::init(&config.logging)?;

    if config.host_id.is_empty() {
        config.host_id = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown-host".to_string());
    }

    let registry = Arc::new(Registry::new());
    let metrics = StreamerMetrics::new()?;
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
            info!("shutdown signal, flushing");
            cancel.cancel();
        });
    }

    let source = CsvSource::open(&config.csv_path, config.replay)?;
    let mut transport = GrpcPublisher::connect(config.broker_addr.clone()).await?;

    info!(
        csv = %config.csv_path.display(),
        broker = %config.broker_addr,
        batch = config.batch_size,
        replay = ?config.replay,
        "streamer starting"
    );

    run_streamer(&config, &metrics, &mut transport, source, cancel).await?;
    Ok(())
}
