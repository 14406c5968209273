//! Broker daemon for gpupulse
//!
//! Serves the telemetry gRPC service (with a health service) and a
//! Prometheus metrics endpoint.

use clap::Parser;
use prometheus::Registry;
use pulse_broker::TelemetryService;
use pulse_core::{config::BrokerConfig, logging, signals};
use pulse_metrics::{serve_metrics, BrokerMetrics};
use pulse_proto::TelemetryServer;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "pulse-brokerd")]
#[command(about = "Fan-out telemetry broker for gpupulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Broker gRPC listen address
    #[arg(long, value_name = "ADDR")]
    grpc_addr: Option<SocketAddr>,

    /// Broker metrics listen address
    #[arg(long, value_name = "ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Inbound queue capacity
    #[arg(long)]
    queue_cap: Option<usize>,

    /// Per-subscriber buffer capacity
    #[arg(long)]
    sub_buf: Option<usize>,

    /// Log level
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = BrokerConfig::load(cli.config.as_ref())?;
    if let Some(addr) = cli.grpc_addr {
        config.grpc_addr = addr;
    }
    if let Some(addr) = cli.metrics_addr {
        config.metrics_addr = addr;
    }
    if let Some(cap) = cli.queue_cap {
        config.queue_cap = cap;
    }
    if let Some(buf) = cli.sub_buf {
        config.sub_buf = buf;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    logging::init(&config.logging)?;

    let registry = Arc::new(Registry::new());
    let metrics = BrokerMetrics::new()?;
    metrics.register(&registry)?;

    let metrics_addr = config.metrics_addr;
    let metrics_registry = registry.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_metrics(metrics_addr, metrics_registry).await {
            tracing::warn!("metrics server error: {}", e);
        }
    });

    let service = TelemetryService::start(config.queue_cap, config.sub_buf, metrics);

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<TelemetryServer<TelemetryService>>()
        .await;

    info!(
        addr = %config.grpc_addr,
        queue_cap = config.queue_cap,
        sub_buf = config.sub_buf,
        "broker listening"
    );

    tonic::transport::Server::builder()
        .add_service(health_service)
        .add_service(TelemetryServer::new(service))
        .serve_with_shutdown(config.grpc_addr, signals::shutdown())
        .await?;

    info!("broker stopped");
    Ok(())
}
