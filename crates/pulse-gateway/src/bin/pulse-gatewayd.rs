//! Gateway daemon for gpupulse
//!
//! Serves the read-only HTTP API over the configured telemetry store.

use clap::Parser;
use pulse_core::{config::GatewayConfig, logging, signals};
use pulse_gateway::router;
use pulse_storage::{MemoryStore, SqliteStore, TelemetryStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser)]
#[command(name = "pulse-gatewayd")]
#[command(about = "Read-only HTTP API over gpupulse telemetry storage")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long, value_name = "ADDR")]
    http_addr: Option<SocketAddr>,

    /// SQLite DSN, e.g. sqlite:gpu-telemetry.db (in-memory store when unset)
    #[arg(long, value_name = "DSN")]
    sqlite: Option<String>,

    /// Log level
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::load(cli.config.as_ref())?;
    if let Some(addr) = cli.http_addr {
        config.http_addr = addr;
    }
    if let Some(dsn) = cli.sqlite {
        config.sqlite_dsn = Some(dsn);
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

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

    let app = router(store);
    let listener = TcpListener::bind(config.http_addr).await?;
    info!(addr = %config.http_addr, "gateway listening with /api/v1 endpoints");

    axum::serve(listener, app)
        .with_graceful_shutdown(signals::shutdown())
        .await?;

    info!("gateway stopped");
    Ok(())
}
