//! Configuration for gpupulse components
//!
//! Each process owns a serde config struct with defaults and a
//! `validate()` method. Values are layered from (lowest to highest
//! precedence): built-in defaults, an optional config file, environment
//! variables with the `GPUPULSE_` prefix, and command-line flags applied
//! by the binary itself. Nothing here is process-global; the structs are
//! passed explicitly to the subsystem constructors.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::Result;

/// Layer defaults, an optional file, and `GPUPULSE_`-prefixed
/// environment variables into a component config.
fn load_layered<T>(defaults: &T, file: Option<&PathBuf>) -> Result<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(defaults)?);

    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path.clone()).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GPUPULSE")
            .separator("__")
            .try_parsing(true),
    );

    let parsed: T = builder.build()?.try_deserialize()?;
    Ok(parsed)
}

/// Logging configuration shared by all daemon binaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text or json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Broker process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// gRPC listen address
    pub grpc_addr: SocketAddr,

    /// Metrics HTTP listen address
    pub metrics_addr: SocketAddr,

    /// Inbound queue capacity
    pub queue_cap: usize,

    /// Per-subscriber buffer capacity
    pub sub_buf: usize,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: "0.0.0.0:9000".parse().unwrap(),
            metrics_addr: "0.0.0.0:9001".parse().unwrap(),
            queue_cap: 10_000,
            sub_buf: 256,
            logging: LoggingConfig::default(),
        }
    }
}

impl BrokerConfig {
    pub fn load(file: Option<&PathBuf>) -> Result<Self> {
        let cfg = load_layered(&Self::default(), file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_cap == 0 {
            return Err(crate::Error::config("queue_cap must be > 0"));
        }
        if self.sub_buf == 0 {
            return Err(crate::Error::config("sub_buf must be > 0"));
        }
        Ok(())
    }
}

/// Source replay behavior for the streamer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    /// Read the source once and exit when exhausted
    Once,
    /// Rewind and replay the source forever
    Loop,
}

impl std::str::FromStr for ReplayMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "once" => Ok(ReplayMode::Once),
            "loop" => Ok(ReplayMode::Loop),
            other => Err(crate::Error::config(format!(
                "replay must be 'once' or 'loop', got '{}'",
                other
            ))),
        }
    }
}

/// Streamer process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamerConfig {
    /// Path to the telemetry CSV file
    pub csv_path: PathBuf,

    /// Broker gRPC address
    pub broker_addr: String,

    /// Batch size for publish
    pub batch_size: usize,

    /// Flush interval in milliseconds
    pub tick_ms: u64,

    /// Metrics HTTP listen address
    pub metrics_addr: SocketAddr,

    /// Producer identity stamped on published records
    pub producer_id: String,

    /// Host identity; defaults to the OS hostname when empty
    pub host_id: String,

    /// Source replay behavior
    pub replay: ReplayMode,

    /// Initial publish backoff in milliseconds
    pub backoff_initial_ms: u64,

    /// Maximum publish backoff in milliseconds
    pub backoff_max_ms: u64,

    /// Grace window for draining the final batch on shutdown
    pub shutdown_grace_ms: u64,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("dcgm_metrics.csv"),
            broker_addr: "http://127.0.0.1:9000".to_string(),
            batch_size: 50,
            tick_ms: 500,
            metrics_addr: "0.0.0.0:9101".parse().unwrap(),
            producer_id: "streamer-1".to_string(),
            host_id: String::new(),
            replay: ReplayMode::Once,
            backoff_initial_ms: 100,
            backoff_max_ms: 5_000,
            shutdown_grace_ms: 5_000,
            logging: LoggingConfig::default(),
        }
    }
}

impl StreamerConfig {
    pub fn load(file: Option<&PathBuf>) -> Result<Self> {
        let cfg = load_layered(&Self::default(), file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(crate::Error::config("batch_size must be > 0"));
        }
        if self.tick_ms == 0 {
            return Err(crate::Error::config("tick_ms must be > 0"));
        }
        if self.backoff_initial_ms == 0 || self.backoff_max_ms < self.backoff_initial_ms {
            return Err(crate::Error::config(
                "backoff_initial_ms must be > 0 and <= backoff_max_ms",
            ));
        }
        Ok(())
    }
}

/// Collector process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Broker gRPC address
    pub broker_addr: String,

    /// Consumer group label (informational only)
    pub group: String,

    /// Collector batch size
    pub batch_size: usize,

    /// Maximum flush interval in milliseconds
    pub flush_ms: u64,

    /// Flush worker count
    pub workers: usize,

    /// Metrics HTTP listen address
    pub metrics_addr: SocketAddr,

    /// SQLite DSN; in-memory store when absent
    pub sqlite_dsn: Option<String>,

    /// Max time to wait for flush workers on shutdown (ms)
    pub shutdown_timeout_ms: u64,

    /// Re-subscribe with backoff after stream failures
    pub reconnect: bool,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            broker_addr: "http://127.0.0.1:9000".to_string(),
            group: "default".to_string(),
            batch_size: 500,
            flush_ms: 1_000,
            workers: 4,
            metrics_addr: "0.0.0.0:9102".parse().unwrap(),
            sqlite_dsn: None,
            shutdown_timeout_ms: 5_000,
            reconnect: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl CollectorConfig {
    pub fn load(file: Option<&PathBuf>) -> Result<Self> {
        let cfg = load_layered(&Self::default(), file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(crate::Error::config("batch_size must be > 0"));
        }
        if self.workers == 0 {
            return Err(crate::Error::config("workers must be > 0"));
        }
        if self.flush_ms == 0 {
            return Err(crate::Error::config("flush_ms must be > 0"));
        }
        Ok(())
    }
}

/// Gateway process configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP listen address
    pub http_addr: SocketAddr,

    /// SQLite DSN; in-memory store when absent
    pub sqlite_dsn: Option<String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".parse().unwrap(),
            sqlite_dsn: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn load(file: Option<&PathBuf>) -> Result<Self> {
        load_layered(&Self::default(), file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(BrokerConfig::default().validate().is_ok());
        assert!(StreamerConfig::default().validate().is_ok());
        assert!(CollectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_broker_validation() {
        let mut cfg = BrokerConfig::default();
        cfg.queue_cap = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = BrokerConfig::default();
        cfg.sub_buf = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_streamer_backoff_validation() {
        let mut cfg = StreamerConfig::default();
        cfg.backoff_max_ms = 50; // below initial
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_replay_mode_parsing() {
        assert_eq!("once".parse::<ReplayMode>().unwrap(), ReplayMode::Once);
        assert_eq!("LOOP".parse::<ReplayMode>().unwrap(), ReplayMode::Loop);
        assert!("forever".parse::<ReplayMode>().is_err());
    }

    #[test]
    fn test_collector_defaults() {
        let cfg = CollectorConfig::default();
        assert_eq!(cfg.batch_size, 500);
        assert_eq!(cfg.workers, 4);
        assert!(cfg.reconnect);
        assert!(cfg.sqlite_dsn.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let cfg = BrokerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: BrokerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
