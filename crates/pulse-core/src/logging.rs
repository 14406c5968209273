//! Logging bootstrap for the gpupulse daemons

use crate::config::LoggingConfig;
use crate::Result;

/// Initialize the tracing subscriber for a daemon process.
///
/// `RUST_LOG` takes precedence over the configured level when set.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match config.format.as_str() {
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }

    Ok(())
}
