//! Error handling for gpupulse
//!
//! Provides a unified error type and result alias used across all
//! gpupulse components.

/// Result type alias for gpupulse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for gpupulse
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    InvalidConfiguration(String),

    /// Transport/RPC errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// A record violating the data-model invariants
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Invalid request or parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// The broker (or a queue) is shutting down
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration parsing errors
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create an invalid record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Create an invalid request error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Check if this error is retryable with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Unavailable(_) | Error::Io(_))
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidConfiguration(_) => "configuration",
            Error::Transport(_) => "transport",
            Error::InvalidRecord(_) => "invalid_record",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Storage(_) => "storage",
            Error::Unavailable(_) => "unavailable",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("bad queue capacity");
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert_eq!(err.to_string(), "Configuration error: bad queue capacity");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::config("x").category(), "configuration");
        assert_eq!(Error::storage("x").category(), "storage");
        assert_eq!(Error::transport("x").category(), "transport");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::transport("conn reset").is_retryable());
        assert!(Error::unavailable("shutting down").is_retryable());
        assert!(!Error::invalid_request("no gpu_id").is_retryable());
        assert!(!Error::storage("constraint").is_retryable());
    }
}
