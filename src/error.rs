//! # Error Types
//!
//! Custom error types for Telemetry Relay using `thiserror`.

use thiserror::Error;

/// Main error type for Telemetry Relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Batch could not be encoded as JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Upload URL is not an absolute http/https URI
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// No response was received (connection, TLS or protocol failure)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Endpoint answered outside the 200-299 range
    #[error("Endpoint returned HTTP {0}")]
    HttpStatus(u16),

    /// A sample source had nothing to report
    #[error("{0} source unavailable")]
    SourceUnavailable(&'static str),
}

impl RelayError {
    /// Whether an upload that failed with this error may succeed if repeated.
    ///
    /// Transport failures and 5xx responses are transient; everything else
    /// (4xx, bad payloads, bad config) will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Transport(_) => true,
            RelayError::HttpStatus(code) => (500..600).contains(code),
            _ => false,
        }
    }
}

/// Result type alias for Telemetry Relay
pub type Result<T> = std::result::Result<T, RelayError>;
