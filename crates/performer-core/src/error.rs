//! Error types for the performer library.
//!
//! Gate outcomes (`Cancelled`, `Timeout`, `OperationFailed`) are modelled by
//! [`crate::gate::GateOutcome`]; this enum covers everything an operation,
//! a connectivity source or the configuration layer can fail with.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the performer library.
#[derive(Debug, Error)]
pub enum PerformerError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Timed out after {0:?} waiting for network connectivity")]
    Timeout(Duration),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    // Payload errors
    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for performer operations.
pub type Result<T> = std::result::Result<T, PerformerError>;

impl From<std::io::Error> for PerformerError {
    fn from(err: std::io::Error) -> Self {
        PerformerError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PerformerError {
    fn from(err: serde_json::Error) -> Self {
        PerformerError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<url::ParseError> for PerformerError {
    fn from(err: url::ParseError) -> Self {
        PerformerError::Config {
            message: format!("Invalid URL: {}", err),
        }
    }
}

impl From<reqwest::Error> for PerformerError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return PerformerError::Http {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        PerformerError::Network {
            message: err.to_string(),
            cause: std::error::Error::source(&err).map(|s| s.to_string()),
        }
    }
}

impl PerformerError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PerformerError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether a caller wrapping the gate could reasonably try again.
    ///
    /// The library itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            PerformerError::Network { .. } | PerformerError::Timeout(_) => true,
            PerformerError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
