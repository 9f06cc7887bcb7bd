//! Error types for artifact retrieval and persistence.
//!
//! "Nothing to find" is not an error: the locator returns `Ok(None)` for a
//! missing workflow, run or artifact. Every variant here is a fault.

use std::path::PathBuf;
use std::time::Duration;

/// Faults raised while talking to the CI platform or touching local disk.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Transport failure (connection refused, timeout, TLS, body read).
    #[error("network error: {message}")]
    Network { message: String },

    /// Token missing, invalid or lacking the `actions:read` scope.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Primary or secondary rate limit hit.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Any other non-success HTTP status.
    #[error("API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// The API answered 2xx but the body did not match the expected shape.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Reading or writing a local file failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The downloaded archive could not be unpacked.
    #[error("failed to extract archive {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },

    /// Extraction succeeded but the expected file is not there.
    #[error("expected file missing after extraction: {}", path.display())]
    MissingFile { path: PathBuf },

    /// Artifact content does not have the canonical shape.
    #[error("invalid artifact: {message}")]
    InvalidArtifact { message: String },

    /// Artifact name cannot be used as a file name.
    #[error("invalid artifact name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl HistoryError {
    /// Shorthand for wrapping an `std::io::Error` with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the client layer may retry the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True for faults originating on the local machine rather than the API.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Archive { .. } | Self::MissingFile { .. }
        )
    }
}

impl From<reqwest::Error> for HistoryError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArtifact {
            message: err.to_string(),
        }
    }
}

/// Result type for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;
