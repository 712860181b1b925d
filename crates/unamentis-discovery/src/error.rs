//! Error types for gateway discovery

use thiserror::Error;

/// Result type alias for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Errors that can occur during gateway discovery.
///
/// Only `Cancelled` aborts the tier chain. Every other variant downgrades the
/// current tier to "no result".
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Discovery was cancelled by the caller
    #[error("Discovery was cancelled")]
    Cancelled,

    /// No usable network path
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// An operation exceeded its time budget
    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The candidate did not answer its health endpoint with a 2xx status
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),

    /// mDNS service daemon failed to initialize
    #[error("Failed to initialize mDNS daemon: {0}")]
    MdnsInitFailed(String),

    /// Failed to browse for services
    #[error("Failed to browse for service type '{service_type}': {reason}")]
    BrowseFailed { service_type: String, reason: String },

    /// Cached record could not be read or written
    #[error("Cache error: {0}")]
    Cache(String),

    /// Invalid discovery configuration
    #[error("Invalid discovery configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl DiscoveryError {
    /// Returns true if this error must halt the whole discovery run.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DiscoveryError::Cancelled)
    }

    /// Maps a reqwest failure onto the discovery taxonomy.
    pub(crate) fn from_request(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            DiscoveryError::Timeout { timeout_ms }
        } else if err.is_connect() {
            DiscoveryError::NetworkUnavailable(err.to_string())
        } else {
            DiscoveryError::HealthCheckFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(err: serde_json::Error) -> Self {
        DiscoveryError::Cache(err.to_string())
    }
}
