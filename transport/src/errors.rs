//! Error types for the agent transport
//!
//! Every failure reaches the caller as a typed error. Connectivity kinds are
//! retried against other endpoints within a single call; authorization
//! failures and configuration problems are not.

use thiserror::Error;

/// Outcome of a failed send, resolution or breaker check
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Logical server URL cannot be used (no host, unsupported form)
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Hostname resolution failed or returned no addresses
    #[error("Unknown host '{host}': {reason}")]
    UnknownHost { host: String, reason: String },

    /// No response from the endpoint (refused, timed out, body unreadable)
    #[error("Connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// Server signalled it is not reachable (503/404)
    #[error("Server {endpoint} not reachable (HTTP {status})")]
    NotReachable { endpoint: String, status: u16 },

    /// Server denied the agent; retrying elsewhere will not help
    #[error("Agent not authorized by server {endpoint}")]
    Unauthorized { endpoint: String },

    /// Breaker open, or no endpoint currently available
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl TransportError {
    /// Whether another endpoint may succeed where this one failed
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            TransportError::Connection { .. } | TransportError::NotReachable { .. }
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TransportError::Unauthorized { .. })
    }

    pub fn is_service_unavailable(&self) -> bool {
        matches!(self, TransportError::ServiceUnavailable)
    }
}

/// Configuration error variants
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// HTTP client could not be built from the configuration
    #[error("Failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },
}
