//! Error types for connection management.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for connection-manager operations.
pub type ConnResult<T> = Result<T, ConnError>;

/// Boxed driver-level error carried by [`ConnError::Query`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while resolving, opening, or using a managed connection.
#[derive(Debug, Error)]
pub enum ConnError {
    /// Malformed endpoint URI, disallowed scheme, or inconsistent TLS parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Dial, DNS, authentication, or version-probe failure.
    #[error("failed to create connection to {address}: {reason}")]
    Connection { address: String, reason: String },

    /// The server reported a version below the supported floor.
    #[error("PostgreSQL version {version} at {address} is not supported (minimum {minimum})")]
    UnsupportedVersion {
        address: String,
        version: i32,
        minimum: i32,
    },

    /// A bounded query exceeded its deadline.
    #[error("query execution timeout {0:?} exceeded")]
    Timeout(Duration),

    /// A named custom query is absent from the lookup table.
    #[error("query {0:?} not found")]
    QueryNotFound(String),

    /// A query failed on an established connection.
    #[error("failed to execute query on {address}: {source}")]
    Query {
        address: String,
        #[source]
        source: BoxError,
    },
}

impl ConnError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn connection(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Connection {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn query(address: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Query {
            address: address.into(),
            source: source.into(),
        }
    }

    /// Whether this error is a deadline expiry rather than a server failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
