//! Pool error types.

use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Opening a physical connection failed; the client error is passed
    /// through unchanged.
    #[error(transparent)]
    Connect(#[from] firebird_client::Error),

    /// Disconnecting an evicted connection failed.
    #[error("Error closing database connection.")]
    Eviction(#[source] firebird_client::Error),

    /// No connection slot freed up within the wait timeout.
    #[error("Timeout exceeded.")]
    Timeout,

    /// The pool has been shut down.
    #[error("pool is closed")]
    PoolClosed,

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}

impl PoolError {
    /// Underlying client error, if any.
    #[must_use]
    pub fn client_error(&self) -> Option<&firebird_client::Error> {
        match self {
            Self::Connect(e) | Self::Eviction(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_message() {
        let err = PoolError::Eviction(firebird_client::Error::ConnectionClosed);
        assert_eq!(err.to_string(), "Error closing database connection.");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_connect_is_transparent() {
        let inner = firebird_client::Error::Config("bad port".into());
        let message = inner.to_string();
        let err = PoolError::from(inner);
        assert_eq!(err.to_string(), message);
        assert!(err.client_error().is_some());
        assert!(PoolError::PoolClosed.client_error().is_none());
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(PoolError::Timeout.to_string(), "Timeout exceeded.");
    }
}
