//! Connection lifecycle management.
//!
//! The pool never talks to the server itself. Everything it needs from a
//! physical connection (open it, probe it, reset it, close it) goes through
//! a [`ConnectionManager`].

use std::time::Duration;

use firebird_client::{Config, Result, Session};

use crate::config::PoolLimits;

/// Operations the pool performs on physical connections.
///
/// `#[async_trait]` keeps the trait object-safe so tests can plug in
/// scripted managers.
#[async_trait::async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    /// The physical connection type.
    type Connection: Send + 'static;

    /// Open a new connection for `connection_string`.
    async fn connect(&self, connection_string: &str) -> Result<Self::Connection>;

    /// Open a connection instance supplied by the caller.
    async fn open(&self, connection: &mut Self::Connection) -> Result<()>;

    /// Whether the connection still answers.
    async fn is_alive(&self, connection: &mut Self::Connection) -> bool;

    /// Clean up session state before the connection goes idle.
    async fn reset(&self, connection: &mut Self::Connection) -> Result<()>;

    /// Close the connection.
    async fn disconnect(&self, connection: Self::Connection) -> Result<()>;

    /// Lifetime the connection asked for, if any.
    fn lifetime(&self, _connection: &Self::Connection) -> Option<Duration> {
        None
    }

    /// Sizing requested by `connection_string`, if any.
    fn limits(&self, _connection_string: &str) -> Option<PoolLimits> {
        None
    }
}

/// [`ConnectionManager`] for [`Session`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirebirdManager;

#[async_trait::async_trait]
impl ConnectionManager for FirebirdManager {
    type Connection = Session;

    async fn connect(&self, connection_string: &str) -> Result<Session> {
        let config = Config::from_connection_string(connection_string)?;
        Session::connect(config).await
    }

    async fn open(&self, connection: &mut Session) -> Result<()> {
        connection.open().await
    }

    async fn is_alive(&self, connection: &mut Session) -> bool {
        match connection.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "pooled connection failed liveness probe");
                false
            }
        }
    }

    async fn reset(&self, connection: &mut Session) -> Result<()> {
        connection.reset().await
    }

    async fn disconnect(&self, mut connection: Session) -> Result<()> {
        connection.close().await
    }

    fn lifetime(&self, connection: &Session) -> Option<Duration> {
        Some(connection.config().connection_lifetime).filter(|d| !d.is_zero())
    }

    fn limits(&self, connection_string: &str) -> Option<PoolLimits> {
        let config = Config::from_connection_string(connection_string).ok()?;
        Some(PoolLimits {
            min_size: config.min_pool_size as usize,
            max_size: config.max_pool_size as usize,
            wait_timeout: config.connect_timeout,
        })
    }
}
