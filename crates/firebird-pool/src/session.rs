//! Opening sessions according to the `Pooling` connection-string key.

use std::ops::{Deref, DerefMut};

use firebird_client::{Config, Session};

use crate::error::PoolError;
use crate::lifecycle::FirebirdManager;
use crate::pool::{ConnectionPool, PooledConnection};

/// A session opened with [`ConnectionPool::open`] or [`crate::open`].
///
/// Dereferences to the [`Session`] either way.
#[derive(Debug)]
pub enum PooledSession {
    /// Checked out of a pool; closing returns it there.
    Pooled(PooledConnection<FirebirdManager>),
    /// Opened directly because pooling is off; closing disconnects it.
    Direct(Session),
}

impl PooledSession {
    /// Whether the session belongs to a pool.
    #[must_use]
    pub fn is_pooled(&self) -> bool {
        matches!(self, Self::Pooled(_))
    }

    /// Return a pooled session to `pool`, or disconnect a direct one.
    pub async fn close(self, pool: &ConnectionPool<FirebirdManager>) -> Result<(), PoolError> {
        match self {
            Self::Pooled(connection) => pool.free_connection(connection).await,
            Self::Direct(mut session) => {
                session.close().await?;
                Ok(())
            }
        }
    }
}

impl Deref for PooledSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        match self {
            Self::Pooled(connection) => connection,
            Self::Direct(session) => session,
        }
    }
}

impl DerefMut for PooledSession {
    fn deref_mut(&mut self) -> &mut Session {
        match self {
            Self::Pooled(connection) => connection,
            Self::Direct(session) => session,
        }
    }
}

impl ConnectionPool<FirebirdManager> {
    /// Open a session for `connection_string`.
    ///
    /// With `Pooling=true` (the default) the session is checked out of this
    /// pool; with `Pooling=false` a new session is connected directly and
    /// the pool is not involved.
    pub async fn open(&self, connection_string: &str) -> Result<PooledSession, PoolError> {
        let config = Config::from_connection_string(connection_string)?;
        if config.pooling {
            Ok(PooledSession::Pooled(
                self.get_connection(connection_string).await?,
            ))
        } else {
            tracing::debug!("pooling disabled; connecting directly");
            Ok(PooledSession::Direct(Session::connect(config).await?))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;

    #[tokio::test]
    async fn test_invalid_string_fails_before_checkout() {
        let pool = ConnectionPool::new(FirebirdManager, PoolConfig::new()).unwrap();
        let err = pool.open("Database=a.fdb;Pooling=maybe").await.unwrap_err();
        assert!(matches!(
            err.client_error(),
            Some(firebird_client::Error::Config(_))
        ));
        assert_eq!(pool.status().in_use, 0);
    }
}
