//! # firebird-pool
//!
//! Connection pool for Firebird sessions with lifetime-based eviction.
//!
//! Idle connections are shared by connection string. A background sweep
//! closes idle connections that outlived their `Connection Lifetime`, and
//! a checkout probes a candidate before handing it out.
//!
//! ## Features
//!
//! - Reuse keyed on connection-string equality
//! - `Min Pool Size` opened up front and kept; `Max Pool Size` makes
//!   checkouts wait up to `Connection Timeout`
//! - Liveness probe on checkout, run outside the pool lock
//! - Cancellable background sweep with explicit [`ConnectionPool::shutdown`]
//! - Process-wide pool through [`global`], created on first use
//! - [`open`] honors the `Pooling` key, connecting directly when it is off
//!
//! ## Example
//!
//! ```rust,ignore
//! use firebird_client::Command;
//!
//! let conn_str = "DataSource=localhost;Database=/data/app.fdb;User=SYSDBA;Password=masterkey;Connection Lifetime=60";
//!
//! let mut session = firebird_pool::get_connection(conn_str).await?;
//! Command::new("UPDATE COUNTERS SET HITS = HITS + 1")
//!     .execute_non_query(&mut session)
//!     .await?;
//! firebird_pool::free_connection(session).await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod session;

pub use config::{PoolConfig, PoolLimits};
pub use error::PoolError;
pub use lifecycle::{ConnectionManager, FirebirdManager};
pub use pool::{ConnectionPool, PoolStatus, PooledConnection};
pub use session::PooledSession;

use once_cell::sync::OnceCell;

static GLOBAL: OnceCell<ConnectionPool<FirebirdManager>> = OnceCell::new();

/// The process-wide pool of [`firebird_client::Session`]s.
///
/// Created with the default [`PoolConfig`] on first use. Its sweep starts
/// only when the first call happens inside a tokio runtime.
pub fn global() -> Result<&'static ConnectionPool<FirebirdManager>, PoolError> {
    GLOBAL.get_or_try_init(|| ConnectionPool::new(FirebirdManager, PoolConfig::default()))
}

/// Check out a session for `connection_string` from the global pool.
pub async fn get_connection(
    connection_string: &str,
) -> Result<PooledConnection<FirebirdManager>, PoolError> {
    global()?.get_connection(connection_string).await
}

/// Check out a session from the global pool, opening `existing` when no
/// idle session matches.
pub async fn get_connection_with(
    connection_string: &str,
    existing: firebird_client::Session,
) -> Result<PooledConnection<FirebirdManager>, PoolError> {
    global()?
        .get_connection_with(connection_string, existing)
        .await
}

/// Open a session, through the global pool unless the connection string
/// says `Pooling=false`.
///
/// Close it with [`close`].
pub async fn open(connection_string: &str) -> Result<PooledSession, PoolError> {
    global()?.open(connection_string).await
}

/// Close a session from [`open`]: pooled sessions go back to the global
/// pool, direct ones are disconnected.
pub async fn close(session: PooledSession) -> Result<(), PoolError> {
    session.close(global()?).await
}

/// Return a session to the global pool.
pub async fn free_connection(
    connection: PooledConnection<FirebirdManager>,
) -> Result<(), PoolError> {
    global()?.free_connection(connection).await
}

/// Close the global pool's idle sessions and retire the checked-out ones.
pub async fn clear_pool() -> Result<(), PoolError> {
    global()?.clear().await
}
