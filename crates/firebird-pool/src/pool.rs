//! Connection pool implementation.
//!
//! Connections are keyed by connection string. A connection is either
//! locked (checked out and owned by a [`PooledConnection`] guard) or
//! unlocked (idle and owned by the pool); both sets live under one
//! mutex that is never held across an await.
//!
//! Each connection string has [`PoolLimits`]: a minimum opened up front
//! and kept by the sweep, and a maximum that makes further checkouts wait
//! for a connection to come back.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{PoolConfig, PoolLimits};
use crate::error::PoolError;
use crate::lifecycle::ConnectionManager;

/// An idle connection.
struct IdleEntry<C> {
    id: u64,
    connection_string: String,
    lifetime: Duration,
    created: Instant,
    connection: C,
}

impl<C> IdleEntry<C> {
    fn is_expired(&self, now: Instant) -> bool {
        !self.lifetime.is_zero() && now.duration_since(self.created) >= self.lifetime
    }
}

/// Bookkeeping for a checked-out (or still opening) connection.
struct LockedEntry {
    connection_string: String,
    lifetime: Duration,
    generation: u64,
}

struct PoolState<C> {
    locked: HashMap<u64, LockedEntry>,
    unlocked: Vec<IdleEntry<C>>,
    limits: HashMap<String, PoolLimits>,
    /// Bumped by `clear`; locked entries of older generations are closed
    /// on check-in.
    generation: u64,
    closed: bool,
}

impl<C> PoolState<C> {
    /// Connections of `connection_string`, checked out, opening and idle.
    fn size_of(&self, connection_string: &str) -> usize {
        self.locked
            .values()
            .filter(|e| e.connection_string == connection_string)
            .count()
            + self
                .unlocked
                .iter()
                .filter(|e| e.connection_string == connection_string)
                .count()
    }

    fn min_size(&self, connection_string: &str) -> usize {
        self.limits
            .get(connection_string)
            .map_or(0, |limits| limits.min_size)
    }

    /// Reserve a slot for a connection about to be opened.
    fn reserve(&mut self, id: u64, connection_string: &str) {
        let generation = self.generation;
        self.locked.insert(
            id,
            LockedEntry {
                connection_string: connection_string.to_string(),
                lifetime: Duration::ZERO,
                generation,
            },
        );
    }
}

/// Outcome of one pass over the pool state during checkout.
enum Step<C> {
    Reuse(IdleEntry<C>),
    Open(u64),
    Wait,
}

struct PoolInner<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    state: Mutex<PoolState<M::Connection>>,
    next_id: AtomicU64,
    /// Signalled whenever a slot or an idle connection may have freed up.
    released: Notify,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// A pool of physical connections shared by connection string.
///
/// The pool is cheap to clone; clones share the same sets and sweep task.
///
/// # Example
///
/// ```rust,ignore
/// use firebird_pool::{ConnectionPool, FirebirdManager, PoolConfig};
///
/// let pool = ConnectionPool::new(FirebirdManager, PoolConfig::new())?;
/// let mut session = pool.get_connection(conn_str).await?;
/// // use the session...
/// pool.free_connection(session).await?;
/// pool.shutdown().await?;
/// ```
pub struct ConnectionPool<M: ConnectionManager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ConnectionManager> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ConnectionManager> std::fmt::Debug for ConnectionPool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

impl<M: ConnectionManager> ConnectionPool<M> {
    /// Create a pool and start its background sweep.
    ///
    /// The sweep needs a tokio runtime; outside one the pool still works
    /// but idle connections only expire on checkout.
    pub fn new(manager: M, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = Arc::new(PoolInner {
            manager,
            config,
            state: Mutex::new(PoolState {
                locked: HashMap::new(),
                unlocked: Vec::new(),
                limits: HashMap::new(),
                generation: 0,
                closed: false,
            }),
            next_id: AtomicU64::new(1),
            released: Notify::new(),
            shutdown_tx,
            sweeper: Mutex::new(None),
        });

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let task = handle.spawn(sweep_loop(
                    Arc::downgrade(&inner),
                    inner.config.sweep_interval,
                    shutdown_rx,
                ));
                *inner.sweeper.lock() = Some(task);
            }
            Err(_) => {
                tracing::warn!("no tokio runtime; connection pool sweep not started");
            }
        }

        Ok(Self { inner })
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// The connection manager.
    #[must_use]
    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    /// Current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            idle: state.unlocked.len(),
            in_use: state.locked.len(),
        }
    }

    /// Check if the pool has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Check out a connection for `connection_string`.
    ///
    /// An idle connection with the same string is reused when it is still
    /// within its lifetime and answers a liveness probe; otherwise a new
    /// physical connection is opened.
    pub async fn get_connection(
        &self,
        connection_string: &str,
    ) -> Result<PooledConnection<M>, PoolError> {
        self.check_out(connection_string, None).await
    }

    /// Like [`ConnectionPool::get_connection`], but when no idle connection
    /// matches, `existing` is opened and pooled instead of a new one.
    pub async fn get_connection_with(
        &self,
        connection_string: &str,
        existing: M::Connection,
    ) -> Result<PooledConnection<M>, PoolError> {
        self.check_out(connection_string, Some(existing)).await
    }

    /// Return a connection to the pool.
    ///
    /// Session state is reset first; a connection that fails the reset is
    /// closed instead of pooled.
    pub async fn free_connection(&self, mut connection: PooledConnection<M>) -> Result<(), PoolError> {
        let Some(mut physical) = connection.connection.take() else {
            return Ok(());
        };
        let id = connection.id;
        match self.inner.manager.reset(&mut physical).await {
            Ok(()) => {
                self.inner.check_in(id, physical);
                Ok(())
            }
            Err(e) => {
                tracing::debug!(id, error = %e, "reset failed; closing pooled connection");
                self.inner.release_slot(id);
                self.inner.close_connection(id, physical).await
            }
        }
    }

    async fn check_out(
        &self,
        connection_string: &str,
        existing: Option<M::Connection>,
    ) -> Result<PooledConnection<M>, PoolError> {
        let inner = &self.inner;
        let limits = inner.prepare(connection_string).await?;
        let deadline = deadline_after(limits.wait_timeout);

        let id = loop {
            let mut released = std::pin::pin!(inner.released.notified());
            released.as_mut().enable();

            let step = {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(PoolError::PoolClosed);
                }
                let position = state
                    .unlocked
                    .iter()
                    .position(|e| e.connection_string == connection_string);
                if let Some(index) = position {
                    let entry = state.unlocked.remove(index);
                    let generation = state.generation;
                    state.locked.insert(
                        entry.id,
                        LockedEntry {
                            connection_string: entry.connection_string.clone(),
                            lifetime: entry.lifetime,
                            generation,
                        },
                    );
                    Step::Reuse(entry)
                } else if state.size_of(connection_string) < limits.max_size {
                    let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
                    state.reserve(id, connection_string);
                    Step::Open(id)
                } else {
                    Step::Wait
                }
            };

            match step {
                Step::Reuse(mut entry) => {
                    // The candidate is locked, so the probe can run without the mutex.
                    let usable = !entry.is_expired(Instant::now())
                        && inner.manager.is_alive(&mut entry.connection).await;
                    if usable {
                        tracing::debug!(id = entry.id, "reusing pooled connection");
                        return Ok(PooledConnection::new(inner, entry.id, entry.connection));
                    }

                    tracing::debug!(id = entry.id, "evicting stale pooled connection");
                    inner.release_slot(entry.id);
                    if let Err(e) = inner.close_connection(entry.id, entry.connection).await {
                        tracing::warn!(error = %e, "failed to evict pooled connection");
                    }
                }
                Step::Open(id) => break id,
                Step::Wait => {
                    tracing::debug!(max = limits.max_size, "pool exhausted; waiting for a connection");
                    if tokio::time::timeout_at(deadline, released).await.is_err() {
                        tracing::debug!(max = limits.max_size, "timed out waiting for a pooled connection");
                        return Err(PoolError::Timeout);
                    }
                }
            }
        };

        let opened = match existing {
            Some(mut connection) => inner
                .manager
                .open(&mut connection)
                .await
                .map(|()| connection),
            None => inner.manager.connect(connection_string).await,
        };
        let connection = match opened {
            Ok(connection) => connection,
            Err(e) => {
                inner.release_slot(id);
                return Err(e.into());
            }
        };
        let lifetime = inner.lifetime_of(&connection);

        let closed = {
            let mut state = inner.state.lock();
            if let Some(entry) = state.locked.get_mut(&id) {
                entry.lifetime = lifetime;
            }
            state.closed
        };
        if closed {
            inner.release_slot(id);
            let _ = inner.close_connection(id, connection).await;
            return Err(PoolError::PoolClosed);
        }
        tracing::debug!(id, lifetime_secs = lifetime.as_secs(), "opened pooled connection");
        Ok(PooledConnection::new(inner, id, connection))
    }

    /// Close idle connections past their lifetime, and the oldest ones
    /// beyond the idle cap.
    ///
    /// Returns how many connections were closed. Runs on the sweep
    /// interval; exposed so callers can trigger it directly.
    pub async fn sweep(&self) -> usize {
        self.inner.sweep().await
    }

    /// Close every idle connection and retire the checked-out ones.
    ///
    /// Connections checked out before the call are closed when they come
    /// back instead of going idle. The next checkout of a connection string
    /// opens its minimum again.
    pub async fn clear(&self) -> Result<(), PoolError> {
        let idle = {
            let mut state = self.inner.state.lock();
            state.generation += 1;
            state.limits.clear();
            std::mem::take(&mut state.unlocked)
        };
        self.inner.released.notify_waiters();

        let count = idle.len();
        let mut first_error = None;
        for entry in idle {
            if let Err(e) = self.inner.close_connection(entry.id, entry.connection).await {
                tracing::warn!(error = %e, "failed to close idle connection on clear");
                first_error.get_or_insert(e);
            }
        }
        tracing::debug!(closed = count, "connection pool cleared");
        first_error.map_or(Ok(()), Err)
    }

    /// Stop the sweep and close every idle connection.
    ///
    /// Checked-out connections are closed when their guards are returned
    /// or dropped. The first close failure is reported after all idle
    /// connections have been attempted.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        let idle = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            std::mem::take(&mut state.unlocked)
        };
        let _ = self.inner.shutdown_tx.send(true);
        self.inner.released.notify_waiters();
        let task = self.inner.sweeper.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }

        let count = idle.len();
        let mut first_error = None;
        for entry in idle {
            if let Err(e) = self.inner.close_connection(entry.id, entry.connection).await {
                tracing::warn!(error = %e, "failed to close idle connection on shutdown");
                first_error.get_or_insert(e);
            }
        }
        tracing::info!(closed = count, "connection pool shut down");
        first_error.map_or(Ok(()), Err)
    }
}

impl<M: ConnectionManager> PoolInner<M> {
    fn check_in(self: &Arc<Self>, id: u64, connection: M::Connection) {
        let mut state = self.state.lock();
        let Some(locked) = state.locked.remove(&id) else {
            tracing::warn!(id, "checked in a connection the pool does not know");
            return;
        };
        if state.closed || locked.generation != state.generation {
            drop(state);
            self.released.notify_waiters();
            self.close_detached(id, connection);
            return;
        }
        state.unlocked.push(IdleEntry {
            id,
            connection_string: locked.connection_string,
            lifetime: locked.lifetime,
            created: Instant::now(),
            connection,
        });
        tracing::debug!(id, idle = state.unlocked.len(), "connection checked in");
        drop(state);
        self.released.notify_waiters();
    }

    /// Forget a locked entry and wake waiting checkouts.
    fn release_slot(&self, id: u64) {
        self.state.lock().locked.remove(&id);
        self.released.notify_waiters();
    }

    fn lifetime_of(&self, connection: &M::Connection) -> Duration {
        self.manager
            .lifetime(connection)
            .unwrap_or(self.config.default_lifetime)
    }

    /// Limits of `connection_string`; the first checkout of a string opens
    /// its minimum number of connections.
    async fn prepare(self: &Arc<Self>, connection_string: &str) -> Result<PoolLimits, PoolError> {
        let (limits, first) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed);
            }
            match state.limits.get(connection_string) {
                Some(limits) => (*limits, false),
                None => {
                    let limits = self
                        .manager
                        .limits(connection_string)
                        .unwrap_or(self.config.limits);
                    state.limits.insert(connection_string.to_string(), limits);
                    (limits, true)
                }
            }
        };
        if first && limits.min_size > 0 {
            self.fill(connection_string, limits.min_size).await?;
        }
        Ok(limits)
    }

    /// Open idle connections until `connection_string` has `min_size`.
    async fn fill(self: &Arc<Self>, connection_string: &str, min_size: usize) -> Result<(), PoolError> {
        let mut opened = 0usize;
        loop {
            let id = {
                let mut state = self.state.lock();
                if state.closed || state.size_of(connection_string) >= min_size {
                    break;
                }
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                state.reserve(id, connection_string);
                id
            };
            let connection = match self.manager.connect(connection_string).await {
                Ok(connection) => connection,
                Err(e) => {
                    self.release_slot(id);
                    return Err(e.into());
                }
            };
            let lifetime = self.lifetime_of(&connection);
            if let Some(entry) = self.state.lock().locked.get_mut(&id) {
                entry.lifetime = lifetime;
            }
            self.check_in(id, connection);
            opened += 1;
        }
        if opened > 0 {
            tracing::debug!(opened, min_size, "opened minimum pool connections");
        }
        Ok(())
    }

    async fn close_connection(&self, id: u64, connection: M::Connection) -> Result<(), PoolError> {
        self.manager
            .disconnect(connection)
            .await
            .map_err(PoolError::Eviction)?;
        tracing::debug!(id, "pooled connection closed");
        Ok(())
    }

    /// Close a connection without awaiting, from a synchronous context.
    fn close_detached(self: &Arc<Self>, id: u64, connection: M::Connection) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(id, "no tokio runtime; pooled connection dropped without disconnect");
            return;
        };
        let pool = Arc::clone(self);
        handle.spawn(async move {
            if let Err(e) = pool.manager.disconnect(connection).await {
                tracing::warn!(id, error = %PoolError::Eviction(e), "failed to close pooled connection");
            }
        });
    }

    async fn sweep(&self) -> usize {
        let evicted = {
            let mut state = self.state.lock();
            let now = Instant::now();
            let mut sizes: HashMap<String, usize> = HashMap::new();
            for string in state
                .locked
                .values()
                .map(|e| &e.connection_string)
                .chain(state.unlocked.iter().map(|e| &e.connection_string))
            {
                *sizes.entry(string.clone()).or_default() += 1;
            }

            let mut idle = std::mem::take(&mut state.unlocked);
            idle.sort_by_key(|e| e.created);
            let mut surplus = self
                .config
                .max_idle
                .map_or(0, |max| idle.len().saturating_sub(max));
            let mut keep = Vec::with_capacity(idle.len());
            let mut evicted = Vec::new();
            // Oldest first; no string drops below its minimum.
            for entry in idle {
                let min = state.min_size(&entry.connection_string);
                let size = sizes.entry(entry.connection_string.clone()).or_default();
                let expired = entry.is_expired(now);
                if *size > min && (expired || surplus > 0) {
                    *size -= 1;
                    surplus = surplus.saturating_sub(1);
                    evicted.push(entry);
                } else {
                    keep.push(entry);
                }
            }
            state.unlocked = keep;
            evicted
        };

        let count = evicted.len();
        for entry in evicted {
            if let Err(e) = self.close_connection(entry.id, entry.connection).await {
                tracing::warn!(id = entry.id, error = %e, "sweep failed to evict connection");
            }
        }
        if count > 0 {
            tracing::debug!(evicted = count, "pool sweep complete");
        }
        count
    }
}

/// `timeout` from now, capped for timeouts too large to represent.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365))
}

async fn sweep_loop<M: ConnectionManager>(
    pool: Weak<PoolInner<M>>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(inner) = pool.upgrade() else { break };
                inner.sweep().await;
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    tracing::trace!("pool sweep stopped");
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub idle: usize,
    /// Number of connections currently checked out.
    pub in_use: usize,
}

/// A connection retrieved from the pool.
///
/// Dereferences to the physical connection. When dropped the connection
/// goes back to the idle set as is; use
/// [`ConnectionPool::free_connection`] to reset it first.
pub struct PooledConnection<M: ConnectionManager> {
    pool: Weak<PoolInner<M>>,
    id: u64,
    connection: Option<M::Connection>,
}

impl<M: ConnectionManager> PooledConnection<M> {
    fn new(pool: &Arc<PoolInner<M>>, id: u64, connection: M::Connection) -> Self {
        Self {
            pool: Arc::downgrade(pool),
            id,
            connection: Some(connection),
        }
    }

    /// Pool-assigned identifier of the physical connection.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Take the connection out of the pool.
    ///
    /// The pool forgets it; closing it becomes the caller's job.
    pub fn detach(mut self) -> Option<M::Connection> {
        if let Some(pool) = self.pool.upgrade() {
            pool.release_slot(self.id);
        }
        self.connection.take()
    }
}

impl<M: ConnectionManager> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        match self.connection.as_ref() {
            Some(connection) => connection,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.connection.as_mut() {
            Some(connection) => connection,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<M: ConnectionManager> std::fmt::Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").field("id", &self.id).finish()
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        match self.pool.upgrade() {
            Some(pool) => {
                tracing::trace!(id = self.id, "returning connection to pool");
                pool.check_in(self.id, connection);
            }
            None => tracing::debug!(id = self.id, "pool gone; dropping connection"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use firebird_client::Error;

    #[derive(Debug)]
    struct TestConn {
        serial: usize,
        alive: Arc<AtomicBool>,
        opened: bool,
    }

    #[derive(Default)]
    struct TestManager {
        connects: AtomicUsize,
        opens: AtomicUsize,
        probes: AtomicUsize,
        disconnects: AtomicUsize,
        fail_connect: AtomicBool,
        fail_disconnect: AtomicBool,
        fail_reset: AtomicBool,
        lifetime: Option<Duration>,
    }

    impl TestManager {
        fn with_lifetime(lifetime: Duration) -> Self {
            Self {
                lifetime: Some(lifetime),
                ..Self::default()
            }
        }
    }

    #[async_trait::async_trait]
    impl ConnectionManager for TestManager {
        type Connection = TestConn;

        async fn connect(&self, _connection_string: &str) -> firebird_client::Result<TestConn> {
            if self.fail_connect.load(Ordering::SeqCst) {
                return Err(Error::Connection("refused".into()));
            }
            let serial = self.connects.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TestConn {
                serial,
                alive: Arc::new(AtomicBool::new(true)),
                opened: true,
            })
        }

        async fn open(&self, connection: &mut TestConn) -> firebird_client::Result<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            connection.opened = true;
            Ok(())
        }

        async fn is_alive(&self, connection: &mut TestConn) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            connection.alive.load(Ordering::SeqCst)
        }

        async fn reset(&self, _connection: &mut TestConn) -> firebird_client::Result<()> {
            if self.fail_reset.load(Ordering::SeqCst) {
                return Err(Error::ConnectionClosed);
            }
            Ok(())
        }

        async fn disconnect(&self, _connection: TestConn) -> firebird_client::Result<()> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            if self.fail_disconnect.load(Ordering::SeqCst) {
                return Err(Error::ConnectionClosed);
            }
            Ok(())
        }

        fn lifetime(&self, _connection: &TestConn) -> Option<Duration> {
            self.lifetime
        }
    }

    const CS: &str = "Database=a.fdb";

    fn pool(manager: TestManager, config: PoolConfig) -> ConnectionPool<TestManager> {
        ConnectionPool::new(manager, config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reuse_before_expiry() {
        let pool = pool(
            TestManager::with_lifetime(Duration::from_secs(60)),
            PoolConfig::new(),
        );

        let first = pool.get_connection(CS).await.unwrap();
        let id = first.id();
        assert_eq!(first.serial, 1);
        assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 1 });
        drop(first);
        assert_eq!(pool.status(), PoolStatus { idle: 1, in_use: 0 });

        tokio::time::advance(Duration::from_secs(30)).await;
        let second = pool.get_connection(CS).await.unwrap();
        assert_eq!(second.id(), id);
        assert_eq!(second.serial, 1);
        assert_eq!(pool.manager().connects.load(Ordering::SeqCst), 1);
        assert_eq!(pool.manager().probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_connection_replaced_on_checkout() {
        let pool = pool(
            TestManager::with_lifetime(Duration::from_secs(5)),
            PoolConfig::new().sweep_interval(Duration::from_secs(3600)),
        );

        drop(pool.get_connection(CS).await.unwrap());
        tokio::time::advance(Duration::from_secs(6)).await;

        let fresh = pool.get_connection(CS).await.unwrap();
        assert_eq!(fresh.serial, 2);
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 1);
        // Expired candidates are not probed.
        assert_eq!(pool.manager().probes.load(Ordering::SeqCst), 0);
        assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_in_restarts_lifetime() {
        let pool = pool(
            TestManager::with_lifetime(Duration::from_secs(10)),
            PoolConfig::new().sweep_interval(Duration::from_secs(3600)),
        );

        let conn = pool.get_connection(CS).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        drop(conn);

        tokio::time::advance(Duration::from_secs(5)).await;
        let again = pool.get_connection(CS).await.unwrap();
        assert_eq!(again.serial, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_connection_evicted_on_checkout() {
        let pool = pool(TestManager::default(), PoolConfig::new());

        let conn = pool.get_connection(CS).await.unwrap();
        conn.alive.store(false, Ordering::SeqCst);
        drop(conn);

        let fresh = pool.get_connection(CS).await.unwrap();
        assert_eq!(fresh.serial, 2);
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_strings_are_not_shared() {
        let pool = pool(TestManager::default(), PoolConfig::new());

        drop(pool.get_connection(CS).await.unwrap());
        let other = pool.get_connection("Database=b.fdb").await.unwrap();
        assert_eq!(other.serial, 2);
        assert_eq!(pool.status(), PoolStatus { idle: 1, in_use: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_propagates() {
        let manager = TestManager::default();
        manager.fail_connect.store(true, Ordering::SeqCst);
        let pool = pool(manager, PoolConfig::new());

        let err = pool.get_connection(CS).await.unwrap_err();
        assert!(matches!(err, PoolError::Connect(Error::Connection(_))));
        assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_instance_is_opened() {
        let pool = pool(TestManager::default(), PoolConfig::new());
        let existing = TestConn {
            serial: 99,
            alive: Arc::new(AtomicBool::new(true)),
            opened: false,
        };

        let conn = pool.get_connection_with(CS, existing).await.unwrap();
        assert_eq!(conn.serial, 99);
        assert!(conn.opened);
        assert_eq!(pool.manager().opens.load(Ordering::SeqCst), 1);
        assert_eq!(pool.manager().connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_evicts_expired() {
        let pool = pool(
            TestManager::with_lifetime(Duration::from_secs(25)),
            PoolConfig::new(),
        );

        drop(pool.get_connection(CS).await.unwrap());
        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(pool.status().idle, 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(pool.status().idle, 0);
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_lifetime_never_expires() {
        let pool = pool(TestManager::default(), PoolConfig::new());

        drop(pool.get_connection(CS).await.unwrap());
        tokio::time::sleep(Duration::from_secs(10_000)).await;
        assert_eq!(pool.status().idle, 1);
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_survives_eviction_failures() {
        let manager = TestManager::with_lifetime(Duration::from_secs(5));
        manager.fail_disconnect.store(true, Ordering::SeqCst);
        let pool = pool(manager, PoolConfig::new());

        drop(pool.get_connection(CS).await.unwrap());
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(pool.status().idle, 0);
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 1);

        // The loop keeps running after a failed eviction.
        drop(pool.get_connection(CS).await.unwrap());
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(pool.status().idle, 0);
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_idle_closes_oldest() {
        let pool = pool(
            TestManager::default(),
            PoolConfig::new().sweep_interval(Duration::from_secs(3600)).max_idle(1),
        );

        let a = pool.get_connection(CS).await.unwrap();
        let b = pool.get_connection(CS).await.unwrap();
        let c = pool.get_connection(CS).await.unwrap();
        drop(a);
        tokio::time::advance(Duration::from_secs(1)).await;
        drop(b);
        tokio::time::advance(Duration::from_secs(1)).await;
        drop(c);

        assert_eq!(pool.sweep().await, 2);
        let kept = pool.get_connection(CS).await.unwrap();
        assert_eq!(kept.serial, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_connection_resets_or_closes() {
        let pool = pool(TestManager::default(), PoolConfig::new());

        let conn = pool.get_connection(CS).await.unwrap();
        pool.free_connection(conn).await.unwrap();
        assert_eq!(pool.status(), PoolStatus { idle: 1, in_use: 0 });

        pool.manager().fail_reset.store(true, Ordering::SeqCst);
        let conn = pool.get_connection(CS).await.unwrap();
        pool.free_connection(conn).await.unwrap();
        assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 0 });
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_leaves_pool() {
        let pool = pool(TestManager::default(), PoolConfig::new());

        let conn = pool.get_connection(CS).await.unwrap();
        let raw = conn.detach().unwrap();
        assert_eq!(raw.serial, 1);
        assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown() {
        let pool = pool(TestManager::default(), PoolConfig::new());

        let held = pool.get_connection(CS).await.unwrap();
        drop(pool.get_connection("Database=b.fdb").await.unwrap());
        assert_eq!(pool.status(), PoolStatus { idle: 1, in_use: 1 });

        tokio_test::assert_ok!(pool.shutdown().await);
        assert!(pool.is_closed());
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 1);
        assert!(matches!(
            pool.get_connection(CS).await.unwrap_err(),
            PoolError::PoolClosed
        ));

        // Connections returned after shutdown are closed, not pooled.
        drop(held);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 2);
        assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 0 });

        // A second shutdown is a no-op.
        tokio_test::assert_ok!(pool.shutdown().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_close_failure() {
        let manager = TestManager::default();
        manager.fail_disconnect.store(true, Ordering::SeqCst);
        let pool = pool(manager, PoolConfig::new());

        drop(pool.get_connection(CS).await.unwrap());
        let err = pool.shutdown().await.unwrap_err();
        assert_eq!(err.to_string(), "Error closing database connection.");
    }

    #[tokio::test]
    async fn test_concurrent_checkouts() {
        let pool = pool(TestManager::default(), PoolConfig::new());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    let conn = pool.get_connection(CS).await.unwrap();
                    tokio::task::yield_now().await;
                    drop(conn);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let status = pool.status();
        assert_eq!(status.in_use, 0);
        assert!(status.idle >= 1 && status.idle <= 8);
        assert_eq!(
            pool.manager().connects.load(Ordering::SeqCst),
            status.idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_size_opened_up_front_and_kept() {
        let pool = pool(
            TestManager::with_lifetime(Duration::from_secs(5)),
            PoolConfig::new()
                .sweep_interval(Duration::from_secs(3600))
                .size(2, 10),
        );

        let a = pool.get_connection(CS).await.unwrap();
        assert_eq!(pool.manager().connects.load(Ordering::SeqCst), 2);
        assert_eq!(pool.status(), PoolStatus { idle: 1, in_use: 1 });

        let b = pool.get_connection(CS).await.unwrap();
        let c = pool.get_connection(CS).await.unwrap();
        assert_eq!(pool.manager().connects.load(Ordering::SeqCst), 3);
        drop((a, b, c));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(pool.sweep().await, 1);
        assert_eq!(pool.status(), PoolStatus { idle: 2, in_use: 0 });
        assert_eq!(pool.sweep().await, 0);
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_size_times_out() {
        let pool = pool(
            TestManager::default(),
            PoolConfig::new().size(0, 1).wait_timeout(Duration::from_secs(2)),
        );

        let _held = pool.get_connection(CS).await.unwrap();
        let started = Instant::now();
        let err = pool.get_connection(CS).await.unwrap_err();
        assert!(matches!(err, PoolError::Timeout));
        assert_eq!(err.to_string(), "Timeout exceeded.");
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(pool.manager().connects.load(Ordering::SeqCst), 1);

        // Other connection strings have their own slots.
        assert!(pool.get_connection("Database=b.fdb").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_size_waiter_gets_returned_connection() {
        let pool = pool(
            TestManager::default(),
            PoolConfig::new().size(0, 1).wait_timeout(Duration::from_secs(30)),
        );

        let held = pool.get_connection(CS).await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.get_connection(CS).await.map(|c| c.serial) })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap().unwrap(), 1);
        assert_eq!(pool.manager().connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_closes_idle_and_retires_checked_out() {
        let pool = pool(TestManager::default(), PoolConfig::new());

        let held = pool.get_connection(CS).await.unwrap();
        drop(pool.get_connection(CS).await.unwrap());
        assert_eq!(pool.status(), PoolStatus { idle: 1, in_use: 1 });

        tokio_test::assert_ok!(pool.clear().await);
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 1 });

        drop(held);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(pool.manager().disconnects.load(Ordering::SeqCst), 2);
        assert_eq!(pool.status(), PoolStatus { idle: 0, in_use: 0 });

        // The pool stays usable.
        let fresh = pool.get_connection(CS).await.unwrap();
        assert_eq!(fresh.serial, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_reopens_minimum_on_next_checkout() {
        let pool = pool(TestManager::default(), PoolConfig::new().size(1, 4));

        drop(pool.get_connection(CS).await.unwrap());
        assert_eq!(pool.manager().connects.load(Ordering::SeqCst), 1);

        pool.clear().await.unwrap();
        assert_eq!(pool.status().idle, 0);

        drop(pool.get_connection(CS).await.unwrap());
        assert_eq!(pool.manager().connects.load(Ordering::SeqCst), 2);
        assert_eq!(pool.status(), PoolStatus { idle: 1, in_use: 0 });
    }

    #[test]
    fn test_pool_without_runtime() {
        let pool = pool(TestManager::default(), PoolConfig::new());
        assert!(!pool.is_closed());
        assert!(pool.inner.sweeper.lock().is_none());
    }
}
