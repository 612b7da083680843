//! Pool configuration.

use std::time::Duration;

/// Default interval between sweeps of the idle set.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Default time a checkout waits for a free slot.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Sizing of the connections sharing one connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    /// Connections opened up front and never swept.
    pub min_size: usize,
    /// Most connections, checked out and idle together.
    pub max_size: usize,
    /// How long a checkout waits for a slot when `max_size` is reached.
    pub wait_timeout: Duration,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: usize::MAX,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// Configuration for the connection pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use the builder
/// pattern methods or [`Default::default()`] to construct instances.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PoolConfig {
    /// How often idle connections are checked for expiry.
    pub sweep_interval: Duration,

    /// Lifetime used when a connection does not carry its own.
    ///
    /// Zero means idle connections never expire.
    pub default_lifetime: Duration,

    /// Most idle connections kept; extra ones are closed by the sweep,
    /// oldest first. `None` keeps all of them.
    pub max_idle: Option<usize>,

    /// Limits for connection strings that do not carry their own.
    pub limits: PoolLimits,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            default_lifetime: Duration::ZERO,
            max_idle: None,
            limits: PoolLimits::default(),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sweep interval.
    #[must_use]
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the lifetime for connections that do not specify one.
    #[must_use]
    pub fn default_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    /// Cap the number of idle connections.
    #[must_use]
    pub fn max_idle(mut self, count: usize) -> Self {
        self.max_idle = Some(count);
        self
    }

    /// Set the default minimum and maximum connections per string.
    #[must_use]
    pub fn size(mut self, min: usize, max: usize) -> Self {
        self.limits.min_size = min;
        self.limits.max_size = max;
        self
    }

    /// Set how long a checkout waits for a free slot.
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.limits.wait_timeout = timeout;
        self
    }

    /// Validate the configuration.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), crate::error::PoolError> {
        if self.sweep_interval.is_zero() {
            return Err(crate::error::PoolError::Configuration(
                "sweep_interval must be greater than 0".into(),
            ));
        }
        if self.limits.max_size == 0 || self.limits.min_size > self.limits.max_size {
            return Err(crate::error::PoolError::Configuration(format!(
                "invalid pool size: min {} max {}",
                self.limits.min_size, self.limits.max_size
            )));
        }
        Ok(())
    }
}
