//! Client configuration.

use std::time::Duration;

use firebird_types::Charset;

use crate::error::Error;

/// Default Firebird server port.
pub const DEFAULT_PORT: u16 = 3050;

/// Default number of rows requested per fetch round-trip.
pub const DEFAULT_FETCH_SIZE: u32 = 200;

/// Default cap on pooled connections per connection string.
pub const DEFAULT_MAX_POOL_SIZE: u32 = 100;

/// Configuration for connecting to a Firebird server.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future releases without breaking semver. Use [`Config::default()`]
/// or [`Config::from_connection_string()`] to construct instances.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct Config {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port (default: 3050).
    pub port: u16,

    /// Database path or alias on the server.
    pub database: String,

    /// User name sent in the DPB.
    pub user: String,

    /// Password sent in the DPB.
    pub password: String,

    /// SQL role.
    pub role: Option<String>,

    /// SQL dialect (default: 3).
    pub dialect: i32,

    /// Connection character set (default: NONE).
    pub charset: Charset,

    /// Network packet size (default: 8192).
    pub packet_size: u32,

    /// Connection timeout (default: 15s).
    pub connect_timeout: Duration,

    /// Maximum age of a pooled connection; zero never expires.
    pub connection_lifetime: Duration,

    /// Whether closed sessions are returned to a pool.
    pub pooling: bool,

    /// Connections the pool opens up front and keeps (default: 0).
    pub min_pool_size: u32,

    /// Most pooled connections for this connection string (default: 100).
    pub max_pool_size: u32,

    /// Rows requested per fetch (default: 200).
    pub fetch_size: u32,

    /// Statement terminator used to split command batches (default: `;`).
    pub batch_terminator: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: String::new(),
            user: String::new(),
            password: String::new(),
            role: None,
            dialect: 3,
            charset: Charset::NONE,
            packet_size: 8192,
            connect_timeout: Duration::from_secs(15),
            connection_lifetime: Duration::ZERO,
            pooling: true,
            min_pool_size: 0,
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            fetch_size: DEFAULT_FETCH_SIZE,
            batch_terminator: ";".to_string(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection string into configuration.
    ///
    /// Keys are case-insensitive:
    /// ```text
    /// DataSource=localhost;Port=3050;Database=/data/employee.fdb;User=SYSDBA;Password=masterkey;Charset=UTF8
    /// ```
    pub fn from_connection_string(conn_str: &str) -> Result<Self, Error> {
        let mut config = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "datasource" | "data source" | "server" | "host" => {
                    // Accept host/port as well.
                    if let Some((host, port)) = value.split_once('/') {
                        config.host = host.to_string();
                        config.port = parse_number(port, "port")?;
                    } else {
                        config.host = value.to_string();
                    }
                }
                "port" => config.port = parse_number(value, "port")?,
                "database" | "initial catalog" => config.database = value.to_string(),
                "user" | "user id" | "userid" | "user name" => config.user = value.to_string(),
                "password" | "user password" => config.password = value.to_string(),
                "role" | "role name" => {
                    config.role = (!value.is_empty()).then(|| value.to_string());
                }
                "dialect" => {
                    let dialect: i32 = parse_number(value, "dialect")?;
                    if !(1..=3).contains(&dialect) {
                        return Err(Error::Config(format!("invalid dialect: {value}")));
                    }
                    config.dialect = dialect;
                }
                "charset" | "character set" => {
                    config.charset = Charset::from_name(value)
                        .ok_or_else(|| Error::Config(format!("unknown charset: {value}")))?;
                }
                "packet size" | "packetsize" => {
                    let size: u32 = parse_number(value, "packet size")?;
                    if !(512..=32767).contains(&size) {
                        return Err(Error::Config(format!("invalid packet size: {value}")));
                    }
                    config.packet_size = size;
                }
                "connection timeout" | "timeout" => {
                    config.connect_timeout = Duration::from_secs(parse_number(value, "timeout")?);
                }
                "connection lifetime" => {
                    config.connection_lifetime =
                        Duration::from_secs(parse_number(value, "connection lifetime")?);
                }
                "pooling" => config.pooling = parse_bool(value)?,
                "min pool size" | "minpoolsize" => {
                    config.min_pool_size = parse_number(value, "min pool size")?;
                }
                "max pool size" | "maxpoolsize" => {
                    let size: u32 = parse_number(value, "max pool size")?;
                    if size == 0 {
                        return Err(Error::Config("max pool size must be positive".into()));
                    }
                    config.max_pool_size = size;
                }
                "fetch size" | "fetchsize" => {
                    let size: u32 = parse_number(value, "fetch size")?;
                    if size == 0 {
                        return Err(Error::Config("fetch size must be positive".into()));
                    }
                    config.fetch_size = size;
                }
                _ => {
                    // Ignore unknown options for forward compatibility
                    tracing::debug!(
                        key = key,
                        value = value,
                        "ignoring unknown connection string option"
                    );
                }
            }
        }

        if config.min_pool_size > config.max_pool_size {
            return Err(Error::Config(format!(
                "min pool size {} exceeds max pool size {}",
                config.min_pool_size, config.max_pool_size
            )));
        }
        Ok(config)
    }

    /// Canonical connection string for this configuration.
    ///
    /// Used as the pool key: two configurations that connect the same way
    /// produce the same string.
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        let mut out = format!(
            "DataSource={};Port={};Database={};User={};Password={};Dialect={};Charset={};Packet Size={};Connection Timeout={};Connection Lifetime={};Pooling={};Min Pool Size={};Max Pool Size={};Fetch Size={}",
            self.host,
            self.port,
            self.database,
            self.user,
            self.password,
            self.dialect,
            self.charset.name(),
            self.packet_size,
            self.connect_timeout.as_secs(),
            self.connection_lifetime.as_secs(),
            self.pooling,
            self.min_pool_size,
            self.max_pool_size,
            self.fetch_size,
        );
        if let Some(role) = &self.role {
            out.push_str(";Role=");
            out.push_str(role);
        }
        out
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database path.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set user name and password.
    #[must_use]
    pub fn credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the SQL role.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Set the SQL dialect.
    #[must_use]
    pub fn dialect(mut self, dialect: i32) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set the connection charset.
    #[must_use]
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the pooled connection lifetime.
    #[must_use]
    pub fn connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.connection_lifetime = lifetime;
        self
    }

    /// Enable or disable pooling.
    #[must_use]
    pub fn pooling(mut self, enabled: bool) -> Self {
        self.pooling = enabled;
        self
    }

    /// Set the minimum and maximum pool size.
    #[must_use]
    pub fn pool_size(mut self, min: u32, max: u32) -> Self {
        self.max_pool_size = max.max(1);
        self.min_pool_size = min.min(self.max_pool_size);
        self
    }

    /// Set the fetch size.
    #[must_use]
    pub fn fetch_size(mut self, size: u32) -> Self {
        self.fetch_size = size.max(1);
        self
    }

    /// Set the batch terminator.
    #[must_use]
    pub fn batch_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.batch_terminator = terminator.into();
        self
    }

    /// `host:port` address to connect to.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, Error> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid {what}: {value}")))
}

fn parse_bool(value: &str) -> Result<bool, Error> {
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") || value == "1" {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("no") || value == "0"
    {
        Ok(false)
    } else {
        Err(Error::Config(format!("invalid boolean: {value}")))
    }
}
