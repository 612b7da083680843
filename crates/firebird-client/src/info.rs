//! Typed database information.

use gds_protocol::InfoValue;
use gds_protocol::isc::info;

/// Items requested by [`Session::database_info`](crate::Session::database_info).
pub const DATABASE_INFO_ITEMS: [u8; 13] = [
    info::ISC_VERSION,
    info::FIREBIRD_VERSION,
    info::BASE_LEVEL,
    info::IMPLEMENTATION,
    info::DB_CLASS,
    info::PAGE_SIZE,
    info::NUM_BUFFERS,
    info::ODS_VERSION,
    info::ODS_MINOR_VERSION,
    info::DB_SQL_DIALECT,
    info::FORCED_WRITES,
    info::DB_READ_ONLY,
    info::NEXT_TRANSACTION,
];

/// Server and database properties.
///
/// Fields the server did not report keep their default value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct DatabaseInfo {
    /// `isc_info_isc_version` string.
    pub server_version: String,
    /// Firebird server version string.
    pub firebird_version: String,
    /// Base level as `"major.minor"`.
    pub base_level: String,
    /// Implementation bytes.
    pub implementation: Vec<i64>,
    /// "CLASSIC SERVER" or "SUPER SERVER".
    pub server_class: String,
    /// Page size in bytes.
    pub page_size: i64,
    /// Page buffers in the cache.
    pub num_buffers: i64,
    /// On-disk structure major version.
    pub ods_version: i64,
    /// On-disk structure minor version.
    pub ods_minor_version: i64,
    /// Database SQL dialect.
    pub sql_dialect: i64,
    /// Synchronous writes.
    pub forced_writes: bool,
    /// Database opened read-only.
    pub read_only: bool,
    /// Next transaction number.
    pub next_transaction: i64,
}

impl DatabaseInfo {
    /// Build from decoded `(item, value)` pairs, ignoring unknown items.
    #[must_use]
    pub fn from_items(items: Vec<(u8, InfoValue)>) -> Self {
        let mut out = Self::default();
        for (item, value) in items {
            match (item, value) {
                (info::ISC_VERSION, InfoValue::Text(s)) => out.server_version = s,
                (info::FIREBIRD_VERSION, InfoValue::Text(s)) => out.firebird_version = s,
                (info::BASE_LEVEL, InfoValue::Text(s)) => out.base_level = s,
                (info::DB_CLASS, InfoValue::Text(s)) => out.server_class = s,
                (info::IMPLEMENTATION, InfoValue::Integers(v)) => out.implementation = v,
                (info::PAGE_SIZE, InfoValue::Integer(n)) => out.page_size = n,
                (info::NUM_BUFFERS, InfoValue::Integer(n)) => out.num_buffers = n,
                (info::ODS_VERSION, InfoValue::Integer(n)) => out.ods_version = n,
                (info::ODS_MINOR_VERSION, InfoValue::Integer(n)) => out.ods_minor_version = n,
                (info::DB_SQL_DIALECT, InfoValue::Integer(n)) => out.sql_dialect = n,
                (info::NEXT_TRANSACTION, InfoValue::Integer(n)) => out.next_transaction = n,
                (info::FORCED_WRITES, InfoValue::Bool(b)) => out.forced_writes = b,
                (info::DB_READ_ONLY, InfoValue::Bool(b)) => out.read_only = b,
                (other, _) => tracing::trace!(item = other, "ignoring database info item"),
            }
        }
        out
    }
}
