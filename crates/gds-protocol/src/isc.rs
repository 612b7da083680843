//! Numeric constants shared by client and server.
//!
//! Grouped by the parameter or info buffer that uses them.

/// Generic info buffer tags.
pub mod info {
    /// End of buffer.
    pub const END: u8 = 1;
    /// Buffer was too small for the answer.
    pub const TRUNCATED: u8 = 2;
    /// Item not understood.
    pub const ERROR: u8 = 3;
    /// Database file and site names.
    pub const DB_ID: u8 = 4;
    /// Page reads.
    pub const READS: u8 = 5;
    /// Page writes.
    pub const WRITES: u8 = 6;
    /// Page fetches.
    pub const FETCHES: u8 = 7;
    /// Page marks.
    pub const MARKS: u8 = 8;
    /// Implementation code.
    pub const IMPLEMENTATION: u8 = 11;
    /// Server version strings.
    pub const ISC_VERSION: u8 = 12;
    /// Base level.
    pub const BASE_LEVEL: u8 = 13;
    /// Page size in bytes.
    pub const PAGE_SIZE: u8 = 14;
    /// Page buffers in cache.
    pub const NUM_BUFFERS: u8 = 15;
    /// Memory in use.
    pub const CURRENT_MEMORY: u8 = 17;
    /// Peak memory.
    pub const MAX_MEMORY: u8 = 18;
    /// Allocated pages.
    pub const ALLOCATION: u8 = 21;
    /// Attachment id.
    pub const ATTACHMENT_ID: u8 = 22;
    /// Sequential reads per table.
    pub const READ_SEQ_COUNT: u8 = 23;
    /// Indexed reads per table.
    pub const READ_IDX_COUNT: u8 = 24;
    /// Inserts per table.
    pub const INSERT_COUNT: u8 = 25;
    /// Updates per table.
    pub const UPDATE_COUNT: u8 = 26;
    /// Deletes per table.
    pub const DELETE_COUNT: u8 = 27;
    /// Back-outs per table.
    pub const BACKOUT_COUNT: u8 = 28;
    /// Purges per table.
    pub const PURGE_COUNT: u8 = 29;
    /// Expunges per table.
    pub const EXPUNGE_COUNT: u8 = 30;
    /// Sweep interval.
    pub const SWEEP_INTERVAL: u8 = 31;
    /// On-disk structure major version.
    pub const ODS_VERSION: u8 = 32;
    /// On-disk structure minor version.
    pub const ODS_MINOR_VERSION: u8 = 33;
    /// Space reservation disabled.
    pub const NO_RESERVE: u8 = 34;
    /// Synchronous writes enabled.
    pub const FORCED_WRITES: u8 = 52;
    /// SQL dialect of the database.
    pub const DB_SQL_DIALECT: u8 = 62;
    /// Database is read-only.
    pub const DB_READ_ONLY: u8 = 63;
    /// Database size in pages.
    pub const DB_SIZE_IN_PAGES: u8 = 64;
    /// Server class.
    pub const DB_CLASS: u8 = 102;
    /// Firebird version strings.
    pub const FIREBIRD_VERSION: u8 = 103;
    /// Oldest interesting transaction.
    pub const OLDEST_TRANSACTION: u8 = 104;
    /// Oldest active transaction.
    pub const OLDEST_ACTIVE: u8 = 105;
    /// Oldest snapshot transaction.
    pub const OLDEST_SNAPSHOT: u8 = 106;
    /// Next transaction id.
    pub const NEXT_TRANSACTION: u8 = 107;
    /// Active transaction ids.
    pub const ACTIVE_TRANSACTIONS: u8 = 109;

    /// `db_class` answer for the classic architecture.
    pub const CLASSIC_ACCESS: i64 = 13;
    /// `db_class` answer for the super server architecture.
    pub const SERVER_ACCESS: i64 = 14;
}

/// `op_info_sql` tags.
pub mod sql_info {
    /// Output descriptor section.
    pub const SELECT: u8 = 4;
    /// Input descriptor section.
    pub const BIND: u8 = 5;
    /// Descriptor count follows.
    pub const DESCRIBE_VARS: u8 = 7;
    /// End of one descriptor.
    pub const DESCRIBE_END: u8 = 8;
    /// One-based descriptor index.
    pub const SQLDA_SEQ: u8 = 9;
    /// Type code.
    pub const TYPE: u8 = 11;
    /// Subtype.
    pub const SUB_TYPE: u8 = 12;
    /// Scale.
    pub const SCALE: u8 = 13;
    /// Byte length.
    pub const LENGTH: u8 = 14;
    /// Field name.
    pub const FIELD: u8 = 16;
    /// Relation name.
    pub const RELATION: u8 = 17;
    /// Owner name.
    pub const OWNER: u8 = 18;
    /// Alias name.
    pub const ALIAS: u8 = 19;
    /// Resume a truncated description at the given index.
    pub const SQLDA_START: u8 = 20;
    /// Statement type.
    pub const STMT_TYPE: u8 = 21;
    /// Execution plan.
    pub const GET_PLAN: u8 = 22;
    /// Record counts.
    pub const RECORDS: u8 = 23;
}

/// `isc_info_sql_records` sub-items.
pub mod req_info {
    /// Rows selected.
    pub const SELECT_COUNT: u8 = 13;
    /// Rows inserted.
    pub const INSERT_COUNT: u8 = 14;
    /// Rows updated.
    pub const UPDATE_COUNT: u8 = 15;
    /// Rows deleted.
    pub const DELETE_COUNT: u8 = 16;
}

/// Transaction parameter buffer tags.
pub mod tpb {
    /// Buffer version.
    pub const VERSION3: u8 = 3;
    /// Table-stable snapshot.
    pub const CONSISTENCY: u8 = 1;
    /// Snapshot.
    pub const CONCURRENCY: u8 = 2;
    /// Wait on lock conflicts.
    pub const WAIT: u8 = 6;
    /// Fail on lock conflicts.
    pub const NOWAIT: u8 = 7;
    /// Read-only access.
    pub const READ: u8 = 8;
    /// Read-write access.
    pub const WRITE: u8 = 9;
    /// Read committed isolation.
    pub const READ_COMMITTED: u8 = 15;
    /// See the latest committed version.
    pub const REC_VERSION: u8 = 17;
    /// Wait for uncommitted versions.
    pub const NO_REC_VERSION: u8 = 18;
}

/// Database parameter buffer tags.
pub mod dpb {
    /// Buffer version.
    pub const VERSION1: u8 = 1;
    /// Page size for database creation.
    pub const PAGE_SIZE: u8 = 4;
    /// Keep-alive interval in seconds.
    pub const DUMMY_PACKET_INTERVAL: u8 = 58;
    /// User name.
    pub const USER_NAME: u8 = 28;
    /// Password.
    pub const PASSWORD: u8 = 29;
    /// Connection character set.
    pub const LC_CTYPE: u8 = 48;
    /// Connect timeout in seconds.
    pub const CONNECT_TIMEOUT: u8 = 57;
    /// SQL role.
    pub const SQL_ROLE_NAME: u8 = 60;
    /// SQL dialect.
    pub const SQL_DIALECT: u8 = 63;
}

/// Binary language representation opcodes used for message formats.
pub mod blr {
    /// Version 5 header.
    pub const VERSION5: u8 = 5;
    /// Begin block.
    pub const BEGIN: u8 = 2;
    /// Message definition.
    pub const MESSAGE: u8 = 4;
    /// End of BLR stream.
    pub const EOC: u8 = 76;
    /// End of block.
    pub const END: u8 = 255;
    /// Fixed CHAR.
    pub const TEXT: u8 = 14;
    /// 16-bit integer.
    pub const SHORT: u8 = 7;
    /// 32-bit integer.
    pub const LONG: u8 = 8;
    /// 64-bit quad (blob/array ids).
    pub const QUAD: u8 = 9;
    /// 64-bit integer.
    pub const INT64: u8 = 16;
    /// 32-bit float.
    pub const FLOAT: u8 = 10;
    /// 64-bit double.
    pub const DOUBLE: u8 = 27;
    /// VAX D float.
    pub const D_FLOAT: u8 = 11;
    /// Timestamp.
    pub const TIMESTAMP: u8 = 35;
    /// VARCHAR.
    pub const VARYING: u8 = 37;
    /// Date.
    pub const SQL_DATE: u8 = 12;
    /// Time of day.
    pub const SQL_TIME: u8 = 13;
    /// Boolean.
    pub const BOOL: u8 = 23;
}

/// Status vector argument types.
pub mod arg {
    /// End of vector.
    pub const END: i32 = 0;
    /// GDS error code.
    pub const GDS: i32 = 1;
    /// String argument.
    pub const STRING: i32 = 2;
    /// Counted string argument.
    pub const CSTRING: i32 = 3;
    /// Numeric argument.
    pub const NUMBER: i32 = 4;
    /// Preformatted message text.
    pub const INTERPRETED: i32 = 5;
    /// Warning code.
    pub const WARNING: i32 = 18;
    /// SQLSTATE string.
    pub const SQL_STATE: i32 = 19;
}

/// GDS error codes raised or inspected by the client.
pub mod gds {
    /// Arithmetic exception, numeric overflow, or string truncation.
    pub const ARITH_EXCEPT: i32 = 335_544_321;
    /// Invalid blob handle.
    pub const BAD_SEGSTR_HANDLE: i32 = 335_544_328;
    /// Invalid blob id.
    pub const BAD_SEGSTR_ID: i32 = 335_544_329;
    /// Invalid transaction handle.
    pub const BAD_TRANS_HANDLE: i32 = 335_544_332;
    /// Database has active transactions.
    pub const OPEN_TRANS: i32 = 335_544_357;
    /// Connection rejected by remote interface.
    pub const CONNECT_REJECT: i32 = 335_544_421;
    /// Transaction state prevents the operation.
    pub const TRA_STATE: i32 = 335_544_468;
    /// Invalid statement handle.
    pub const BAD_STMT_HANDLE: i32 = 335_544_485;
    /// Dynamic SQL error.
    pub const DSQL_ERROR: i32 = 335_544_569;
    /// Invalid SQLDA.
    pub const DSQL_SQLDA_ERR: i32 = 335_544_583;
    /// Dynamic SQL error position.
    pub const DSQL_LINE_COL_ERROR: i32 = 335_544_634;
    /// Network error.
    pub const NETWORK_ERROR: i32 = 335_544_721;
    /// Network read error.
    pub const NET_READ_ERR: i32 = 335_544_726;
    /// Network write error.
    pub const NET_WRITE_ERR: i32 = 335_544_727;
}

/// Default size of info answer buffers.
pub const MAX_BUFFER_SIZE: i32 = 1024;

/// Fetch status meaning no more rows.
pub const FETCH_NO_MORE_ROWS: i32 = 100;
