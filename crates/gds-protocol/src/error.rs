//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while encoding or decoding GDS wire data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Input ended before a complete value could be read.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// The server sent an operation code the client does not understand.
    #[error("unknown operation code {0}")]
    UnknownOperation(i32),

    /// The server answered with a different operation than the request implies.
    #[error("unexpected operation: expected {expected}, got {actual}")]
    UnexpectedOperation {
        /// Operation the client was waiting for.
        expected: &'static str,
        /// Operation code actually received.
        actual: i32,
    },

    /// A column descriptor carries a SQL type code with no known wire shape.
    #[error("unsupported SQL type code {0}")]
    UnsupportedSqlType(i32),

    /// An `isc_info_sql_*` buffer contained an item the parser cannot handle.
    #[error("invalid SQL descriptor item {0}")]
    InvalidDescriptorItem(u8),

    /// A descriptor index fell outside the declared column count.
    #[error("descriptor index {index} out of range (count {count})")]
    DescriptorIndexOutOfRange {
        /// One-based index reported by the server.
        index: i64,
        /// Number of columns announced by the server.
        count: usize,
    },

    /// An info buffer could not be parsed.
    #[error("malformed info buffer: {0}")]
    MalformedInfo(&'static str),

    /// A null indicator other than 0 or -1 was read.
    #[error("invalid null indicator {0}")]
    InvalidNullIndicator(i32),

    /// A negative or oversized length prefix was read.
    #[error("invalid length {0}")]
    InvalidLength(i32),

    /// A VAX integer wider than eight bytes was requested.
    #[error("invalid VAX integer width {0}")]
    InvalidVaxWidth(usize),

    /// The connection handshake was refused by the server.
    #[error("connection rejected by server")]
    ConnectionRejected,

    /// A status vector argument type is unknown.
    #[error("unknown status vector argument type {0}")]
    UnknownStatusArgument(i32),

    /// A row arrived but no row layout was registered for it.
    #[error("row received without a row layout")]
    MissingRowLayout,

    /// A blob segment length prefix points past the end of the buffer.
    #[error("truncated blob segment")]
    TruncatedSegment,

    /// A value does not fit the field it is being written to.
    #[error("value too large for {0}")]
    ValueTooLarge(&'static str),
}
