//! Client error types.

use gds_protocol::status::ServerError;
use gds_protocol::StatusVector;
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// The server refused the protocol handshake.
    #[error("connection rejected by server")]
    ConnectionRejected,

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] gds_protocol::ProtocolError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] gds_codec::CodecError),

    /// Type conversion error.
    #[error("type error: {0}")]
    Type(#[from] firebird_types::TypeError),

    /// Server returned an error.
    ///
    /// `errors` holds every entry of the status vector in server order;
    /// `code` and `message` describe the first one.
    #[error("{message}")]
    Server {
        /// Primary GDS error code.
        code: i32,
        /// Error class (1 = warning, 2 = error).
        class: u8,
        /// Primary message; all messages joined by newlines.
        message: String,
        /// SQLSTATE, when the server sent one.
        sql_state: Option<String>,
        /// Every error in the status vector.
        errors: Vec<ServerError>,
    },

    /// The operation is not valid in the current state.
    #[error("{0}")]
    InvalidOperation(String),

    /// Transaction error.
    #[error("{0}")]
    Transaction(String),

    /// A parameter could not be bound.
    #[error("parameter error: {0}")]
    Parameter(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection timeout occurred.
    #[error("connection timed out")]
    ConnectionTimeout,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid identifier (potential SQL injection attempt).
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl Error {
    /// Build a server error from a failed status vector.
    pub(crate) fn from_status(status: StatusVector) -> Self {
        let first = status.errors.first();
        Self::Server {
            code: first.map_or(0, |e| e.code),
            class: first.map_or(2, ServerError::class),
            message: status.message(),
            sql_state: first.and_then(|e| e.sql_state.clone()),
            errors: status.errors,
        }
    }

    /// Build a server error for a client-detected condition.
    pub(crate) fn gds(code: i32, args: &[&str]) -> Self {
        Self::from_status(StatusVector::single(code, args))
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// Transient errors are the ones that leave no server-side state
    /// behind: timeouts and broken transports.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionTimeout | Self::ConnectionClosed | Self::Io(_) => true,
            Self::Codec(e) => e.is_fatal(),
            Self::Server { code, .. } => matches!(
                *code,
                gds_protocol::isc::gds::NETWORK_ERROR
                    | gds_protocol::isc::gds::NET_READ_ERR
                    | gds_protocol::isc::gds::NET_WRITE_ERR
            ),
            _ => false,
        }
    }

    /// Check if this error indicates a protocol/driver bug.
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Check if this is a server error with a specific code.
    #[must_use]
    pub fn is_server_error(&self, code: i32) -> bool {
        match self {
            Self::Server { errors, .. } => errors.iter().any(|e| e.code == code),
            _ => false,
        }
    }

    /// Get the error class if this is a server error.
    #[must_use]
    pub fn class(&self) -> Option<u8> {
        match self {
            Self::Server { class, .. } => Some(*class),
            _ => None,
        }
    }

    /// Structured server errors carried by this error.
    ///
    /// Empty for errors detected on the client side.
    #[must_use]
    pub fn errors(&self) -> &[ServerError] {
        match self {
            Self::Server { errors, .. } => errors,
            _ => &[],
        }
    }

    /// SQLSTATE of the primary server error.
    #[must_use]
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Server { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }
}

/// Log server warnings that accompanied a successful response.
pub(crate) fn log_warnings(status: &StatusVector) {
    for warning in &status.warnings {
        tracing::warn!(code = warning.code, message = %warning.message, "server warning");
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
