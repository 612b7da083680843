//! Codec error types.

use thiserror::Error;

/// Errors raised while framing GDS messages over a transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// IO error on the underlying transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes received could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] gds_protocol::ProtocolError),

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// A buffered message grew past the configured limit.
    #[error("message too large: {size} bytes buffered (max {max})")]
    MessageTooLarge {
        /// Bytes buffered so far.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// The server answered with a message the request does not allow.
    #[error("unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Message the client was waiting for.
        expected: &'static str,
        /// Message actually received.
        actual: &'static str,
    },
}

impl CodecError {
    /// Whether the transport is unusable after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ConnectionClosed | Self::MessageTooLarge { .. }
        )
    }
}
