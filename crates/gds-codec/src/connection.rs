//! Request/response connection over a framed transport.
//!
//! GDS is a strict request/response protocol: every request is answered by
//! exactly one message, optionally preceded by keep-alive `op_dummy`
//! packets. The connection enforces nothing about ordering beyond that; the
//! client layer guarantees a single outstanding request per attachment.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use gds_protocol::{ColumnDescriptor, GenericResponse, ServerMessage};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::CodecError;
use crate::framed::MessageStream;
use crate::message_codec::GdsCodec;

/// A GDS connection over an async transport.
///
/// # Example
///
/// ```rust,ignore
/// use gds_codec::Connection;
/// use tokio::net::TcpStream;
///
/// let stream = TcpStream::connect("localhost:3050").await?;
/// let mut conn = Connection::new(stream);
/// conn.send(gds_protocol::request::connect("/db/test.fdb", "SYSDBA", "client")).await?;
/// let accept = conn.read_response().await?;
/// ```
pub struct Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    stream: MessageStream<T>,
    closed: bool,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a new connection from a transport.
    pub fn new(transport: T) -> Self {
        Self {
            stream: MessageStream::new(transport),
            closed: false,
        }
    }

    /// Create a new connection with a custom codec.
    pub fn with_codec(transport: T, codec: GdsCodec) -> Self {
        Self {
            stream: MessageStream::with_codec(transport, codec),
            closed: false,
        }
    }

    /// Whether the transport was closed or failed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send one encoded request and flush it.
    pub async fn send(&mut self, request: Bytes) -> Result<(), CodecError> {
        if self.closed {
            return Err(CodecError::ConnectionClosed);
        }
        tracing::trace!(length = request.len(), "sending GDS request");
        let result = self.stream.send(request).await;
        self.track(result)
    }

    /// Read the next message, including keep-alive packets.
    pub async fn read_message(&mut self) -> Result<ServerMessage, CodecError> {
        if self.closed {
            return Err(CodecError::ConnectionClosed);
        }
        match self.stream.next().await {
            Some(result) => self.track(result),
            None => {
                self.closed = true;
                if self.stream.read_buffer().is_empty() {
                    Err(CodecError::ConnectionClosed)
                } else {
                    Err(CodecError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed mid-message",
                    )))
                }
            }
        }
    }

    /// Read the answer to the last request, skipping `op_dummy` packets.
    pub async fn read_response(&mut self) -> Result<ServerMessage, CodecError> {
        loop {
            match self.read_message().await? {
                ServerMessage::Dummy => {
                    tracing::trace!("skipping keep-alive packet");
                }
                message => return Ok(message),
            }
        }
    }

    /// Read an answer that must be a generic `op_response`.
    ///
    /// The status vector is returned untouched; interpreting it is up to
    /// the caller.
    pub async fn read_generic_response(&mut self) -> Result<GenericResponse, CodecError> {
        match self.read_response().await? {
            ServerMessage::Response(response) => Ok(response),
            other => Err(CodecError::UnexpectedMessage {
                expected: "op_response",
                actual: other.name(),
            }),
        }
    }

    /// Send a request and read its generic response.
    pub async fn call(&mut self, request: Bytes) -> Result<GenericResponse, CodecError> {
        self.send(request).await?;
        self.read_generic_response().await
    }

    /// Set the layout of rows carried by upcoming fetch responses.
    pub fn set_row_layout(&mut self, layout: Option<Arc<[ColumnDescriptor]>>) {
        self.stream.set_row_layout(layout);
    }

    /// Shut down the write side of the transport.
    pub async fn close(&mut self) -> Result<(), CodecError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.close().await
    }

    /// Get a reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        self.stream.get_ref()
    }

    fn track<R>(&mut self, result: Result<R, CodecError>) -> Result<R, CodecError> {
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::debug!(error = %e, "GDS transport failed");
                self.closed = true;
            }
        }
        result
    }
}

impl<T> std::fmt::Debug for Connection<T>
where
    T: AsyncRead + AsyncWrite,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use bytes::{BufMut, BytesMut};
    use gds_protocol::isc::arg;
    use gds_protocol::op::Operation;
    use gds_protocol::request;
    use gds_protocol::xdr;

    fn response(handle: i32) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_i32(Operation::Response.code());
        buf.put_i32(handle);
        buf.put_i64(0);
        xdr::write_buffer(&mut buf, &[]);
        buf.put_i32(arg::GDS);
        buf.put_i32(0);
        buf.put_i32(arg::END);
        buf.to_vec()
    }

    fn dummy() -> Vec<u8> {
        Operation::Dummy.code().to_be_bytes().to_vec()
    }

    #[tokio::test]
    async fn test_call_skips_dummy() {
        let req = request::allocate_statement(1);
        let mock = tokio_test::io::Builder::new()
            .write(&req)
            .read(&dummy())
            .read(&response(7))
            .build();

        let mut conn = Connection::new(mock);
        let resp = conn.call(req).await.unwrap();
        assert_eq!(resp.handle, 7);
    }

    #[tokio::test]
    async fn test_response_split_across_reads() {
        let req = request::allocate_statement(1);
        let full = response(3);
        let mock = tokio_test::io::Builder::new()
            .write(&req)
            .read(&full[..6])
            .read(&full[6..])
            .build();

        let mut conn = Connection::new(mock);
        assert_eq!(conn.call(req).await.unwrap().handle, 3);
    }

    #[tokio::test]
    async fn test_unexpected_message() {
        let req = request::allocate_statement(1);
        let mut reject = BytesMut::new();
        reject.put_i32(Operation::Reject.code());
        let mock = tokio_test::io::Builder::new()
            .write(&req)
            .read(&reject)
            .build();

        let mut conn = Connection::new(mock);
        match conn.call(req).await {
            Err(CodecError::UnexpectedMessage { expected, actual }) => {
                assert_eq!(expected, "op_response");
                assert_eq!(actual, "op_reject");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_eof_marks_closed() {
        let mock = tokio_test::io::Builder::new().build();
        let mut conn = Connection::new(mock);
        assert!(matches!(
            conn.read_message().await,
            Err(CodecError::ConnectionClosed)
        ));
        assert!(conn.is_closed());
        assert!(matches!(
            conn.send(request::disconnect()).await,
            Err(CodecError::ConnectionClosed)
        ));
    }
}
