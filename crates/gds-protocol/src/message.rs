//! Server message decoding.

use bytes::{Buf, Bytes};

use crate::descriptor::ColumnDescriptor;
use crate::error::ProtocolError;
use crate::op::Operation;
use crate::row::{RawRow, read_row};
use crate::status::{StatusVector, read_status_vector};
use crate::xdr;

/// Payload of an `op_response`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenericResponse {
    /// Object handle created by the request (attachment, transaction, ...).
    pub handle: i32,
    /// Blob id, when the request created one.
    pub blob_id: i64,
    /// Info answer or other request-specific data.
    pub data: Bytes,
    /// Errors and warnings reported for the request.
    pub status: StatusVector,
}

/// A complete message received from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Handshake accepted.
    Accept {
        /// Negotiated protocol version.
        version: i32,
        /// Negotiated architecture.
        architecture: i32,
        /// Negotiated protocol type.
        protocol_type: i32,
    },
    /// Handshake refused.
    Reject,
    /// Keep-alive packet.
    Dummy,
    /// Generic response.
    Response(GenericResponse),
    /// One entry of a fetch batch.
    FetchResponse {
        /// 0 while rows remain, 100 when exhausted.
        status: i32,
        /// Number of messages (rows) that follow.
        count: i32,
        /// The row, when `count > 0` and `status == 0`.
        row: Option<RawRow>,
    },
    /// Singleton row answering `op_execute2`.
    SqlResponse {
        /// Number of messages (0 or 1).
        count: i32,
        /// The row, when present.
        row: Option<RawRow>,
    },
}

impl ServerMessage {
    /// Short name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accept { .. } => "op_accept",
            Self::Reject => "op_reject",
            Self::Dummy => "op_dummy",
            Self::Response(_) => "op_response",
            Self::FetchResponse { .. } => "op_fetch_response",
            Self::SqlResponse { .. } => "op_sql_response",
        }
    }

    /// Operation code of this message.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Accept { .. } => Operation::Accept,
            Self::Reject => Operation::Reject,
            Self::Dummy => Operation::Dummy,
            Self::Response(_) => Operation::Response,
            Self::FetchResponse { .. } => Operation::FetchResponse,
            Self::SqlResponse { .. } => Operation::SqlResponse,
        }
    }
}

/// Decode one server message.
///
/// `row_layout` describes the rows carried by fetch and SQL responses.
/// Returns [`ProtocolError::UnexpectedEof`] when `src` holds only part of
/// a message; callers that buffer network input treat that as "need more".
pub fn decode_message(
    src: &mut impl Buf,
    row_layout: Option<&[ColumnDescriptor]>,
) -> Result<ServerMessage, ProtocolError> {
    let op = Operation::from_i32(xdr::read_i32(src)?)?;
    match op {
        Operation::Accept => Ok(ServerMessage::Accept {
            version: xdr::read_i32(src)?,
            architecture: xdr::read_i32(src)?,
            protocol_type: xdr::read_i32(src)?,
        }),
        Operation::Reject => Ok(ServerMessage::Reject),
        Operation::Dummy => Ok(ServerMessage::Dummy),
        Operation::Response => {
            let handle = xdr::read_i32(src)?;
            let blob_id = xdr::read_i64(src)?;
            let data = xdr::read_buffer(src)?;
            let status = read_status_vector(src)?;
            Ok(ServerMessage::Response(GenericResponse {
                handle,
                blob_id,
                data,
                status,
            }))
        }
        Operation::FetchResponse => {
            let status = xdr::read_i32(src)?;
            let count = xdr::read_i32(src)?;
            let row = if count > 0 && status == 0 {
                let layout = row_layout.ok_or(ProtocolError::MissingRowLayout)?;
                Some(read_row(src, layout)?)
            } else {
                None
            };
            Ok(ServerMessage::FetchResponse { status, count, row })
        }
        Operation::SqlResponse => {
            let count = xdr::read_i32(src)?;
            let row = if count > 0 {
                let layout = row_layout.ok_or(ProtocolError::MissingRowLayout)?;
                Some(read_row(src, layout)?)
            } else {
                None
            };
            Ok(ServerMessage::SqlResponse { count, row })
        }
        other => Err(ProtocolError::UnexpectedOperation {
            expected: "server message",
            actual: other.code(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::isc::arg;
    use crate::types::sql_type;
    use bytes::{BufMut, BytesMut};

    fn response(handle: i32, data: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_i32(Operation::Response.code());
        buf.put_i32(handle);
        buf.put_i64(0);
        xdr::write_buffer(&mut buf, data);
        buf.put_i32(arg::GDS);
        buf.put_i32(0);
        buf.put_i32(arg::END);
        buf
    }

    #[test]
    fn test_decode_response() {
        let mut src = response(12, b"xy").freeze();
        let msg = decode_message(&mut src, None).unwrap();
        match msg {
            ServerMessage::Response(r) => {
                assert_eq!(r.handle, 12);
                assert_eq!(&r.data[..], b"xy");
                assert!(!r.status.is_error());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_partial_response_is_eof() {
        let full = response(1, b"abcdef");
        let mut src = &full[..full.len() - 3];
        assert_eq!(
            decode_message(&mut src, None),
            Err(ProtocolError::UnexpectedEof)
        );
    }

    #[test]
    fn test_decode_fetch_row() {
        let layout = vec![ColumnDescriptor::new(sql_type::LONG, 4)];
        let mut buf = BytesMut::new();
        buf.put_i32(Operation::FetchResponse.code());
        buf.put_i32(0);
        buf.put_i32(1);
        buf.put_i32(5);
        buf.put_i32(0);
        let msg = decode_message(&mut buf.freeze(), Some(&layout)).unwrap();
        match msg {
            ServerMessage::FetchResponse { status, count, row } => {
                assert_eq!(status, 0);
                assert_eq!(count, 1);
                assert_eq!(&row.unwrap().get(0).unwrap()[..], &5i32.to_be_bytes());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_fetch_end_has_no_row() {
        let mut buf = BytesMut::new();
        buf.put_i32(Operation::FetchResponse.code());
        buf.put_i32(100);
        buf.put_i32(0);
        let msg = decode_message(&mut buf.freeze(), None).unwrap();
        assert_eq!(
            msg,
            ServerMessage::FetchResponse {
                status: 100,
                count: 0,
                row: None
            }
        );
    }

    #[test]
    fn test_fetch_row_requires_layout() {
        let mut buf = BytesMut::new();
        buf.put_i32(Operation::FetchResponse.code());
        buf.put_i32(0);
        buf.put_i32(1);
        assert_eq!(
            decode_message(&mut buf.freeze(), None),
            Err(ProtocolError::MissingRowLayout)
        );
    }
}
