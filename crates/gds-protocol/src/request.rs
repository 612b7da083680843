//! Client request encoding.
//!
//! Each function returns the complete XDR payload of one request. The
//! payloads are written to the socket as-is; GDS has no outer framing.

use bytes::{BufMut, Bytes, BytesMut};

use crate::op::{
    ARCH_GENERIC, CONNECT_VERSION2, FreeOption, Operation, PROTOCOL_VERSION10, PTYPE_BATCH_SEND,
    PTYPE_RPC, cnct,
};
use crate::xdr;

/// Incremental request builder.
#[derive(Debug)]
pub struct Request {
    buf: BytesMut,
}

impl Request {
    /// Start a request with the given operation.
    #[must_use]
    pub fn new(op: Operation) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_i32(op.code());
        Self { buf }
    }

    /// Append an integer.
    #[must_use]
    pub fn int(mut self, value: i32) -> Self {
        xdr::write_i32(&mut self.buf, value);
        self
    }

    /// Append a length-prefixed buffer.
    #[must_use]
    pub fn buffer(mut self, data: &[u8]) -> Self {
        xdr::write_buffer(&mut self.buf, data);
        self
    }

    /// Append raw, already XDR-encoded bytes.
    #[must_use]
    pub fn raw(mut self, data: &[u8]) -> Self {
        self.buf.put_slice(data);
        self
    }

    /// Finish the request.
    #[must_use]
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Handshake request offering protocol version 10.
#[must_use]
pub fn connect(database: &str, user: &str, host: &str) -> Bytes {
    let mut user_id = Vec::with_capacity(user.len() + host.len() + 6);
    push_cnct(&mut user_id, cnct::USER, user.as_bytes());
    push_cnct(&mut user_id, cnct::HOST, host.as_bytes());
    user_id.push(cnct::USER_VERIFICATION);
    user_id.push(0);

    Request::new(Operation::Connect)
        .int(Operation::Attach.code())
        .int(CONNECT_VERSION2)
        .int(ARCH_GENERIC)
        .buffer(database.as_bytes())
        .int(1)
        .buffer(&user_id)
        .int(PROTOCOL_VERSION10)
        .int(ARCH_GENERIC)
        .int(PTYPE_RPC)
        .int(PTYPE_BATCH_SEND)
        .int(2)
        .finish()
}

fn push_cnct(dst: &mut Vec<u8>, tag: u8, value: &[u8]) {
    let len = value.len().min(255);
    dst.push(tag);
    dst.push(len as u8);
    dst.extend_from_slice(&value[..len]);
}

/// Attach to (or, with [`Operation::Create`], create) a database.
#[must_use]
pub fn attach(op: Operation, database: &str, dpb: &[u8]) -> Bytes {
    Request::new(op)
        .int(0)
        .buffer(database.as_bytes())
        .buffer(dpb)
        .finish()
}

/// Request carrying only an object handle (detach, drop, commit, ...).
#[must_use]
pub fn handle_only(op: Operation, handle: i32) -> Bytes {
    Request::new(op).int(handle).finish()
}

/// Close the network connection.
#[must_use]
pub fn disconnect() -> Bytes {
    Request::new(Operation::Disconnect).finish()
}

/// Start a transaction.
#[must_use]
pub fn start_transaction(db_handle: i32, tpb: &[u8]) -> Bytes {
    Request::new(Operation::Transaction)
        .int(db_handle)
        .buffer(tpb)
        .finish()
}

/// Two-phase prepare with an optional message.
#[must_use]
pub fn prepare_transaction(tx_handle: i32, message: Option<&[u8]>) -> Bytes {
    match message {
        Some(data) => Request::new(Operation::Prepare2)
            .int(tx_handle)
            .buffer(data)
            .finish(),
        None => handle_only(Operation::Prepare, tx_handle),
    }
}

/// Database information request.
#[must_use]
pub fn info_database(db_handle: i32, items: &[u8], buffer_len: i32) -> Bytes {
    Request::new(Operation::InfoDatabase)
        .int(db_handle)
        .int(0)
        .buffer(items)
        .int(buffer_len)
        .finish()
}

/// Allocate a statement handle.
#[must_use]
pub fn allocate_statement(db_handle: i32) -> Bytes {
    handle_only(Operation::AllocateStatement, db_handle)
}

/// Prepare SQL text on an allocated statement.
#[must_use]
pub fn prepare_statement(
    tx_handle: i32,
    stmt_handle: i32,
    dialect: i32,
    sql: &[u8],
    items: &[u8],
    buffer_len: i32,
) -> Bytes {
    Request::new(Operation::PrepareStatement)
        .int(tx_handle)
        .int(stmt_handle)
        .int(dialect)
        .buffer(sql)
        .buffer(items)
        .int(buffer_len)
        .finish()
}

/// Statement information request.
#[must_use]
pub fn info_sql(stmt_handle: i32, items: &[u8], buffer_len: i32) -> Bytes {
    Request::new(Operation::InfoSql)
        .int(stmt_handle)
        .int(0)
        .buffer(items)
        .int(buffer_len)
        .finish()
}

/// Output message description for `op_execute2`.
#[derive(Debug, Clone, Copy)]
pub struct OutputMessage<'a> {
    /// BLR of the output message.
    pub blr: &'a [u8],
}

/// Execute a prepared statement.
///
/// `params` is the already encoded input message; it is sent only when
/// `in_blr` is non-empty. Passing `output` switches to `op_execute2`.
#[must_use]
pub fn execute(
    stmt_handle: i32,
    tx_handle: i32,
    in_blr: &[u8],
    params: &[u8],
    output: Option<OutputMessage<'_>>,
) -> Bytes {
    let op = if output.is_some() {
        Operation::Execute2
    } else {
        Operation::Execute
    };
    let has_params = !in_blr.is_empty();

    let mut request = Request::new(op)
        .int(stmt_handle)
        .int(tx_handle)
        .buffer(in_blr)
        .int(0)
        .int(i32::from(has_params));
    if has_params {
        request = request.raw(params);
    }
    if let Some(out) = output {
        request = request.buffer(out.blr).int(0);
    }
    request.finish()
}

/// Fetch a batch of rows.
#[must_use]
pub fn fetch(stmt_handle: i32, blr: &[u8], fetch_size: i32) -> Bytes {
    Request::new(Operation::Fetch)
        .int(stmt_handle)
        .buffer(blr)
        .int(0)
        .int(fetch_size)
        .finish()
}

/// Close or drop a statement.
#[must_use]
pub fn free_statement(stmt_handle: i32, option: FreeOption) -> Bytes {
    Request::new(Operation::FreeStatement)
        .int(stmt_handle)
        .int(option as i32)
        .finish()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::Buf;

    #[test]
    fn test_fetch_layout() {
        let mut payload = fetch(7, &[1, 2, 3], 200);
        assert_eq!(payload.get_i32(), Operation::Fetch.code());
        assert_eq!(payload.get_i32(), 7);
        assert_eq!(payload.get_i32(), 3);
        assert_eq!(&payload.copy_to_bytes(4)[..], &[1, 2, 3, 0]);
        assert_eq!(payload.get_i32(), 0);
        assert_eq!(payload.get_i32(), 200);
        assert!(!payload.has_remaining());
    }

    #[test]
    fn test_execute_without_params() {
        let mut payload = execute(1, 2, &[], &[9, 9, 9, 9], None);
        assert_eq!(payload.get_i32(), Operation::Execute.code());
        assert_eq!(payload.get_i32(), 1);
        assert_eq!(payload.get_i32(), 2);
        assert_eq!(payload.get_i32(), 0);
        assert_eq!(payload.get_i32(), 0);
        assert_eq!(payload.get_i32(), 0);
        assert!(!payload.has_remaining());
    }

    #[test]
    fn test_execute2_appends_output_blr() {
        let mut payload = execute(1, 2, &[5, 5, 5, 5], &[0, 0, 0, 1], Some(OutputMessage { blr: &[6, 6, 6, 6] }));
        assert_eq!(payload.get_i32(), Operation::Execute2.code());
        payload.advance(8);
        assert_eq!(payload.get_i32(), 4);
        payload.advance(4);
        assert_eq!(payload.get_i32(), 0);
        assert_eq!(payload.get_i32(), 1);
        assert_eq!(payload.get_i32(), 1);
        assert_eq!(payload.get_i32(), 4);
        assert_eq!(&payload.copy_to_bytes(4)[..], &[6, 6, 6, 6]);
        assert_eq!(payload.get_i32(), 0);
    }

    #[test]
    fn test_connect_offers_protocol_10() {
        let mut payload = connect("/db/test.fdb", "alice", "host1");
        assert_eq!(payload.get_i32(), Operation::Connect.code());
        assert_eq!(payload.get_i32(), Operation::Attach.code());
        assert_eq!(payload.get_i32(), CONNECT_VERSION2);
        assert_eq!(payload.get_i32(), ARCH_GENERIC);
        let db = xdr::read_string(&mut payload).unwrap();
        assert_eq!(db, "/db/test.fdb");
        assert_eq!(payload.get_i32(), 1);
        let user_id = xdr::read_buffer(&mut payload).unwrap();
        assert_eq!(&user_id[..7], &[cnct::USER, 5, b'a', b'l', b'i', b'c', b'e']);
        assert_eq!(payload.get_i32(), PROTOCOL_VERSION10);
    }

    #[test]
    fn test_open_blob_carries_id() {
        let mut payload = open_blob(Operation::OpenBlob, 3, 0x0000_0081_0000_0002);
        assert_eq!(payload.get_i32(), Operation::OpenBlob.code());
        assert_eq!(payload.get_i32(), 3);
        assert_eq!(payload.get_i64(), 0x0000_0081_0000_0002);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_batch_segments_repeats_length() {
        let mut payload = batch_segments(7, &[3, 0, b'a', b'b', b'c']);
        assert_eq!(payload.get_i32(), Operation::BatchSegments.code());
        assert_eq!(payload.get_i32(), 7);
        assert_eq!(payload.get_i32(), 5);
        let data = xdr::read_buffer(&mut payload).unwrap();
        assert_eq!(&data[..], &[3, 0, b'a', b'b', b'c']);
        assert!(payload.is_empty());
    }
}
