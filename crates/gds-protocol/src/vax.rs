//! VAX integers and tagged info buffer traversal.
//!
//! Info buffers returned by `op_info_database` and `op_info_sql` are
//! sequences of `item, length(2 bytes LE), value` clusters where integer
//! values use the little-endian "VAX" layout.

use crate::error::ProtocolError;

/// Decode a little-endian integer of `len` bytes starting at `pos`.
///
/// Widths 0 through 8 are accepted; the result is sign-extended from the
/// most significant byte read.
pub fn vax_integer(buf: &[u8], pos: usize, len: usize) -> Result<i64, ProtocolError> {
    if len > 8 {
        return Err(ProtocolError::InvalidVaxWidth(len));
    }
    if len == 0 {
        return Ok(0);
    }
    let end = pos.checked_add(len).ok_or(ProtocolError::UnexpectedEof)?;
    let bytes = buf.get(pos..end).ok_or(ProtocolError::UnexpectedEof)?;

    let mut value: u64 = 0;
    for (shift, byte) in bytes.iter().enumerate() {
        value |= u64::from(*byte) << (shift * 8);
    }
    // Sign-extend from the top bit of the last byte.
    let bits = len * 8;
    if bits < 64 && bytes[len - 1] & 0x80 != 0 {
        value |= !0u64 << bits;
    }
    Ok(value as i64)
}

/// Encode `value` as a little-endian integer of `len` bytes.
pub fn write_vax(dst: &mut Vec<u8>, value: i64, len: usize) {
    for shift in 0..len {
        dst.push((value >> (shift * 8)) as u8);
    }
}

/// Forward-only cursor over an info buffer.
#[derive(Debug, Clone)]
pub struct InfoCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> InfoCursor<'a> {
    /// Create a cursor at the start of `buf`.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current byte offset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        self.buf.get(self.pos..).unwrap_or_default()
    }

    /// Look at the next item tag without consuming it.
    pub fn peek_item(&self) -> Result<u8, ProtocolError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(ProtocolError::UnexpectedEof)
    }

    /// Consume and return the next item tag.
    pub fn next_item(&mut self) -> Result<u8, ProtocolError> {
        let item = self.peek_item()?;
        self.pos += 1;
        Ok(item)
    }

    /// Read a two-byte cluster length followed by that many bytes.
    pub fn read_cluster(&mut self) -> Result<&'a [u8], ProtocolError> {
        let len = vax_integer(self.buf, self.pos, 2)? as u16 as usize;
        self.pos += 2;
        let end = self.pos + len;
        let data = self.buf.get(self.pos..end).ok_or(ProtocolError::UnexpectedEof)?;
        self.pos = end;
        Ok(data)
    }

    /// Read a cluster and interpret its bytes as a VAX integer.
    pub fn read_cluster_int(&mut self) -> Result<i64, ProtocolError> {
        let data = self.read_cluster()?;
        vax_integer(data, 0, data.len())
    }

    /// Read a cluster as text, replacing invalid UTF-8 sequences.
    pub fn read_cluster_string(&mut self) -> Result<String, ProtocolError> {
        let data = self.read_cluster()?;
        Ok(String::from_utf8_lossy(data).into_owned())
    }
}
