//! Database and transaction parameter buffers.

use crate::isc::{dpb, tpb};

/// Builder for a database parameter buffer (DPB).
#[derive(Debug, Clone)]
pub struct DatabaseParameterBuffer {
    buf: Vec<u8>,
}

impl Default for DatabaseParameterBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseParameterBuffer {
    /// Start a version 1 DPB.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: vec![dpb::VERSION1],
        }
    }

    /// Append a string item. Values longer than 255 bytes are truncated.
    #[must_use]
    pub fn string(mut self, item: u8, value: &str) -> Self {
        let bytes = value.as_bytes();
        let len = bytes.len().min(255);
        self.buf.push(item);
        self.buf.push(len as u8);
        self.buf.extend_from_slice(&bytes[..len]);
        self
    }

    /// Append a four byte little-endian integer item.
    #[must_use]
    pub fn int(mut self, item: u8, value: i32) -> Self {
        self.buf.push(item);
        self.buf.push(4);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Append a single byte item.
    #[must_use]
    pub fn byte(mut self, item: u8, value: u8) -> Self {
        self.buf.push(item);
        self.buf.push(1);
        self.buf.push(value);
        self
    }

    /// Encoded buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

/// Builder for a transaction parameter buffer (TPB).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionParameterBuffer {
    buf: Vec<u8>,
}

impl Default for TransactionParameterBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionParameterBuffer {
    /// Start a version 3 TPB.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: vec![tpb::VERSION3],
        }
    }

    /// Append a flag item.
    #[must_use]
    pub fn flag(mut self, item: u8) -> Self {
        self.buf.push(item);
        self
    }

    /// Encoded buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dpb_items() {
        let dpb = DatabaseParameterBuffer::new()
            .string(dpb::USER_NAME, "SYSDBA")
            .int(dpb::SQL_DIALECT, 3)
            .byte(dpb::PAGE_SIZE, 1);
        assert_eq!(
            dpb.as_bytes(),
            &[1, 28, 6, b'S', b'Y', b'S', b'D', b'B', b'A', 63, 4, 3, 0, 0, 0, 4, 1, 1]
        );
    }

    #[test]
    fn test_tpb_flags() {
        let tpb = TransactionParameterBuffer::new()
            .flag(tpb::WRITE)
            .flag(tpb::WAIT)
            .flag(tpb::CONCURRENCY);
        assert_eq!(tpb.as_bytes(), &[3, 9, 6, 2]);
    }
}
