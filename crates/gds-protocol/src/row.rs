//! Raw row layout.
//!
//! Rows travel as one XDR item per column followed by a 32-bit null
//! indicator. This module splits a row into per-column byte slices without
//! interpreting them; value conversion happens in the types layer.

use bytes::{Buf, BufMut, Bytes};

use crate::descriptor::ColumnDescriptor;
use crate::error::ProtocolError;
use crate::types::ColumnKind;
use crate::xdr;

/// A row whose column values are still in wire form.
///
/// Fixed-width values keep their big-endian bytes; VARCHAR values are
/// stored without their length prefix; `None` marks SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    values: Vec<Option<Bytes>>,
}

impl RawRow {
    /// Create a row from raw column slices.
    #[must_use]
    pub fn new(values: Vec<Option<Bytes>>) -> Self {
        Self { values }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw bytes for a column, `None` for NULL or out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Iterate over column slices.
    pub fn iter(&self) -> impl Iterator<Item = Option<&Bytes>> {
        self.values.iter().map(Option::as_ref)
    }

    /// Consume the row and return its slices.
    #[must_use]
    pub fn into_values(self) -> Vec<Option<Bytes>> {
        self.values
    }
}

/// Wire width of fixed-size kinds, `None` for character data.
#[must_use]
pub const fn fixed_width(kind: ColumnKind) -> Option<usize> {
    match kind {
        ColumnKind::Short
        | ColumnKind::Long
        | ColumnKind::Float
        | ColumnKind::Date
        | ColumnKind::Time => Some(4),
        ColumnKind::Int64
        | ColumnKind::Double
        | ColumnKind::DFloat
        | ColumnKind::Timestamp
        | ColumnKind::Blob
        | ColumnKind::Array
        | ColumnKind::Quad => Some(8),
        ColumnKind::Boolean => Some(1),
        ColumnKind::Text | ColumnKind::Varying | ColumnKind::Null => None,
    }
}

/// Read one raw column value and its null indicator.
pub fn read_column(src: &mut impl Buf, var: &ColumnDescriptor) -> Result<Option<Bytes>, ProtocolError> {
    let kind = var.kind()?;
    let data = match kind {
        ColumnKind::Text => xdr::read_opaque(src, var.length.max(0) as usize)?,
        ColumnKind::Varying => xdr::read_buffer(src)?,
        ColumnKind::Null => Bytes::new(),
        // Booleans are a single opaque byte; everything else is word sized.
        ColumnKind::Boolean => xdr::read_opaque(src, 1)?,
        other => {
            let width = fixed_width(other).unwrap_or(4);
            if src.remaining() < width {
                return Err(ProtocolError::UnexpectedEof);
            }
            src.copy_to_bytes(width)
        }
    };

    match xdr::read_i32(src)? {
        0 => Ok(Some(data)),
        -1 => Ok(None),
        other => Err(ProtocolError::InvalidNullIndicator(other)),
    }
}

/// Read a full row for the given descriptors.
pub fn read_row(src: &mut impl Buf, vars: &[ColumnDescriptor]) -> Result<RawRow, ProtocolError> {
    let mut values = Vec::with_capacity(vars.len());
    for var in vars {
        values.push(read_column(src, var)?);
    }
    Ok(RawRow::new(values))
}

/// Write the zero value used in place of a NULL column, followed by the
/// NULL indicator.
pub fn write_null(dst: &mut impl BufMut, var: &ColumnDescriptor) -> Result<(), ProtocolError> {
    match var.kind()? {
        ColumnKind::Text => xdr::write_fixed_text(dst, &[], var.length.max(0) as usize),
        ColumnKind::Varying => xdr::write_buffer(dst, &[]),
        ColumnKind::Null => {}
        ColumnKind::Boolean => xdr::write_opaque(dst, &[0]),
        other => {
            let width = fixed_width(other).unwrap_or(4);
            dst.put_bytes(0, width);
        }
    }
    xdr::write_i32(dst, -1);
    Ok(())
}

/// Write a present-value null indicator.
pub fn write_not_null(dst: &mut impl BufMut) {
    xdr::write_i32(dst, 0);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::sql_type;
    use bytes::BytesMut;

    #[test]
    fn test_read_row_mixed() {
        let vars = vec![
            ColumnDescriptor::new(sql_type::LONG, 4),
            ColumnDescriptor::new(sql_type::VARYING + 1, 10),
            ColumnDescriptor::new(sql_type::TEXT, 3),
            ColumnDescriptor::new(sql_type::INT64 + 1, 8),
        ];

        let mut buf = BytesMut::new();
        buf.put_i32(42);
        write_not_null(&mut buf);
        xdr::write_buffer(&mut buf, b"hello");
        write_not_null(&mut buf);
        xdr::write_fixed_text(&mut buf, b"ab", 3);
        write_not_null(&mut buf);
        write_null(&mut buf, &vars[3]).unwrap();

        let mut src = buf.freeze();
        let row = read_row(&mut src, &vars).unwrap();
        assert_eq!(row.len(), 4);
        assert_eq!(&row.get(0).unwrap()[..], &42i32.to_be_bytes());
        assert_eq!(&row.get(1).unwrap()[..], b"hello");
        assert_eq!(&row.get(2).unwrap()[..], b"ab ");
        assert!(row.get(3).is_none());
        assert_eq!(src.remaining(), 0);
    }

    #[test]
    fn test_invalid_null_indicator() {
        let vars = vec![ColumnDescriptor::new(sql_type::SHORT, 2)];
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i32(7);
        let mut src = buf.freeze();
        assert_eq!(
            read_row(&mut src, &vars),
            Err(ProtocolError::InvalidNullIndicator(7))
        );
    }

    #[test]
    fn test_incomplete_row() {
        let vars = vec![ColumnDescriptor::new(sql_type::DOUBLE, 8)];
        let mut src: &[u8] = &[0, 0, 0, 0];
        assert_eq!(read_row(&mut src, &vars), Err(ProtocolError::UnexpectedEof));
    }
}
