//! GDS binary decoding for SQL values.
//!
//! Row values arrive as raw column slices split by
//! [`gds_protocol::row::read_row`]; this module turns one slice into a
//! [`SqlValue`] according to its column descriptor.

use bytes::Bytes;
use gds_protocol::{ColumnDescriptor, ColumnKind};
use rust_decimal::Decimal;

use crate::charset::Charset;
use crate::datetime;
use crate::error::TypeError;
use crate::value::SqlValue;

/// Decode one raw column value.
///
/// `raw` is `None` for SQL NULL. `charset` is the connection charset; the
/// column's own charset is used when the connection negotiated `NONE`.
pub fn decode_value(
    raw: Option<&Bytes>,
    column: &ColumnDescriptor,
    charset: Charset,
) -> Result<SqlValue, TypeError> {
    let Some(raw) = raw else {
        return Ok(SqlValue::Null);
    };

    match column.kind()? {
        ColumnKind::Text => decode_text(raw, column, charset, true),
        ColumnKind::Varying => decode_text(raw, column, charset, false),
        ColumnKind::Short => {
            let v = read_i32(raw)?;
            if column.scale < 0 {
                scaled(i64::from(v), column.scale)
            } else {
                i16::try_from(v)
                    .map(SqlValue::SmallInt)
                    .map_err(|_| TypeError::OutOfRange {
                        target_type: "SMALLINT",
                    })
            }
        }
        ColumnKind::Long => {
            let v = read_i32(raw)?;
            if column.scale < 0 {
                scaled(i64::from(v), column.scale)
            } else {
                Ok(SqlValue::Int(v))
            }
        }
        ColumnKind::Int64 => {
            let v = read_i64(raw)?;
            if column.scale < 0 {
                scaled(v, column.scale)
            } else {
                Ok(SqlValue::BigInt(v))
            }
        }
        ColumnKind::Float => Ok(SqlValue::Float(f32::from_bits(read_i32(raw)? as u32))),
        ColumnKind::Double | ColumnKind::DFloat => {
            Ok(SqlValue::Double(f64::from_bits(read_i64(raw)? as u64)))
        }
        ColumnKind::Date => Ok(SqlValue::Date(datetime::decode_date(read_i32(raw)?)?)),
        ColumnKind::Time => Ok(SqlValue::Time(datetime::decode_time(read_i32(raw)?)?)),
        ColumnKind::Timestamp => {
            check_len(raw, 8)?;
            let date = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
            let time = i32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
            Ok(SqlValue::Timestamp(datetime::decode_timestamp(date, time)?))
        }
        ColumnKind::Blob | ColumnKind::Array | ColumnKind::Quad => {
            Ok(SqlValue::BlobId(read_i64(raw)?))
        }
        ColumnKind::Boolean => {
            check_len(raw, 1)?;
            Ok(SqlValue::Bool(raw[0] != 0))
        }
        ColumnKind::Null => Ok(SqlValue::Null),
    }
}

fn decode_text(
    raw: &Bytes,
    column: &ColumnDescriptor,
    connection: Charset,
    fixed: bool,
) -> Result<SqlValue, TypeError> {
    let charset = Charset::for_column(connection, column.charset_id());
    if charset.is_octets() {
        return Ok(SqlValue::Binary(raw.clone()));
    }

    let text = charset.decode(raw)?;
    // Multi-byte CHAR columns are space padded to their byte length.
    if fixed && charset.bytes_per_char() > 1 {
        let chars = charset.char_count(column.length) as usize;
        if let Some((cut, _)) = text.char_indices().nth(chars) {
            return Ok(SqlValue::String(text[..cut].to_string()));
        }
    }
    Ok(SqlValue::String(text.into_owned()))
}

fn scaled(value: i64, scale: i32) -> Result<SqlValue, TypeError> {
    let digits = u32::try_from(-scale).map_err(|_| TypeError::OutOfRange {
        target_type: "NUMERIC",
    })?;
    Decimal::try_from_i128_with_scale(i128::from(value), digits)
        .map(SqlValue::Decimal)
        .map_err(|e| TypeError::InvalidDecimal(e.to_string()))
}

fn check_len(raw: &[u8], needed: usize) -> Result<(), TypeError> {
    if raw.len() < needed {
        return Err(TypeError::BufferTooSmall {
            needed,
            available: raw.len(),
        });
    }
    Ok(())
}

fn read_i32(raw: &[u8]) -> Result<i32, TypeError> {
    check_len(raw, 4)?;
    Ok(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn read_i64(raw: &[u8]) -> Result<i64, TypeError> {
    check_len(raw, 8)?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&raw[..8]);
    Ok(i64::from_be_bytes(bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gds_protocol::types::sql_type;

    fn raw(bytes: &[u8]) -> Bytes {
        Bytes::copy_from_slice(bytes)
    }

    #[test]
    fn test_null() {
        let col = ColumnDescriptor::new(sql_type::LONG + 1, 4);
        assert_eq!(decode_value(None, &col, Charset::NONE).unwrap(), SqlValue::Null);
    }

    #[test]
    fn test_integers() {
        let col = ColumnDescriptor::new(sql_type::SHORT, 2);
        let v = decode_value(Some(&raw(&(-5i32).to_be_bytes())), &col, Charset::NONE).unwrap();
        assert_eq!(v, SqlValue::SmallInt(-5));

        let col = ColumnDescriptor::new(sql_type::INT64, 8);
        let v = decode_value(Some(&raw(&(1i64 << 40).to_be_bytes())), &col, Charset::NONE).unwrap();
        assert_eq!(v, SqlValue::BigInt(1 << 40));
    }

    #[test]
    fn test_scaled_numeric() {
        let col = ColumnDescriptor::new(sql_type::INT64, 8).with_scale(-2);
        let v = decode_value(Some(&raw(&12345i64.to_be_bytes())), &col, Charset::NONE).unwrap();
        assert_eq!(v, SqlValue::Decimal(Decimal::new(12345, 2)));
    }

    #[test]
    fn test_varchar_and_octets() {
        let col = ColumnDescriptor::new(sql_type::VARYING, 10).with_sub_type(4);
        let v = decode_value(Some(&raw("héllo".as_bytes())), &col, Charset::NONE).unwrap();
        assert_eq!(v, SqlValue::String("héllo".into()));

        let col = ColumnDescriptor::new(sql_type::VARYING, 4).with_sub_type(1);
        let v = decode_value(Some(&raw(&[0, 1, 2])), &col, Charset::UTF8).unwrap();
        assert_eq!(v, SqlValue::Binary(raw(&[0, 1, 2])));
    }

    #[test]
    fn test_multibyte_char_trimmed_to_char_count() {
        // CHAR(2) in UTF8 occupies 8 bytes on the wire.
        let col = ColumnDescriptor::new(sql_type::TEXT, 8).with_sub_type(4);
        let v = decode_value(Some(&raw(b"ab      ")), &col, Charset::UTF8).unwrap();
        assert_eq!(v, SqlValue::String("ab".into()));
    }

    #[test]
    fn test_timestamp() {
        let col = ColumnDescriptor::new(sql_type::TIMESTAMP, 8);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&51_544i32.to_be_bytes());
        bytes.extend_from_slice(&(3_600 * 10_000i32).to_be_bytes());
        let v = decode_value(Some(&raw(&bytes)), &col, Charset::NONE).unwrap();
        assert_eq!(v.to_string(), "2000-01-01 01:00:00.0000");
    }

    #[test]
    fn test_short_buffer() {
        let col = ColumnDescriptor::new(sql_type::LONG, 4);
        assert!(matches!(
            decode_value(Some(&raw(&[1, 2])), &col, Charset::NONE),
            Err(TypeError::BufferTooSmall { needed: 4, available: 2 })
        ));
    }

    #[test]
    fn test_boolean_and_blob() {
        let col = ColumnDescriptor::new(sql_type::BOOLEAN, 1);
        assert_eq!(
            decode_value(Some(&raw(&[1])), &col, Charset::NONE).unwrap(),
            SqlValue::Bool(true)
        );
        let col = ColumnDescriptor::new(sql_type::BLOB, 8);
        assert_eq!(
            decode_value(Some(&raw(&7i64.to_be_bytes())), &col, Charset::NONE).unwrap(),
            SqlValue::BlobId(7)
        );
    }
}
