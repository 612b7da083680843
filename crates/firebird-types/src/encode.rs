//! GDS binary encoding for SQL values.
//!
//! Parameters are sent as one message laid out by the input descriptors:
//! each value in its column's wire shape followed by a null indicator.
//! Values are converted to the column's type here, so a caller can bind a
//! string to a numeric column or an integer to a VARCHAR.

use bytes::{BufMut, BytesMut};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use gds_protocol::row::{write_not_null, write_null};
use gds_protocol::{ColumnDescriptor, ColumnKind, xdr};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::charset::Charset;
use crate::datetime;
use crate::error::TypeError;
use crate::value::SqlValue;

/// Encode one parameter value, including its null indicator.
pub fn encode_value(
    value: &SqlValue,
    column: &ColumnDescriptor,
    charset: Charset,
    dst: &mut BytesMut,
) -> Result<(), TypeError> {
    if value.is_null() {
        write_null(dst, column)?;
        return Ok(());
    }

    match column.kind()? {
        ColumnKind::Text => {
            let bytes = text_bytes(value, column, charset)?;
            xdr::write_fixed_text(dst, &bytes, column.length.max(0) as usize);
        }
        ColumnKind::Varying => {
            let bytes = text_bytes(value, column, charset)?;
            xdr::write_buffer(dst, &bytes);
        }
        ColumnKind::Short => {
            let v = scaled_integer(value, column.scale)?;
            let v = i16::try_from(v).map_err(|_| TypeError::OutOfRange {
                target_type: "SMALLINT",
            })?;
            dst.put_i32(i32::from(v));
        }
        ColumnKind::Long => {
            let v = scaled_integer(value, column.scale)?;
            let v = i32::try_from(v).map_err(|_| TypeError::OutOfRange {
                target_type: "INTEGER",
            })?;
            dst.put_i32(v);
        }
        ColumnKind::Int64 => dst.put_i64(scaled_integer(value, column.scale)?),
        ColumnKind::Float => dst.put_f32(to_f64(value)? as f32),
        ColumnKind::Double | ColumnKind::DFloat => dst.put_f64(to_f64(value)?),
        ColumnKind::Date => dst.put_i32(datetime::encode_date(to_date(value)?)),
        ColumnKind::Time => dst.put_i32(datetime::encode_time(to_time(value)?)),
        ColumnKind::Timestamp => {
            let (date, time) = datetime::encode_timestamp(to_timestamp(value)?);
            dst.put_i32(date);
            dst.put_i32(time);
        }
        ColumnKind::Blob | ColumnKind::Array | ColumnKind::Quad => match value {
            SqlValue::BlobId(id) => dst.put_i64(*id),
            other => {
                return Err(TypeError::UnsupportedConversion {
                    from: other.type_name().to_string(),
                    to: "BLOB",
                });
            }
        },
        ColumnKind::Boolean => {
            let v = to_bool(value)?;
            xdr::write_opaque(dst, &[u8::from(v)]);
        }
        ColumnKind::Null => {
            return Err(TypeError::UnsupportedConversion {
                from: value.type_name().to_string(),
                to: "NULL",
            });
        }
    }

    write_not_null(dst);
    Ok(())
}

/// Encoded text for a CHAR/VARCHAR column.
///
/// Fails with [`TypeError::Truncation`] when the encoded bytes exceed the
/// column's declared byte length.
pub fn text_bytes(
    value: &SqlValue,
    column: &ColumnDescriptor,
    connection: Charset,
) -> Result<Vec<u8>, TypeError> {
    let charset = Charset::for_column(connection, column.charset_id());
    let bytes = match value {
        SqlValue::Binary(b) => b.to_vec(),
        SqlValue::String(s) => charset.encode(s)?.into_owned(),
        other => charset.encode(&other.to_string())?.into_owned(),
    };

    let max = column.length.max(0) as usize;
    if bytes.len() > max {
        return Err(TypeError::Truncation {
            length: bytes.len(),
            max,
        });
    }
    Ok(bytes)
}

/// Convert a value to the integer representation of a column with `scale`.
pub fn scaled_integer(value: &SqlValue, scale: i32) -> Result<i64, TypeError> {
    let out_of_range = || TypeError::OutOfRange {
        target_type: "NUMERIC",
    };

    if scale >= 0 {
        return match value {
            SqlValue::SmallInt(v) => Ok(i64::from(*v)),
            SqlValue::Int(v) => Ok(i64::from(*v)),
            SqlValue::BigInt(v) => Ok(*v),
            SqlValue::Bool(v) => Ok(i64::from(*v)),
            _ => to_decimal(value)?
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .ok_or_else(out_of_range),
        };
    }

    let digits = u32::try_from(-scale).map_err(|_| out_of_range())?;
    let mut d = to_decimal(value)?
        .round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero);
    d.rescale(digits);
    if d.scale() != digits {
        return Err(out_of_range());
    }
    i64::try_from(d.mantissa()).map_err(|_| out_of_range())
}

fn to_decimal(value: &SqlValue) -> Result<Decimal, TypeError> {
    match value {
        SqlValue::Decimal(d) => Ok(*d),
        SqlValue::SmallInt(v) => Ok(Decimal::from(*v)),
        SqlValue::Int(v) => Ok(Decimal::from(*v)),
        SqlValue::BigInt(v) => Ok(Decimal::from(*v)),
        SqlValue::Bool(v) => Ok(Decimal::from(u8::from(*v))),
        SqlValue::Float(v) => {
            Decimal::try_from(*v).map_err(|e| TypeError::InvalidDecimal(e.to_string()))
        }
        SqlValue::Double(v) => {
            Decimal::try_from(*v).map_err(|e| TypeError::InvalidDecimal(e.to_string()))
        }
        SqlValue::String(s) => s
            .trim()
            .parse::<Decimal>()
            .map_err(|e| TypeError::InvalidDecimal(e.to_string())),
        other => Err(TypeError::TypeMismatch {
            expected: "numeric",
            actual: other.type_name().to_string(),
        }),
    }
}

fn to_f64(value: &SqlValue) -> Result<f64, TypeError> {
    match value {
        SqlValue::Float(v) => Ok(f64::from(*v)),
        SqlValue::Double(v) => Ok(*v),
        SqlValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| TypeError::TypeMismatch {
                expected: "floating point",
                actual: format!("'{s}'"),
            }),
        other => to_decimal(other)?.to_f64().ok_or(TypeError::OutOfRange {
            target_type: "DOUBLE PRECISION",
        }),
    }
}

fn to_bool(value: &SqlValue) -> Result<bool, TypeError> {
    match value {
        SqlValue::Bool(v) => Ok(*v),
        SqlValue::SmallInt(v) => Ok(*v != 0),
        SqlValue::Int(v) => Ok(*v != 0),
        SqlValue::BigInt(v) => Ok(*v != 0),
        SqlValue::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        SqlValue::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(TypeError::TypeMismatch {
            expected: "BOOLEAN",
            actual: other.type_name().to_string(),
        }),
    }
}

fn parse_err(expected: &'static str, s: &str) -> TypeError {
    TypeError::InvalidDateTime(format!("'{s}' is not a valid {expected}"))
}

fn to_date(value: &SqlValue) -> Result<NaiveDate, TypeError> {
    match value {
        SqlValue::Date(d) => Ok(*d),
        SqlValue::Timestamp(ts) => Ok(ts.date()),
        SqlValue::String(s) => {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| parse_err("DATE", s))
        }
        other => Err(TypeError::TypeMismatch {
            expected: "DATE",
            actual: other.type_name().to_string(),
        }),
    }
}

fn to_time(value: &SqlValue) -> Result<NaiveTime, TypeError> {
    match value {
        SqlValue::Time(t) => Ok(*t),
        SqlValue::Timestamp(ts) => Ok(ts.time()),
        SqlValue::String(s) => {
            NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").map_err(|_| parse_err("TIME", s))
        }
        other => Err(TypeError::TypeMismatch {
            expected: "TIME",
            actual: other.type_name().to_string(),
        }),
    }
}

fn to_timestamp(value: &SqlValue) -> Result<NaiveDateTime, TypeError> {
    match value {
        SqlValue::Timestamp(ts) => Ok(*ts),
        SqlValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
        SqlValue::String(s) => {
            let s = s.trim();
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
                })
                .map_err(|_| parse_err("TIMESTAMP", s))
        }
        other => Err(TypeError::TypeMismatch {
            expected: "TIMESTAMP",
            actual: other.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::decode::decode_value;
    use crate::from_sql::FromSql;
    use bytes::{Buf, Bytes};
    use gds_protocol::row::read_column;
    use gds_protocol::types::sql_type;
    use proptest::prelude::*;

    fn round_trip(value: &SqlValue, column: &ColumnDescriptor) -> SqlValue {
        let mut buf = BytesMut::new();
        encode_value(value, column, Charset::UTF8, &mut buf).unwrap();
        let mut src = buf.freeze();
        let raw = read_column(&mut src, column).unwrap();
        assert!(!src.has_remaining());
        decode_value(raw.as_ref(), column, Charset::UTF8).unwrap()
    }

    #[test]
    fn test_null_writes_indicator() {
        let col = ColumnDescriptor::new(sql_type::LONG + 1, 4);
        let mut buf = BytesMut::new();
        encode_value(&SqlValue::Null, &col, Charset::NONE, &mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_string_truncation_rejected() {
        let col = ColumnDescriptor::new(sql_type::VARYING, 4).with_sub_type(4);
        let mut buf = BytesMut::new();
        let err = encode_value(&SqlValue::from("héllo"), &col, Charset::UTF8, &mut buf);
        assert!(matches!(err, Err(TypeError::Truncation { length: 6, max: 4 })));
    }

    #[test]
    fn test_char_is_space_padded() {
        let col = ColumnDescriptor::new(sql_type::TEXT, 5);
        let mut buf = BytesMut::new();
        encode_value(&SqlValue::from("ab"), &col, Charset::NONE, &mut buf).unwrap();
        assert_eq!(&buf[..5], b"ab   ");
    }

    #[test]
    fn test_string_to_numeric_column() {
        let col = ColumnDescriptor::new(sql_type::LONG, 4).with_scale(-2);
        assert_eq!(
            round_trip(&SqlValue::from("12.345"), &col),
            SqlValue::Decimal(Decimal::new(1235, 2))
        );
    }

    #[test]
    fn test_smallint_overflow() {
        let col = ColumnDescriptor::new(sql_type::SHORT, 2);
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_value(&SqlValue::Int(70_000), &col, Charset::NONE, &mut buf),
            Err(TypeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_blob_requires_id() {
        let col = ColumnDescriptor::new(sql_type::BLOB, 8);
        let mut buf = BytesMut::new();
        assert!(encode_value(&SqlValue::from("text"), &col, Charset::NONE, &mut buf).is_err());
        assert_eq!(round_trip(&SqlValue::BlobId(99), &col), SqlValue::BlobId(99));
    }

    #[test]
    fn test_timestamp_from_string() {
        let col = ColumnDescriptor::new(sql_type::TIMESTAMP, 8);
        let v = round_trip(&SqlValue::from("2024-02-29 23:59:59.1234"), &col);
        assert_eq!(v.to_string(), "2024-02-29 23:59:59.1234");
    }

    #[test]
    fn test_octets_pass_through() {
        let col = ColumnDescriptor::new(sql_type::VARYING, 8).with_sub_type(1);
        let value = SqlValue::Binary(Bytes::from_static(&[0xDE, 0xAD]));
        assert_eq!(round_trip(&value, &col), value);
    }

    proptest! {
        #[test]
        fn prop_int_round_trip(v in any::<i32>()) {
            let col = ColumnDescriptor::new(sql_type::LONG, 4);
            prop_assert_eq!(round_trip(&SqlValue::Int(v), &col), SqlValue::Int(v));
        }

        #[test]
        fn prop_bigint_round_trip(v in any::<i64>()) {
            let col = ColumnDescriptor::new(sql_type::INT64, 8);
            prop_assert_eq!(round_trip(&SqlValue::BigInt(v), &col), SqlValue::BigInt(v));
        }

        #[test]
        fn prop_double_round_trip(v in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
            let col = ColumnDescriptor::new(sql_type::DOUBLE, 8);
            prop_assert_eq!(round_trip(&SqlValue::Double(v), &col), SqlValue::Double(v));
        }

        #[test]
        fn prop_scaled_round_trip(mantissa in -1_000_000_000i64..1_000_000_000, digits in 0u32..6) {
            let col = ColumnDescriptor::new(sql_type::INT64, 8).with_scale(-(digits as i32));
            let value = Decimal::new(mantissa, digits);
            let decoded = round_trip(&SqlValue::Decimal(value), &col);
            // Scale 0 columns decode as plain integers.
            if digits == 0 {
                prop_assert_eq!(&decoded, &SqlValue::BigInt(mantissa));
            }
            prop_assert_eq!(Decimal::from_sql(&decoded).unwrap(), value);
        }

        #[test]
        fn prop_varchar_round_trip(s in "\\PC{0,20}") {
            let col = ColumnDescriptor::new(sql_type::VARYING, 80).with_sub_type(4);
            prop_assert_eq!(round_trip(&SqlValue::String(s.clone()), &col), SqlValue::String(s));
        }

        #[test]
        fn prop_timestamp_round_trip(days in -600_000i32..2_000_000, units in 0i32..864_000_000) {
            let col = ColumnDescriptor::new(sql_type::TIMESTAMP, 8);
            let ts = datetime::decode_timestamp(days, units).unwrap();
            prop_assert_eq!(round_trip(&SqlValue::Timestamp(ts), &col), SqlValue::Timestamp(ts));
        }
    }
}
