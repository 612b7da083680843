//! # firebird-types
//!
//! Firebird to Rust type mappings and conversions.
//!
//! This crate provides bidirectional mapping between Firebird data types
//! and Rust types, handling the encoding and decoding of values in the GDS
//! row format, character set transliteration, and the server's date/time
//! representation.
//!
//! ## Type Mappings
//!
//! | Firebird Type | Rust Type |
//! |-----------------|-----------|
//! | `BOOLEAN` | `bool` |
//! | `SMALLINT` | `i16` |
//! | `INTEGER` | `i32` |
//! | `BIGINT` | `i64` |
//! | `FLOAT` | `f32` |
//! | `DOUBLE PRECISION` | `f64` |
//! | `NUMERIC`/`DECIMAL` | `rust_decimal::Decimal` |
//! | `CHAR`/`VARCHAR` | `String` |
//! | `CHAR`/`VARCHAR` (`OCTETS`) | `bytes::Bytes` |
//! | `DATE` | `chrono::NaiveDate` |
//! | `TIME` | `chrono::NaiveTime` |
//! | `TIMESTAMP` | `chrono::NaiveDateTime` |
//! | `BLOB`, `ARRAY` | blob id (`i64`) on the wire |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod charset;
pub mod datetime;
pub mod decode;
pub mod encode;
pub mod error;
pub mod from_sql;
pub mod to_sql;
pub mod value;

pub use charset::Charset;
pub use decode::decode_value;
pub use encode::encode_value;
pub use error::TypeError;
pub use from_sql::FromSql;
pub use to_sql::ToSql;
pub use value::SqlValue;
