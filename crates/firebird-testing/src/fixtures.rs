//! Column descriptor fixtures.
//!
//! Shorthands for the descriptors a server reports for common column
//! types. Nullable variants set the low bit of the SQL type code.

use gds_protocol::ColumnDescriptor;
use gds_protocol::types::sql_type;

/// Charset id of UTF8.
pub const UTF8: i32 = 4;

fn named(column: ColumnDescriptor, name: &str) -> ColumnDescriptor {
    column.with_name(name, name)
}

/// Nullable INTEGER column.
#[must_use]
pub fn int_column(name: &str) -> ColumnDescriptor {
    named(ColumnDescriptor::new(sql_type::LONG + 1, 4), name)
}

/// Nullable SMALLINT column.
#[must_use]
pub fn smallint_column(name: &str) -> ColumnDescriptor {
    named(ColumnDescriptor::new(sql_type::SHORT + 1, 2), name)
}

/// Nullable BIGINT column.
#[must_use]
pub fn bigint_column(name: &str) -> ColumnDescriptor {
    named(ColumnDescriptor::new(sql_type::INT64 + 1, 8), name)
}

/// Nullable NUMERIC(18, `scale`) column.
#[must_use]
pub fn numeric_column(name: &str, scale: i32) -> ColumnDescriptor {
    named(
        ColumnDescriptor::new(sql_type::INT64 + 1, 8).with_scale(-scale),
        name,
    )
}

/// Nullable DOUBLE PRECISION column.
#[must_use]
pub fn double_column(name: &str) -> ColumnDescriptor {
    named(ColumnDescriptor::new(sql_type::DOUBLE + 1, 8), name)
}

/// Nullable VARCHAR(`chars`) column in UTF8.
#[must_use]
pub fn varchar_column(name: &str, chars: i32) -> ColumnDescriptor {
    named(
        ColumnDescriptor::new(sql_type::VARYING + 1, chars * 4).with_sub_type(UTF8),
        name,
    )
}

/// Nullable CHAR(`chars`) column in UTF8.
#[must_use]
pub fn char_column(name: &str, chars: i32) -> ColumnDescriptor {
    named(
        ColumnDescriptor::new(sql_type::TEXT + 1, chars * 4).with_sub_type(UTF8),
        name,
    )
}

/// Nullable TIMESTAMP column.
#[must_use]
pub fn timestamp_column(name: &str) -> ColumnDescriptor {
    named(ColumnDescriptor::new(sql_type::TIMESTAMP + 1, 8), name)
}

/// Nullable DATE column.
#[must_use]
pub fn date_column(name: &str) -> ColumnDescriptor {
    named(ColumnDescriptor::new(sql_type::DATE + 1, 4), name)
}

/// Nullable BOOLEAN column.
#[must_use]
pub fn boolean_column(name: &str) -> ColumnDescriptor {
    named(ColumnDescriptor::new(sql_type::BOOLEAN + 1, 1), name)
}

/// Nullable BLOB column.
#[must_use]
pub fn blob_column(name: &str) -> ColumnDescriptor {
    named(ColumnDescriptor::new(sql_type::BLOB + 1, 8), name)
}

/// Nullable text BLOB column (subtype 1).
#[must_use]
pub fn text_blob_column(name: &str) -> ColumnDescriptor {
    named(ColumnDescriptor::new(sql_type::BLOB + 1, 8).with_sub_type(1), name)
}

/// Mark a fixture column NOT NULL.
#[must_use]
pub fn not_null(mut column: ColumnDescriptor) -> ColumnDescriptor {
    column.sql_type &= !1;
    column
}
