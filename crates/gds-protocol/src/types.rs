//! SQL type codes and statement types.

use crate::error::ProtocolError;
use crate::isc::blr;

/// Raw SQL type codes as reported by `isc_info_sql_type`.
///
/// The low bit of a reported code is the nullability flag; these constants
/// are the non-nullable (even) values.
pub mod sql_type {
    /// VARCHAR.
    pub const VARYING: i32 = 448;
    /// CHAR.
    pub const TEXT: i32 = 452;
    /// DOUBLE PRECISION.
    pub const DOUBLE: i32 = 480;
    /// FLOAT.
    pub const FLOAT: i32 = 482;
    /// INTEGER.
    pub const LONG: i32 = 496;
    /// SMALLINT.
    pub const SHORT: i32 = 500;
    /// TIMESTAMP.
    pub const TIMESTAMP: i32 = 510;
    /// BLOB.
    pub const BLOB: i32 = 520;
    /// VAX D_FLOAT.
    pub const D_FLOAT: i32 = 530;
    /// ARRAY.
    pub const ARRAY: i32 = 540;
    /// QUAD.
    pub const QUAD: i32 = 550;
    /// TIME.
    pub const TIME: i32 = 560;
    /// DATE.
    pub const DATE: i32 = 570;
    /// BIGINT.
    pub const INT64: i32 = 580;
    /// BOOLEAN.
    pub const BOOLEAN: i32 = 32764;
    /// Untyped NULL parameter.
    pub const NULL: i32 = 32766;
}

/// Closed set of column kinds.
///
/// Every descriptor maps to exactly one kind; the kind decides the wire
/// shape of values and the BLR used to describe messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Fixed-width CHAR.
    Text,
    /// Variable-width VARCHAR.
    Varying,
    /// SMALLINT, optionally scaled.
    Short,
    /// INTEGER, optionally scaled.
    Long,
    /// BIGINT, optionally scaled.
    Int64,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// VAX D_FLOAT, carried as a double.
    DFloat,
    /// Date and time of day.
    Timestamp,
    /// Date.
    Date,
    /// Time of day.
    Time,
    /// BLOB id.
    Blob,
    /// ARRAY id.
    Array,
    /// QUAD.
    Quad,
    /// BOOLEAN.
    Boolean,
    /// Untyped NULL.
    Null,
}

impl ColumnKind {
    /// Map a reported type code (nullability bit ignored).
    pub fn from_type_code(code: i32) -> Result<Self, ProtocolError> {
        Ok(match code & !1 {
            sql_type::TEXT => Self::Text,
            sql_type::VARYING => Self::Varying,
            sql_type::SHORT => Self::Short,
            sql_type::LONG => Self::Long,
            sql_type::INT64 => Self::Int64,
            sql_type::FLOAT => Self::Float,
            sql_type::DOUBLE => Self::Double,
            sql_type::D_FLOAT => Self::DFloat,
            sql_type::TIMESTAMP => Self::Timestamp,
            sql_type::DATE => Self::Date,
            sql_type::TIME => Self::Time,
            sql_type::BLOB => Self::Blob,
            sql_type::ARRAY => Self::Array,
            sql_type::QUAD => Self::Quad,
            sql_type::BOOLEAN => Self::Boolean,
            sql_type::NULL => Self::Null,
            _ => return Err(ProtocolError::UnsupportedSqlType(code)),
        })
    }

    /// Non-nullable type code for this kind.
    #[must_use]
    pub const fn type_code(self) -> i32 {
        match self {
            Self::Text => sql_type::TEXT,
            Self::Varying => sql_type::VARYING,
            Self::Short => sql_type::SHORT,
            Self::Long => sql_type::LONG,
            Self::Int64 => sql_type::INT64,
            Self::Float => sql_type::FLOAT,
            Self::Double => sql_type::DOUBLE,
            Self::DFloat => sql_type::D_FLOAT,
            Self::Timestamp => sql_type::TIMESTAMP,
            Self::Date => sql_type::DATE,
            Self::Time => sql_type::TIME,
            Self::Blob => sql_type::BLOB,
            Self::Array => sql_type::ARRAY,
            Self::Quad => sql_type::QUAD,
            Self::Boolean => sql_type::BOOLEAN,
            Self::Null => sql_type::NULL,
        }
    }

    /// BLR opcode describing this kind in a message format.
    #[must_use]
    pub const fn blr_code(self) -> u8 {
        match self {
            Self::Text => blr::TEXT,
            Self::Varying => blr::VARYING,
            Self::Short => blr::SHORT,
            Self::Long => blr::LONG,
            Self::Int64 => blr::INT64,
            Self::Float => blr::FLOAT,
            Self::Double => blr::DOUBLE,
            Self::DFloat => blr::D_FLOAT,
            Self::Timestamp => blr::TIMESTAMP,
            Self::Date => blr::SQL_DATE,
            Self::Time => blr::SQL_TIME,
            Self::Blob | Self::Array | Self::Quad => blr::QUAD,
            Self::Boolean => blr::BOOL,
            // An untyped NULL travels as an empty CHAR.
            Self::Null => blr::TEXT,
        }
    }

    /// Whether values of this kind may carry a decimal scale.
    #[must_use]
    pub const fn is_exact_numeric(self) -> bool {
        matches!(self, Self::Short | Self::Long | Self::Int64)
    }

    /// Whether values of this kind are character data.
    #[must_use]
    pub const fn is_character(self) -> bool {
        matches!(self, Self::Text | Self::Varying)
    }

    /// Human readable SQL name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Text => "CHAR",
            Self::Varying => "VARCHAR",
            Self::Short => "SMALLINT",
            Self::Long => "INTEGER",
            Self::Int64 => "BIGINT",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE PRECISION",
            Self::DFloat => "D_FLOAT",
            Self::Timestamp => "TIMESTAMP",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Blob => "BLOB",
            Self::Array => "ARRAY",
            Self::Quad => "QUAD",
            Self::Boolean => "BOOLEAN",
            Self::Null => "NULL",
        }
    }
}

/// Statement type reported by `isc_info_sql_stmt_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatementType {
    /// Not yet known.
    #[default]
    None,
    /// SELECT.
    Select,
    /// INSERT.
    Insert,
    /// UPDATE.
    Update,
    /// DELETE.
    Delete,
    /// Data definition.
    Ddl,
    /// Blob segment read.
    GetSegment,
    /// Blob segment write.
    PutSegment,
    /// EXECUTE PROCEDURE.
    StoredProcedure,
    /// SET TRANSACTION.
    StartTransaction,
    /// COMMIT.
    Commit,
    /// ROLLBACK.
    Rollback,
    /// SELECT ... FOR UPDATE.
    SelectForUpdate,
    /// SET GENERATOR.
    SetGenerator,
    /// SAVEPOINT.
    SavePoint,
}

impl StatementType {
    /// Map a raw statement type code.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Select,
            2 => Self::Insert,
            3 => Self::Update,
            4 => Self::Delete,
            5 => Self::Ddl,
            6 => Self::GetSegment,
            7 => Self::PutSegment,
            8 => Self::StoredProcedure,
            9 => Self::StartTransaction,
            10 => Self::Commit,
            11 => Self::Rollback,
            12 => Self::SelectForUpdate,
            13 => Self::SetGenerator,
            14 => Self::SavePoint,
            _ => Self::None,
        }
    }

    /// Raw statement type code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Select => 1,
            Self::Insert => 2,
            Self::Update => 3,
            Self::Delete => 4,
            Self::Ddl => 5,
            Self::GetSegment => 6,
            Self::PutSegment => 7,
            Self::StoredProcedure => 8,
            Self::StartTransaction => 9,
            Self::Commit => 10,
            Self::Rollback => 11,
            Self::SelectForUpdate => 12,
            Self::SetGenerator => 13,
            Self::SavePoint => 14,
        }
    }

    /// Whether executing this statement opens a server-side cursor.
    #[must_use]
    pub const fn returns_cursor(self) -> bool {
        matches!(
            self,
            Self::Select | Self::SelectForUpdate | Self::StoredProcedure
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ignores_nullable_bit() {
        assert_eq!(ColumnKind::from_type_code(496).unwrap(), ColumnKind::Long);
        assert_eq!(ColumnKind::from_type_code(497).unwrap(), ColumnKind::Long);
        assert_eq!(ColumnKind::from_type_code(449).unwrap(), ColumnKind::Varying);
    }

    #[test]
    fn test_unknown_type_code() {
        assert_eq!(
            ColumnKind::from_type_code(12),
            Err(ProtocolError::UnsupportedSqlType(12))
        );
    }

    #[test]
    fn test_blob_family_uses_quad_blr() {
        assert_eq!(ColumnKind::Blob.blr_code(), blr::QUAD);
        assert_eq!(ColumnKind::Array.blr_code(), blr::QUAD);
        assert_eq!(ColumnKind::Date.blr_code(), blr::SQL_DATE);
    }

    #[test]
    fn test_statement_type_cursor() {
        assert!(StatementType::from_code(1).returns_cursor());
        assert!(StatementType::from_code(8).returns_cursor());
        assert!(StatementType::from_code(12).returns_cursor());
        assert!(!StatementType::from_code(2).returns_cursor());
        assert_eq!(StatementType::from_code(99), StatementType::None);
    }
}
