//! Statement and database info answers.

use crate::error::ProtocolError;
use crate::isc::{info, req_info, sql_info};
use crate::types::StatementType;
use crate::vax::{InfoCursor, vax_integer};

/// Items requested to learn a statement's type.
pub const STATEMENT_TYPE_ITEMS: [u8; 2] = [sql_info::STMT_TYPE, info::END];

/// Items requested to learn a statement's modification counts.
pub const RECORDS_ITEMS: [u8; 2] = [sql_info::RECORDS, info::END];

/// Items requested to obtain a statement's execution plan.
pub const PLAN_ITEMS: [u8; 2] = [sql_info::GET_PLAN, info::END];

/// Parse the answer to [`STATEMENT_TYPE_ITEMS`].
pub fn parse_statement_type(buf: &[u8]) -> Result<StatementType, ProtocolError> {
    let mut cursor = InfoCursor::new(buf);
    while let Ok(item) = cursor.next_item() {
        match item {
            sql_info::STMT_TYPE => {
                return Ok(StatementType::from_code(cursor.read_cluster_int()?));
            }
            info::END => break,
            _ => {
                cursor.read_cluster()?;
            }
        }
    }
    Err(ProtocolError::MalformedInfo("statement type missing"))
}

/// Row counts reported by `isc_info_sql_records`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    /// Rows selected.
    pub selected: i64,
    /// Rows inserted.
    pub inserted: i64,
    /// Rows updated.
    pub updated: i64,
    /// Rows deleted.
    pub deleted: i64,
}

impl RecordCounts {
    /// Rows modified by the statement (selected rows are not counted).
    #[must_use]
    pub fn modified(&self) -> i64 {
        self.inserted + self.updated + self.deleted
    }
}

/// Parse the answer to [`RECORDS_ITEMS`].
pub fn parse_record_counts(buf: &[u8]) -> Result<RecordCounts, ProtocolError> {
    let mut counts = RecordCounts::default();
    let mut cursor = InfoCursor::new(buf);
    while let Ok(item) = cursor.next_item() {
        match item {
            sql_info::RECORDS => {
                let mut inner = InfoCursor::new(cursor.read_cluster()?);
                while let Ok(sub) = inner.next_item() {
                    if sub == info::END {
                        break;
                    }
                    let value = inner.read_cluster_int()?;
                    match sub {
                        req_info::SELECT_COUNT => counts.selected = value,
                        req_info::INSERT_COUNT => counts.inserted = value,
                        req_info::UPDATE_COUNT => counts.updated = value,
                        req_info::DELETE_COUNT => counts.deleted = value,
                        _ => {}
                    }
                }
            }
            info::END => break,
            _ => {
                cursor.read_cluster()?;
            }
        }
    }
    Ok(counts)
}

/// Parse the answer to [`PLAN_ITEMS`]; `None` when the server sent no plan.
pub fn parse_plan(buf: &[u8]) -> Result<Option<String>, ProtocolError> {
    let mut cursor = InfoCursor::new(buf);
    while let Ok(item) = cursor.next_item() {
        match item {
            sql_info::GET_PLAN => {
                let plan = cursor.read_cluster_string()?;
                return Ok(Some(plan.trim().to_string()));
            }
            info::END => break,
            _ => {
                cursor.read_cluster()?;
            }
        }
    }
    Ok(None)
}

/// Decoded value of a database info item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoValue {
    /// Counter or size.
    Integer(i64),
    /// Flag.
    Bool(bool),
    /// Text answer.
    Text(String),
    /// Several text fields (database file and site).
    Texts(Vec<String>),
    /// Several integers (implementation bytes, active transactions).
    Integers(Vec<i64>),
    /// Per-table operation counters as `(relation id, count)` pairs.
    TableCounts(Vec<(i32, i64)>),
}

/// Build a database info request for the given items.
#[must_use]
pub fn database_info_items(items: &[u8]) -> Vec<u8> {
    let mut request = Vec::with_capacity(items.len() + 1);
    request.extend_from_slice(items);
    request.push(info::END);
    request
}

/// Decode a database info answer into `(item, value)` pairs.
///
/// Repeated `isc_info_active_transactions` clusters are merged into one
/// entry.
pub fn decode_database_info(buf: &[u8]) -> Result<Vec<(u8, InfoValue)>, ProtocolError> {
    let mut out: Vec<(u8, InfoValue)> = Vec::new();
    let mut cursor = InfoCursor::new(buf);

    loop {
        let item = match cursor.next_item() {
            Ok(item) => item,
            Err(ProtocolError::UnexpectedEof) => break,
            Err(e) => return Err(e),
        };
        match item {
            info::END => break,
            info::TRUNCATED => return Err(ProtocolError::MalformedInfo("database info truncated")),
            info::ERROR => return Err(ProtocolError::MalformedInfo("database info item rejected")),
            _ => {}
        }

        let data = cursor.read_cluster()?;
        let value = decode_item(item, data)?;

        if item == info::ACTIVE_TRANSACTIONS {
            if let Some((_, InfoValue::Integers(ids))) =
                out.iter_mut().find(|(existing, _)| *existing == item)
            {
                if let InfoValue::Integers(more) = value {
                    ids.extend(more);
                }
                continue;
            }
        }
        out.push((item, value));
    }

    Ok(out)
}

fn byte_at(data: &[u8], pos: usize) -> Result<u8, ProtocolError> {
    data.get(pos).copied().ok_or(ProtocolError::UnexpectedEof)
}

fn counted_string(data: &[u8], len_pos: usize) -> Result<(String, usize), ProtocolError> {
    let len = usize::from(byte_at(data, len_pos)?);
    let start = len_pos + 1;
    let bytes = data
        .get(start..start + len)
        .ok_or(ProtocolError::UnexpectedEof)?;
    Ok((String::from_utf8_lossy(bytes).into_owned(), start + len))
}

fn decode_item(item: u8, data: &[u8]) -> Result<InfoValue, ProtocolError> {
    Ok(match item {
        info::BASE_LEVEL => {
            InfoValue::Text(format!("{}.{}", byte_at(data, 0)?, byte_at(data, 1)?))
        }
        info::DB_ID => {
            // Count byte, then counted file name, then counted site name.
            let (file, next) = counted_string(data, 1)?;
            let (site, _) = counted_string(data, next)?;
            InfoValue::Texts(vec![file, site])
        }
        info::IMPLEMENTATION => InfoValue::Integers(vec![
            i64::from(byte_at(data, 0)?),
            i64::from(byte_at(data, 1)?),
            i64::from(byte_at(data, 2)?),
        ]),
        info::ISC_VERSION | info::FIREBIRD_VERSION => {
            // Count byte, then the first counted version string.
            InfoValue::Text(counted_string(data, 1)?.0)
        }
        info::NO_RESERVE | info::FORCED_WRITES | info::DB_READ_ONLY => {
            InfoValue::Bool(vax_integer(data, 0, data.len())? == 1)
        }
        info::DB_CLASS => {
            let class = vax_integer(data, 0, data.len())?;
            InfoValue::Text(
                if class == info::CLASSIC_ACCESS {
                    "CLASSIC SERVER"
                } else if class == info::SERVER_ACCESS {
                    "SUPER SERVER"
                } else {
                    "UNKNOWN"
                }
                .to_string(),
            )
        }
        info::ACTIVE_TRANSACTIONS => {
            InfoValue::Integers(vec![vax_integer(data, 0, data.len())?])
        }
        info::READ_SEQ_COUNT
        | info::READ_IDX_COUNT
        | info::INSERT_COUNT
        | info::UPDATE_COUNT
        | info::DELETE_COUNT
        | info::BACKOUT_COUNT
        | info::PURGE_COUNT
        | info::EXPUNGE_COUNT => {
            let mut counts = Vec::with_capacity(data.len() / 6);
            let mut pos = 0;
            while pos + 6 <= data.len() {
                let relation = vax_integer(data, pos, 2)? as i32;
                let count = vax_integer(data, pos + 2, 4)?;
                counts.push((relation, count));
                pos += 6;
            }
            InfoValue::TableCounts(counts)
        }
        _ => InfoValue::Integer(vax_integer(data, 0, data.len())?),
    })
}
