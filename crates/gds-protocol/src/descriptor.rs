//! Column and parameter descriptors.
//!
//! Descriptors are obtained by asking the server for `isc_info_sql_select`
//! (output columns) or `isc_info_sql_bind` (input parameters). The answer is
//! a tagged buffer that may be truncated, in which case the request is
//! repeated with `isc_info_sql_sqlda_start` to resume after the last
//! complete descriptor.

use crate::error::ProtocolError;
use crate::isc::{info, sql_info};
use crate::types::ColumnKind;
use crate::vax::{InfoCursor, write_vax};

/// Items requested to describe the output columns of a statement.
pub const DESCRIBE_SELECT_ITEMS: [u8; 12] = [
    sql_info::SELECT,
    sql_info::DESCRIBE_VARS,
    sql_info::SQLDA_SEQ,
    sql_info::TYPE,
    sql_info::SUB_TYPE,
    sql_info::SCALE,
    sql_info::LENGTH,
    sql_info::FIELD,
    sql_info::RELATION,
    sql_info::OWNER,
    sql_info::ALIAS,
    sql_info::DESCRIBE_END,
];

/// Items requested to describe the input parameters of a statement.
pub const DESCRIBE_BIND_ITEMS: [u8; 12] = [
    sql_info::BIND,
    sql_info::DESCRIBE_VARS,
    sql_info::SQLDA_SEQ,
    sql_info::TYPE,
    sql_info::SUB_TYPE,
    sql_info::SCALE,
    sql_info::LENGTH,
    sql_info::FIELD,
    sql_info::RELATION,
    sql_info::OWNER,
    sql_info::ALIAS,
    sql_info::DESCRIBE_END,
];

/// Metadata for one output column or input parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// Raw type code; the low bit is the nullability flag.
    pub sql_type: i32,
    /// Subtype (character set for text, blob subtype for blobs).
    pub sub_type: i32,
    /// Power-of-ten exponent for exact numerics.
    pub scale: i32,
    /// Declared byte length.
    pub length: i32,
    /// Column or parameter name.
    pub field: String,
    /// Owning relation.
    pub relation: String,
    /// Owner of the relation.
    pub owner: String,
    /// Alias given in the select list.
    pub alias: String,
}

impl ColumnDescriptor {
    /// Create a descriptor for a type code and byte length.
    #[must_use]
    pub fn new(sql_type: i32, length: i32) -> Self {
        Self {
            sql_type,
            length,
            ..Self::default()
        }
    }

    /// Set the scale.
    #[must_use]
    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = scale;
        self
    }

    /// Set the subtype.
    #[must_use]
    pub fn with_sub_type(mut self, sub_type: i32) -> Self {
        self.sub_type = sub_type;
        self
    }

    /// Set field and alias names.
    #[must_use]
    pub fn with_name(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.field = field.into();
        self.alias = alias.into();
        self
    }

    /// Column kind derived from the type code.
    pub fn kind(&self) -> Result<ColumnKind, ProtocolError> {
        ColumnKind::from_type_code(self.sql_type)
    }

    /// Whether the column accepts NULL, taken from the type code's low bit.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.sql_type & 1 == 1
    }

    /// Character set id of text columns.
    #[must_use]
    pub fn charset_id(&self) -> i32 {
        self.sub_type & 0xFF
    }

    /// Name exposed to callers: the alias, or the field name when unaliased.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.alias.is_empty() {
            &self.field
        } else {
            &self.alias
        }
    }
}

/// Result of parsing one (possibly truncated) describe answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeProgress {
    /// All descriptors were read.
    Complete,
    /// The buffer was truncated after `last_index` complete descriptors.
    Truncated {
        /// One-based index of the last complete descriptor.
        last_index: usize,
    },
}

/// Accumulates descriptors across one or more describe answers.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSet {
    slots: Option<Vec<Option<ColumnDescriptor>>>,
}

impl DescriptorSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one answer buffer into the set.
    pub fn parse(&mut self, buf: &[u8]) -> Result<DescribeProgress, ProtocolError> {
        let mut cursor = InfoCursor::new(buf);

        // Section tag (select or bind), then the descriptor count.
        let section = cursor.next_item()?;
        if section != sql_info::SELECT && section != sql_info::BIND {
            return Err(ProtocolError::InvalidDescriptorItem(section));
        }
        let vars = cursor.next_item()?;
        if vars != sql_info::DESCRIBE_VARS {
            return Err(ProtocolError::InvalidDescriptorItem(vars));
        }
        let count = cursor.read_cluster_int()?;
        if count < 0 {
            return Err(ProtocolError::MalformedInfo("negative descriptor count"));
        }
        let count = count as usize;
        let slots = self.slots.get_or_insert_with(|| vec![None; count]);

        let mut last_index = 0usize;
        let mut index = 0usize;
        let mut current = ColumnDescriptor::default();

        loop {
            let item = match cursor.next_item() {
                Ok(item) => item,
                // Some servers omit the terminator after the last descriptor.
                Err(ProtocolError::UnexpectedEof) => break,
                Err(e) => return Err(e),
            };
            match item {
                info::END => break,
                info::TRUNCATED => return Ok(DescribeProgress::Truncated { last_index }),
                sql_info::SQLDA_SEQ => {
                    let seq = cursor.read_cluster_int()?;
                    if seq < 1 || seq as usize > slots.len() {
                        return Err(ProtocolError::DescriptorIndexOutOfRange {
                            index: seq,
                            count: slots.len(),
                        });
                    }
                    index = seq as usize;
                    current = ColumnDescriptor::default();
                }
                sql_info::TYPE => current.sql_type = cursor.read_cluster_int()? as i32,
                sql_info::SUB_TYPE => current.sub_type = cursor.read_cluster_int()? as i32,
                sql_info::SCALE => current.scale = cursor.read_cluster_int()? as i32,
                sql_info::LENGTH => current.length = cursor.read_cluster_int()? as i32,
                sql_info::FIELD => current.field = cursor.read_cluster_string()?,
                sql_info::RELATION => current.relation = cursor.read_cluster_string()?,
                sql_info::OWNER => current.owner = cursor.read_cluster_string()?,
                sql_info::ALIAS => current.alias = cursor.read_cluster_string()?,
                sql_info::DESCRIBE_END => {
                    if index == 0 {
                        return Err(ProtocolError::MalformedInfo("descriptor without sequence"));
                    }
                    slots[index - 1] = Some(std::mem::take(&mut current));
                    last_index = index;
                }
                other => return Err(ProtocolError::InvalidDescriptorItem(other)),
            }
        }

        Ok(DescribeProgress::Complete)
    }

    /// Finish parsing and return descriptors in column order.
    pub fn finish(self) -> Result<Vec<ColumnDescriptor>, ProtocolError> {
        self.slots
            .unwrap_or_default()
            .into_iter()
            .map(|slot| slot.ok_or(ProtocolError::MalformedInfo("missing descriptor")))
            .collect()
    }
}

/// Build the item list used to resume a truncated describe answer.
#[must_use]
pub fn resume_items(last_index: usize, items: &[u8]) -> Vec<u8> {
    let mut resumed = Vec::with_capacity(items.len() + 4);
    resumed.push(sql_info::SQLDA_START);
    resumed.push(2);
    write_vax(&mut resumed, (last_index + 1) as i64, 2);
    resumed.extend_from_slice(items);
    resumed
}

/// Encode a describe answer the way a server produces it.
///
/// `vars` pairs one-based indices with descriptors; `truncated` ends the
/// buffer with `isc_info_truncated` instead of `isc_info_end`.
#[must_use]
pub fn encode_describe(
    section: u8,
    total: usize,
    vars: &[(usize, &ColumnDescriptor)],
    truncated: bool,
) -> Vec<u8> {
    fn int(buf: &mut Vec<u8>, item: u8, value: i64) {
        buf.push(item);
        buf.extend_from_slice(&[4, 0]);
        write_vax(buf, value, 4);
    }
    fn text(buf: &mut Vec<u8>, item: u8, value: &str) {
        buf.push(item);
        write_vax(buf, value.len() as i64, 2);
        buf.extend_from_slice(value.as_bytes());
    }

    let mut buf = vec![section];
    int(&mut buf, sql_info::DESCRIBE_VARS, total as i64);
    for (index, var) in vars {
        int(&mut buf, sql_info::SQLDA_SEQ, *index as i64);
        int(&mut buf, sql_info::TYPE, i64::from(var.sql_type));
        int(&mut buf, sql_info::SUB_TYPE, i64::from(var.sub_type));
        int(&mut buf, sql_info::SCALE, i64::from(var.scale));
        int(&mut buf, sql_info::LENGTH, i64::from(var.length));
        text(&mut buf, sql_info::FIELD, &var.field);
        text(&mut buf, sql_info::RELATION, &var.relation);
        text(&mut buf, sql_info::OWNER, &var.owner);
        text(&mut buf, sql_info::ALIAS, &var.alias);
        buf.push(sql_info::DESCRIBE_END);
    }
    buf.push(if truncated { info::TRUNCATED } else { info::END });
    buf
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::sql_type;

    #[test]
    fn test_parse_two_columns() {
        let id = ColumnDescriptor::new(sql_type::LONG + 1, 4).with_name("ID", "");
        let name = ColumnDescriptor::new(sql_type::VARYING, 40)
            .with_sub_type(3)
            .with_name("NAME", "USER_NAME");
        let buf = encode_describe(sql_info::SELECT, 2, &[(1, &id), (2, &name)], false);

        let mut set = DescriptorSet::new();
        assert_eq!(set.parse(&buf).unwrap(), DescribeProgress::Complete);
        let vars = set.finish().unwrap();

        assert_eq!(vars.len(), 2);
        assert!(vars[0].is_nullable());
        assert_eq!(vars[0].kind().unwrap(), ColumnKind::Long);
        assert_eq!(vars[0].display_name(), "ID");
        assert!(!vars[1].is_nullable());
        assert_eq!(vars[1].charset_id(), 3);
        assert_eq!(vars[1].display_name(), "USER_NAME");
    }

    #[test]
    fn test_parse_truncated_then_resumed() {
        let a = ColumnDescriptor::new(sql_type::SHORT, 2).with_name("A", "");
        let b = ColumnDescriptor::new(sql_type::INT64, 8).with_scale(-2).with_name("B", "");

        let first = encode_describe(sql_info::SELECT, 2, &[(1, &a)], true);
        let second = encode_describe(sql_info::SELECT, 2, &[(2, &b)], false);

        let mut set = DescriptorSet::new();
        assert_eq!(
            set.parse(&first).unwrap(),
            DescribeProgress::Truncated { last_index: 1 }
        );
        assert_eq!(set.parse(&second).unwrap(), DescribeProgress::Complete);

        let vars = set.finish().unwrap();
        assert_eq!(vars[0].field, "A");
        assert_eq!(vars[1].scale, -2);
    }

    #[test]
    fn test_parse_empty_description() {
        let buf = encode_describe(sql_info::BIND, 0, &[], false);
        let mut set = DescriptorSet::new();
        set.parse(&buf).unwrap();
        assert!(set.finish().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_item_rejected() {
        let mut buf = encode_describe(sql_info::SELECT, 1, &[], false);
        buf.pop();
        buf.push(99);
        let mut set = DescriptorSet::new();
        assert_eq!(set.parse(&buf), Err(ProtocolError::InvalidDescriptorItem(99)));
    }

    #[test]
    fn test_resume_items_layout() {
        let items = resume_items(300, &[sql_info::SELECT]);
        assert_eq!(items, vec![sql_info::SQLDA_START, 2, 0x2D, 0x01, sql_info::SELECT]);
    }
}
