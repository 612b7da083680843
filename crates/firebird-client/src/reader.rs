//! Forward-only result cursor.

use bitflags::bitflags;
use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use firebird_types::{FromSql, SqlValue};
use gds_protocol::{ColumnDescriptor, StatementType};
use rust_decimal::Decimal;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::session::Session;

const NO_DATA: &str = "There are no data to read.";

bitflags! {
    /// Options controlling how a reader is produced and consumed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandBehavior: u32 {
        /// Only the first statement of a batch is exposed.
        const SINGLE_RESULT = 1;
        /// Prepare and describe only; no rows are read.
        const SCHEMA_ONLY = 2;
        /// Column key information requested.
        const KEY_INFO = 4;
        /// At most one row is read.
        const SINGLE_ROW = 8;
        /// Columns are read in order.
        const SEQUENTIAL_ACCESS = 16;
        /// Close the session when the reader is closed.
        const CLOSE_CONNECTION = 32;
    }
}

/// Rows produced by [`Command::execute_reader`].
///
/// The reader borrows the session and command for its whole life. Call
/// [`DataReader::close`] when done so the implicit transaction is
/// committed and output parameters are captured; a reader that is only
/// dropped leaves that work to the session's next command.
///
/// # Example
///
/// ```rust,ignore
/// let mut cmd = Command::new("SELECT ID, NAME FROM CUSTOMERS");
/// let mut reader = cmd.execute_reader(&mut session, CommandBehavior::default()).await?;
/// while reader.read().await? {
///     let id: i32 = reader.get(0)?;
///     let name = reader.get_string(1)?;
/// }
/// reader.close().await?;
/// ```
pub struct DataReader<'a> {
    session: &'a mut Session,
    command: &'a mut Command,
    behavior: CommandBehavior,
    row: Option<Vec<SqlValue>>,
    /// Index of the current row; -1 before the first read.
    position: i64,
    field_count: usize,
    /// First row of a stored procedure result, kept for output capture.
    output_row: Option<Vec<SqlValue>>,
    failed: bool,
    closed: bool,
}

impl std::fmt::Debug for DataReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataReader")
            .field("behavior", &self.behavior)
            .field("position", &self.position)
            .field("field_count", &self.field_count)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<'a> DataReader<'a> {
    pub(crate) fn new(
        session: &'a mut Session,
        command: &'a mut Command,
        behavior: CommandBehavior,
    ) -> Self {
        session.set_reader_open(true);
        let field_count = command.statement().map_or(0, |s| s.fields().len());
        Self {
            session,
            command,
            behavior,
            row: None,
            position: -1,
            field_count,
            output_row: None,
            failed: false,
            closed: false,
        }
    }

    /// Behavior the reader was opened with.
    #[must_use]
    pub fn behavior(&self) -> CommandBehavior {
        self.behavior
    }

    /// Whether the reader has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn is_procedure(&self) -> bool {
        self.command
            .statement()
            .is_some_and(|s| s.statement_type() == StatementType::StoredProcedure)
    }

    /// Advance to the next row.
    ///
    /// Returns `false` once the rows are exhausted and keeps returning
    /// `false` afterwards.
    pub async fn read(&mut self) -> Result<bool> {
        if self.closed {
            return Err(Error::InvalidOperation(
                "Invalid attempt to read when the reader is closed.".into(),
            ));
        }
        if self.behavior.contains(CommandBehavior::SCHEMA_ONLY)
            || (self.behavior.contains(CommandBehavior::SINGLE_ROW) && self.position >= 0)
        {
            self.row = None;
            return Ok(false);
        }

        let attachment = self.session.attachment_mut()?;
        let Some(statement) = self.command.statement_mut() else {
            return Ok(false);
        };
        let fetched = match statement.fetch(attachment).await {
            Ok(row) => row,
            Err(e) => {
                self.failed = true;
                return Err(e);
            }
        };

        match fetched {
            Some(values) => {
                if self.position < 0 {
                    self.field_count = statement.fields().len();
                    if statement.statement_type() == StatementType::StoredProcedure {
                        self.output_row = Some(values.clone());
                    }
                }
                self.position += 1;
                self.row = Some(values);
                Ok(true)
            }
            None => {
                self.row = None;
                Ok(false)
            }
        }
    }

    /// Advance to the result of the next statement in the batch.
    pub async fn next_result(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if let Some(statement) = self.command.statement_mut() {
            let attachment = self.session.attachment_mut()?;
            statement.close(attachment).await?;
        }
        let advanced = self
            .command
            .next_result(self.session, self.behavior)
            .await
            .inspect_err(|_| self.failed = true)?;
        self.position = -1;
        self.row = None;
        self.field_count = if advanced {
            self.command.statement().map_or(0, |s| s.fields().len())
        } else {
            0
        };
        Ok(advanced)
    }

    /// Close the reader.
    ///
    /// Output parameters are captured, the implicit transaction is
    /// committed (or rolled back after a failed read) and the session is
    /// closed when [`CommandBehavior::CLOSE_CONNECTION`] was requested.
    pub async fn close(mut self) -> Result<()> {
        let result = self.close_inner().await;
        self.closed = true;
        result
    }

    async fn close_inner(&mut self) -> Result<()> {
        if self.position < 0
            && self.is_procedure()
            && !self.behavior.contains(CommandBehavior::SCHEMA_ONLY)
            && !self.failed
        {
            // Output parameters come from the procedure's single row.
            self.read().await?;
        }
        self.session.set_reader_open(false);
        self.closed = true;

        let result = self
            .command
            .reader_closed(self.session, self.output_row.as_deref(), !self.failed)
            .await;
        tracing::trace!(command = self.command.id(), rows = self.position + 1, "reader closed");

        if self.behavior.contains(CommandBehavior::CLOSE_CONNECTION) {
            let closed = self.session.close().await;
            return result.and(closed);
        }
        result
    }

    /// Rows changed by the command so far; -1 when none reported a count.
    #[must_use]
    pub fn records_affected(&self) -> i64 {
        self.command.records_affected()
    }

    /// Number of columns in the current result.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Descriptors of the current result's columns.
    #[must_use]
    pub fn fields(&self) -> &[ColumnDescriptor] {
        self.command.statement().map_or(&[][..], |s| &s.fields()[..])
    }

    /// Column name: the alias, or the field name when unaliased.
    pub fn get_name(&self, index: usize) -> Result<&str> {
        self.fields()
            .get(index)
            .map(ColumnDescriptor::display_name)
            .ok_or_else(|| out_of_range(index))
    }

    /// Index of the column called `name`, compared case-insensitively.
    pub fn get_ordinal(&self, name: &str) -> Result<usize> {
        self.fields()
            .iter()
            .position(|f| f.display_name().eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::InvalidOperation(format!("column '{name}' not found")))
    }

    /// Raw value of a column in the current row.
    pub fn get_value(&self, index: usize) -> Result<&SqlValue> {
        let row = self
            .row
            .as_ref()
            .ok_or_else(|| Error::InvalidOperation(NO_DATA.into()))?;
        row.get(index).ok_or_else(|| out_of_range(index))
    }

    /// Whether a column in the current row is NULL.
    pub fn is_null(&self, index: usize) -> Result<bool> {
        Ok(self.get_value(index)?.is_null())
    }

    /// Convert a column of the current row.
    pub fn get<T: FromSql>(&self, index: usize) -> Result<T> {
        Ok(T::from_sql(self.get_value(index)?)?)
    }

    /// Convert a column of the current row, found by name.
    pub fn get_by_name<T: FromSql>(&self, name: &str) -> Result<T> {
        self.get(self.get_ordinal(name)?)
    }

    /// Column as `i16`.
    pub fn get_i16(&self, index: usize) -> Result<i16> {
        self.get(index)
    }

    /// Column as `i32`.
    pub fn get_i32(&self, index: usize) -> Result<i32> {
        self.get(index)
    }

    /// Column as `i64`.
    pub fn get_i64(&self, index: usize) -> Result<i64> {
        self.get(index)
    }

    /// Column as `f32`.
    pub fn get_f32(&self, index: usize) -> Result<f32> {
        self.get(index)
    }

    /// Column as `f64`.
    pub fn get_f64(&self, index: usize) -> Result<f64> {
        self.get(index)
    }

    /// Column as a decimal.
    pub fn get_decimal(&self, index: usize) -> Result<Decimal> {
        self.get(index)
    }

    /// Column as a string.
    pub fn get_string(&self, index: usize) -> Result<String> {
        self.get(index)
    }

    /// Column as a boolean.
    pub fn get_bool(&self, index: usize) -> Result<bool> {
        self.get(index)
    }

    /// Column as a date.
    pub fn get_date(&self, index: usize) -> Result<NaiveDate> {
        self.get(index)
    }

    /// Column as a time of day.
    pub fn get_time(&self, index: usize) -> Result<NaiveTime> {
        self.get(index)
    }

    /// Column as a timestamp.
    pub fn get_timestamp(&self, index: usize) -> Result<NaiveDateTime> {
        self.get(index)
    }

    /// Column as raw bytes.
    pub fn get_bytes(&self, index: usize) -> Result<Bytes> {
        self.get(index)
    }
}

impl Drop for DataReader<'_> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(
                command = self.command.id(),
                "data reader dropped without close; implicit transaction left for the next command"
            );
            self.session.set_reader_open(false);
        }
    }
}

fn out_of_range(index: usize) -> Error {
    Error::InvalidOperation(format!("column index {index} is out of range"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_behavior_flags() {
        let behavior = CommandBehavior::SINGLE_ROW | CommandBehavior::CLOSE_CONNECTION;
        assert!(behavior.contains(CommandBehavior::SINGLE_ROW));
        assert!(!behavior.contains(CommandBehavior::SCHEMA_ONLY));
        assert_eq!(behavior.bits(), 40);
        assert!(CommandBehavior::default().is_empty());
    }
}
