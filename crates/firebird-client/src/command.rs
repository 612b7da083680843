//! Command coordination.
//!
//! A [`Command`] carries SQL text and parameters. Executing it against a
//! [`Session`] splits the text into a batch, rewrites named placeholders,
//! obtains a transaction (starting an implicit one when the caller did not
//! supply any) and drives the [`Statement`] engine.

use std::sync::atomic::{AtomicU64, Ordering};

use firebird_types::SqlValue;
use gds_protocol::StatementType;

use crate::batch::split_batch;
use crate::error::{Error, Result};
use crate::parameter::{Parameter, bind_values, capture_outputs};
use crate::reader::{CommandBehavior, DataReader};
use crate::rewrite::rewrite_named_parameters;
use crate::session::{PENDING_TRANSACTION, READER_OPEN, Session};
use crate::statement::Statement;
use crate::transaction::Transaction;

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandType {
    /// SQL text, possibly several statements separated by the batch
    /// terminator.
    #[default]
    Text,
    /// Name of a stored procedure; the call text is generated from the
    /// parameters.
    StoredProcedure,
}

/// A SQL command.
///
/// # Example
///
/// ```rust,ignore
/// let mut cmd = Command::new("UPDATE ACCOUNTS SET BALANCE = BALANCE - @amount WHERE ID = @id")
///     .bind("@amount", 100)
///     .bind("@id", 7);
/// let rows = cmd.execute_non_query(&mut session).await?;
/// ```
#[derive(Debug)]
pub struct Command {
    id: u64,
    text: String,
    command_type: CommandType,
    parameters: Vec<Parameter>,
    transaction: Option<Transaction>,
    statements: Vec<String>,
    current: usize,
    named: Vec<String>,
    statement: Option<Statement>,
    /// Statements replaced while no session was at hand.
    stale: Vec<Statement>,
    records_affected: i64,
}

impl Command {
    /// Create a text command.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed),
            text: text.into(),
            command_type: CommandType::Text,
            parameters: Vec::new(),
            transaction: None,
            statements: Vec::new(),
            current: 0,
            named: Vec::new(),
            statement: None,
            stale: Vec::new(),
            records_affected: -1,
        }
    }

    /// Create a stored procedure command.
    pub fn procedure(name: impl Into<String>) -> Self {
        Self::new(name).with_command_type(CommandType::StoredProcedure)
    }

    /// Set the command type.
    #[must_use]
    pub fn with_command_type(mut self, command_type: CommandType) -> Self {
        self.set_command_type(command_type);
        self
    }

    /// Run the command inside an explicit transaction.
    #[must_use]
    pub fn with_transaction(mut self, transaction: &Transaction) -> Self {
        self.transaction = Some(transaction.clone());
        self
    }

    /// Add an input parameter.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.parameters.push(Parameter::new(name, value));
        self
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Command text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the command text. The next execution prepares again.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.reset_batch();
    }

    /// Command type.
    #[must_use]
    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    /// Change how the text is interpreted.
    pub fn set_command_type(&mut self, command_type: CommandType) {
        if self.command_type != command_type {
            self.command_type = command_type;
            self.reset_batch();
        }
    }

    /// Transaction the command runs under, if any.
    #[must_use]
    pub fn transaction(&self) -> Option<&Transaction> {
        self.transaction.as_ref()
    }

    /// Bind the command to a transaction, or detach it with `None`.
    pub fn set_transaction(&mut self, transaction: Option<&Transaction>) {
        self.transaction = transaction.cloned();
    }

    /// Parameters in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Mutable access to the parameters.
    pub fn parameters_mut(&mut self) -> &mut Vec<Parameter> {
        &mut self.parameters
    }

    /// Parameter by name, matched like placeholders are.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.matches(name))
    }

    /// Rows changed by the last execution, -1 when no statement reported
    /// a count.
    #[must_use]
    pub fn records_affected(&self) -> i64 {
        self.records_affected
    }

    /// Named placeholders of the current statement, in text order.
    #[must_use]
    pub fn named_parameters(&self) -> &[String] {
        &self.named
    }

    /// Whether a prepared statement is ready for execution.
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.statement.as_ref().is_some_and(Statement::is_prepared)
    }

    /// Execution plan of the current statement.
    pub async fn plan(&mut self, session: &mut Session) -> Result<Option<String>> {
        if !self.is_prepared() {
            self.prepare(session).await?;
        }
        let attachment = session.attachment_mut()?;
        match self.statement.as_mut() {
            Some(statement) => statement.plan(attachment).await,
            None => Ok(None),
        }
    }

    fn reset_batch(&mut self) {
        self.statements.clear();
        self.named.clear();
        self.current = 0;
        if let Some(statement) = self.statement.take() {
            self.stale.push(statement);
        }
    }

    /// Prepare the first statement of the batch.
    pub async fn prepare(&mut self, session: &mut Session) -> Result<()> {
        let result = self.prepare_batch(session, false).await;
        self.complete_on_error(session, result).await
    }

    /// Execute the whole batch and return the total rows changed.
    ///
    /// Counts of statements that report none (selects, DDL) are left out;
    /// -1 is returned when no statement reported a count.
    pub async fn execute_non_query(&mut self, session: &mut Session) -> Result<i64> {
        let result = self.run_non_query(session).await;
        let total = self.complete_on_error(session, result).await?;
        session.finish_implicit(self.id, true).await?;
        Ok(total)
    }

    async fn run_non_query(&mut self, session: &mut Session) -> Result<i64> {
        self.prepare_batch(session, false).await?;
        self.records_affected = -1;
        loop {
            self.execute_current(session).await?;
            let attachment = session.attachment_mut()?;
            let mut count = -1;
            if let Some(statement) = self.statement.as_mut() {
                if statement.statement_type() == StatementType::StoredProcedure {
                    if let Some(row) = statement.fetch(attachment).await? {
                        capture_outputs(&mut self.parameters, &row);
                    }
                }
                if statement.statement_type().returns_cursor() {
                    statement.close(attachment).await?;
                }
                count = statement.records_affected();
            }
            self.add_records(count);
            if !self.advance(session, false).await? {
                break;
            }
        }
        tracing::debug!(command = self.id, records = self.records_affected, "non-query complete");
        Ok(self.records_affected)
    }

    /// Execute the first statement and open a reader over its rows.
    ///
    /// With [`CommandBehavior::SCHEMA_ONLY`] the statement is only prepared.
    pub async fn execute_reader<'a>(
        &'a mut self,
        session: &'a mut Session,
        behavior: CommandBehavior,
    ) -> Result<DataReader<'a>> {
        let result = self.open_reader(session, behavior).await;
        self.complete_on_error(session, result).await?;
        Ok(DataReader::new(session, self, behavior))
    }

    async fn open_reader(&mut self, session: &mut Session, behavior: CommandBehavior) -> Result<()> {
        self.prepare_batch(session, true).await?;
        self.records_affected = -1;
        if !behavior.contains(CommandBehavior::SCHEMA_ONLY) {
            self.execute_current(session).await?;
        }
        Ok(())
    }

    /// Value of the first column of the first row, NULL when there is
    /// no row.
    ///
    /// A stored procedure command is executed with `EXECUTE PROCEDURE`;
    /// the first output value is returned and all outputs are captured.
    pub async fn execute_scalar(&mut self, session: &mut Session) -> Result<SqlValue> {
        if self.command_type == CommandType::StoredProcedure {
            let result = self.run_procedure_scalar(session).await;
            let value = self.complete_on_error(session, result).await?;
            session.finish_implicit(self.id, true).await?;
            return Ok(value);
        }

        let mut reader = self.execute_reader(session, CommandBehavior::SINGLE_ROW).await?;
        let value = if reader.read().await? {
            reader.get_value(0)?.clone()
        } else {
            SqlValue::Null
        };
        reader.close().await?;
        Ok(value)
    }

    async fn run_procedure_scalar(&mut self, session: &mut Session) -> Result<SqlValue> {
        self.prepare_batch(session, false).await?;
        self.records_affected = -1;
        self.execute_current(session).await?;
        let attachment = session.attachment_mut()?;
        let mut value = SqlValue::Null;
        if let Some(statement) = self.statement.as_mut() {
            if let Some(row) = statement.fetch(attachment).await? {
                capture_outputs(&mut self.parameters, &row);
                value = row.into_iter().next().unwrap_or(SqlValue::Null);
            }
            if statement.statement_type().returns_cursor() {
                statement.close(attachment).await?;
            }
            let count = statement.records_affected();
            self.add_records(count);
        }
        Ok(value)
    }

    /// Release the server-side statements.
    pub async fn dispose(&mut self, session: &mut Session) -> Result<()> {
        self.reset_batch();
        let attachment = session.attachment_mut()?;
        for mut statement in self.stale.drain(..) {
            statement.drop_statement(attachment).await?;
        }
        Ok(())
    }

    /// On failure roll back an implicit transaction, keeping the
    /// original error.
    async fn complete_on_error<T>(&mut self, session: &mut Session, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::debug!(command = self.id, error = %e, "command failed");
            let _ = session.finish_implicit(self.id, false).await;
        }
        result
    }

    fn add_records(&mut self, count: i64) {
        if count >= 0 {
            self.records_affected = self.records_affected.max(0) + count;
        }
    }

    fn check_state(&mut self, session: &Session) -> Result<()> {
        if let Some(tx) = &self.transaction {
            if !tx.is_active(session) {
                tracing::debug!(command = self.id, "dropping completed transaction from command");
                self.transaction = None;
            }
        }
        if !session.is_open() {
            return Err(Error::ConnectionClosed);
        }
        if session.is_reader_open() {
            return Err(Error::InvalidOperation(READER_OPEN.into()));
        }
        if session.in_transaction() && self.transaction.is_none() {
            return Err(Error::InvalidOperation(PENDING_TRANSACTION.into()));
        }
        if self.text.trim().is_empty() {
            return Err(Error::InvalidOperation(
                "The command text for this command has not been set.".into(),
            ));
        }
        Ok(())
    }

    /// Validate state, obtain a transaction, split the batch and prepare
    /// its first statement.
    async fn prepare_batch(&mut self, session: &mut Session, returns_rows: bool) -> Result<()> {
        self.check_state(session)?;
        let handle = session
            .command_transaction(self.id, self.transaction.as_ref())
            .await?;

        if self.statements.is_empty() {
            self.statements = match self.command_type {
                CommandType::Text => split_batch(&self.text, &session.config().batch_terminator),
                CommandType::StoredProcedure => vec![self.text.trim().to_string()],
            };
            if self.statements.is_empty() {
                return Err(Error::InvalidOperation(
                    "The command text for this command has not been set.".into(),
                ));
            }
        }
        self.current = 0;
        self.prepare_current(session, handle, returns_rows).await
    }

    async fn prepare_current(
        &mut self,
        session: &mut Session,
        transaction: i32,
        returns_rows: bool,
    ) -> Result<()> {
        let fetch_size = session.config().fetch_size;
        let attachment = session.attachment_mut()?;
        for mut statement in self.stale.drain(..) {
            statement.drop_statement(attachment).await?;
        }

        let text = match self.statements.get(self.current) {
            Some(text) => text.as_str(),
            None => return Err(Error::InvalidOperation("no statement to prepare".into())),
        };
        let text = match self.command_type {
            CommandType::Text => text.to_string(),
            CommandType::StoredProcedure => procedure_call(text, &self.parameters, returns_rows),
        };
        let rewritten = rewrite_named_parameters(&text);
        self.named = rewritten.names;

        if let Some(statement) = self.statement.as_mut() {
            if statement.is_prepared() && statement.sql() == rewritten.sql {
                statement.close(attachment).await?;
                tracing::trace!(command = self.id, "reusing prepared statement");
                return Ok(());
            }
        }
        if let Some(mut old) = self.statement.take() {
            old.drop_statement(attachment).await?;
        }

        let mut statement = Statement::allocate(attachment).await?;
        statement.set_fetch_size(fetch_size);
        let prepared = async {
            statement.prepare(attachment, &rewritten.sql, transaction).await?;
            statement.describe_parameters(attachment).await
        }
        .await;
        if let Err(e) = prepared {
            let _ = statement.drop_statement(attachment).await;
            return Err(e);
        }
        self.statement = Some(statement);
        Ok(())
    }

    /// Bind parameters and execute the current statement.
    async fn execute_current(&mut self, session: &mut Session) -> Result<()> {
        let handle = session
            .command_transaction(self.id, self.transaction.as_ref())
            .await?;
        let attachment = session.attachment_mut()?;
        let Some(statement) = self.statement.as_mut() else {
            return Err(Error::InvalidOperation("statement is not prepared".into()));
        };
        let values = bind_values(&self.parameters, &self.named, statement.parameters().len())?;
        statement.execute(attachment, handle, &values).await
    }

    /// Move to the next statement of the batch and prepare it.
    ///
    /// Returns `false` when the batch is exhausted.
    async fn advance(&mut self, session: &mut Session, returns_rows: bool) -> Result<bool> {
        if self.current + 1 >= self.statements.len() {
            return Ok(false);
        }
        if let Some(mut statement) = self.statement.take() {
            statement.drop_statement(session.attachment_mut()?).await?;
        }
        self.current += 1;
        let handle = session
            .command_transaction(self.id, self.transaction.as_ref())
            .await?;
        self.prepare_current(session, handle, returns_rows).await?;
        Ok(true)
    }

    /// Advance a reader to the next statement of the batch and execute it.
    pub(crate) async fn next_result(
        &mut self,
        session: &mut Session,
        behavior: CommandBehavior,
    ) -> Result<bool> {
        if behavior.contains(CommandBehavior::SINGLE_RESULT) {
            return Ok(false);
        }
        let result = async {
            if !self.advance(session, true).await? {
                return Ok(false);
            }
            if !behavior.contains(CommandBehavior::SCHEMA_ONLY) {
                self.execute_current(session).await?;
            }
            Ok(true)
        }
        .await;
        self.complete_on_error(session, result).await
    }

    pub(crate) fn statement_mut(&mut self) -> Option<&mut Statement> {
        self.statement.as_mut()
    }

    pub(crate) fn statement(&self) -> Option<&Statement> {
        self.statement.as_ref()
    }

    /// Bookkeeping once a reader over this command is closed.
    pub(crate) async fn reader_closed(
        &mut self,
        session: &mut Session,
        output_row: Option<&[SqlValue]>,
        success: bool,
    ) -> Result<()> {
        let mut result = Ok(());
        if let Some(statement) = self.statement.as_mut() {
            if let Ok(attachment) = session.attachment_mut() {
                result = statement.close(attachment).await;
            }
            let count = statement.records_affected();
            self.add_records(count);
        }
        if let Some(row) = output_row {
            capture_outputs(&mut self.parameters, row);
        }
        let committed = session
            .finish_implicit(self.id, success && result.is_ok())
            .await;
        result.and(committed)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

/// Call text for a stored procedure command.
///
/// Row-returning calls select from the procedure, others execute it.
/// Input parameter names become the argument list; empty parentheses
/// are omitted. Text that already is a call is returned unchanged.
fn procedure_call(name: &str, parameters: &[Parameter], returns_rows: bool) -> String {
    let lower = name.trim_start().to_ascii_lowercase();
    if lower.starts_with("execute procedure") || lower.starts_with("select") {
        return name.to_string();
    }

    let args: Vec<String> = parameters
        .iter()
        .filter(|p| p.direction().is_input())
        .map(|p| {
            if p.name().starts_with('@') {
                p.name().to_string()
            } else {
                format!("@{}", p.name())
            }
        })
        .collect();

    let mut sql = if returns_rows {
        format!("SELECT * FROM {name}")
    } else {
        format!("EXECUTE PROCEDURE {name}")
    };
    if !args.is_empty() {
        sql.push('(');
        sql.push_str(&args.join(", "));
        sql.push(')');
    }
    sql
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parameter::ParameterDirection;

    #[test]
    fn test_procedure_call_text() {
        let params = vec![
            Parameter::new("@a", 1),
            Parameter::new("b", 2),
            Parameter::output("@total"),
        ];
        assert_eq!(
            procedure_call("ADD_ITEM", &params, false),
            "EXECUTE PROCEDURE ADD_ITEM(@a, @b)"
        );
        assert_eq!(
            procedure_call("ADD_ITEM", &params, true),
            "SELECT * FROM ADD_ITEM(@a, @b)"
        );
    }

    #[test]
    fn test_procedure_call_without_inputs() {
        let params = vec![Parameter::output("@x").with_direction(ParameterDirection::ReturnValue)];
        assert_eq!(procedure_call("GEN_ID", &params, false), "EXECUTE PROCEDURE GEN_ID");
        assert_eq!(procedure_call("LIST_ALL", &[], true), "SELECT * FROM LIST_ALL");
    }

    #[test]
    fn test_procedure_call_left_alone() {
        assert_eq!(
            procedure_call("execute procedure P(1)", &[Parameter::new("a", 1)], true),
            "execute procedure P(1)"
        );
        assert_eq!(procedure_call("SELECT * FROM P", &[], false), "SELECT * FROM P");
    }

    #[test]
    fn test_set_text_resets_batch() {
        let mut cmd = Command::new("SELECT 1 FROM RDB$DATABASE");
        cmd.statements = vec!["SELECT 1 FROM RDB$DATABASE".into()];
        cmd.named = vec!["@a".into()];
        cmd.set_text("SELECT 2 FROM RDB$DATABASE");
        assert!(cmd.statements.is_empty());
        assert!(cmd.named_parameters().is_empty());
        assert_eq!(cmd.records_affected(), -1);
    }

    #[test]
    fn test_command_ids_are_unique() {
        let a = Command::new("A");
        let b = Command::new("B");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_records_accumulate() {
        let mut cmd = Command::new("X");
        cmd.add_records(-1);
        assert_eq!(cmd.records_affected(), -1);
        cmd.add_records(2);
        cmd.add_records(0);
        cmd.add_records(3);
        assert_eq!(cmd.records_affected(), 5);
    }
}
