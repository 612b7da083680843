//! Prepared statement engine.
//!
//! A [`Statement`] wraps one server-side statement handle and drives it
//! through its lifecycle:
//!
//! ```text
//! Allocated -> Prepared -> Executed <-> Fetching -> Closed -> (re-execute)
//!                 any state -> Dropped
//!                 failed round-trip -> Error (re-prepare required)
//! ```
//!
//! Every operation takes the [`Attachment`] explicitly, so only one
//! request can be in flight per attachment.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::Arc;

use bytes::BytesMut;
use firebird_types::{SqlValue, decode_value, encode_value};
use gds_protocol::descriptor::{DESCRIBE_BIND_ITEMS, DESCRIBE_SELECT_ITEMS, resume_items};
use gds_protocol::info::{PLAN_ITEMS, RECORDS_ITEMS, STATEMENT_TYPE_ITEMS};
use gds_protocol::isc::{FETCH_NO_MORE_ROWS, MAX_BUFFER_SIZE, gds};
use gds_protocol::request::{self, OutputMessage};
use gds_protocol::{
    ColumnDescriptor, ColumnKind, DescribeProgress, DescriptorSet, FreeOption, RawRow, ServerMessage,
    StatementType, build_message_blr,
};

use crate::attachment::Attachment;
use crate::blob::{blob_contents, blob_value, read_blob, write_blob};
use crate::config::DEFAULT_FETCH_SIZE;
use crate::error::{Error, Result};

/// Lifecycle state of a [`Statement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Handle allocated, nothing prepared.
    Allocated,
    /// SQL prepared and described.
    Prepared,
    /// Executed; a cursor may be open.
    Executed,
    /// At least one fetch round-trip issued.
    Fetching,
    /// Cursor closed; the statement may be executed again.
    Closed,
    /// Server handle released.
    Dropped,
    /// A round-trip failed; the statement must be prepared again.
    Error,
}

/// A server-side prepared statement.
#[derive(Debug)]
pub struct Statement {
    handle: i32,
    state: StatementState,
    sql: String,
    statement_type: StatementType,
    parameters: Arc<[ColumnDescriptor]>,
    fields: Arc<[ColumnDescriptor]>,
    records_affected: i64,
    transaction: Option<i32>,
    rows: VecDeque<Vec<SqlValue>>,
    all_rows_fetched: bool,
    output_row: Option<Vec<SqlValue>>,
    fetch_size: u32,
}

impl Statement {
    /// Allocate a statement handle on the attachment.
    ///
    /// Fails with [`Error::ConnectionClosed`] when the attachment is gone.
    pub async fn allocate(attachment: &mut Attachment) -> Result<Self> {
        let response = attachment
            .call(request::allocate_statement(attachment.handle()))
            .await?;
        tracing::trace!(handle = response.handle, "allocated statement");
        Ok(Self {
            handle: response.handle,
            state: StatementState::Allocated,
            sql: String::new(),
            statement_type: StatementType::None,
            parameters: Arc::from(Vec::new()),
            fields: Arc::from(Vec::new()),
            records_affected: -1,
            transaction: None,
            rows: VecDeque::new(),
            all_rows_fetched: false,
            output_row: None,
            fetch_size: DEFAULT_FETCH_SIZE,
        })
    }

    /// Server-side handle.
    #[must_use]
    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StatementState {
        self.state
    }

    /// SQL text last prepared.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Statement type reported by the server.
    #[must_use]
    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    /// Input parameter descriptors.
    #[must_use]
    pub fn parameters(&self) -> &Arc<[ColumnDescriptor]> {
        &self.parameters
    }

    /// Output column descriptors.
    #[must_use]
    pub fn fields(&self) -> &Arc<[ColumnDescriptor]> {
        &self.fields
    }

    /// Rows modified by the last execution; -1 for cursor statements.
    #[must_use]
    pub fn records_affected(&self) -> i64 {
        self.records_affected
    }

    /// Transaction handle the statement was last prepared or executed under.
    #[must_use]
    pub fn transaction(&self) -> Option<i32> {
        self.transaction
    }

    /// Set the number of rows requested per fetch.
    pub fn set_fetch_size(&mut self, size: u32) {
        self.fetch_size = size.max(1);
    }

    /// Whether the statement is prepared and can be executed.
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        matches!(
            self.state,
            StatementState::Prepared
                | StatementState::Executed
                | StatementState::Fetching
                | StatementState::Closed
        )
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = StatementState::Error;
        }
        result
    }

    /// Prepare `sql` under the transaction `transaction`.
    ///
    /// Output descriptors are read from the prepare answer (resuming when
    /// the server truncates it), then the statement type is requested.
    pub async fn prepare(
        &mut self,
        attachment: &mut Attachment,
        sql: &str,
        transaction: i32,
    ) -> Result<()> {
        match self.state {
            StatementState::Executed | StatementState::Fetching => {
                return Err(Error::InvalidOperation(
                    "statement has an open cursor; close it before preparing".into(),
                ));
            }
            StatementState::Dropped => return Err(Error::gds(gds::BAD_STMT_HANDLE, &[])),
            _ => {}
        }

        let result = self.prepare_inner(attachment, sql, transaction).await;
        self.track(result)
    }

    async fn prepare_inner(
        &mut self,
        attachment: &mut Attachment,
        sql: &str,
        transaction: i32,
    ) -> Result<()> {
        let text = attachment.charset().encode(sql)?;
        let response = attachment
            .call(request::prepare_statement(
                transaction,
                self.handle,
                attachment.dialect(),
                &text,
                &DESCRIBE_SELECT_ITEMS,
                MAX_BUFFER_SIZE,
            ))
            .await?;

        let fields = self
            .read_descriptors(attachment, &response.data, &DESCRIBE_SELECT_ITEMS)
            .await?;

        let answer = self.info(attachment, &STATEMENT_TYPE_ITEMS).await?;
        self.statement_type = gds_protocol::info::parse_statement_type(&answer)?;
        self.fields = Arc::from(fields);
        self.parameters = Arc::from(Vec::new());
        self.sql = sql.to_string();
        self.transaction = Some(transaction);
        self.rows.clear();
        self.output_row = None;
        self.all_rows_fetched = false;
        self.records_affected = -1;
        self.state = StatementState::Prepared;

        tracing::debug!(
            handle = self.handle,
            statement_type = ?self.statement_type,
            fields = self.fields.len(),
            "prepared statement"
        );
        Ok(())
    }

    /// Describe the input parameters of the prepared statement.
    pub async fn describe_parameters(&mut self, attachment: &mut Attachment) -> Result<()> {
        self.ensure_prepared()?;
        let result = async {
            let answer = self.info(attachment, &DESCRIBE_BIND_ITEMS).await?;
            self.read_descriptors(attachment, &answer, &DESCRIBE_BIND_ITEMS)
                .await
        }
        .await;
        let parameters = self.track(result)?;
        tracing::trace!(handle = self.handle, count = parameters.len(), "described parameters");
        self.parameters = Arc::from(parameters);
        Ok(())
    }

    /// Parse a describe answer, re-requesting from the last index while
    /// the server reports truncation.
    async fn read_descriptors(
        &self,
        attachment: &mut Attachment,
        first: &[u8],
        items: &[u8],
    ) -> Result<Vec<ColumnDescriptor>> {
        let mut set = DescriptorSet::new();
        let mut progress = set.parse(first)?;
        while let DescribeProgress::Truncated { last_index } = progress {
            tracing::trace!(handle = self.handle, last_index, "describe answer truncated");
            let answer = self.info(attachment, &resume_items(last_index, items)).await?;
            progress = set.parse(&answer)?;
        }
        Ok(set.finish()?)
    }

    async fn info(&self, attachment: &mut Attachment, items: &[u8]) -> Result<bytes::Bytes> {
        let response = attachment
            .call(request::info_sql(self.handle, items, MAX_BUFFER_SIZE))
            .await?;
        Ok(response.data)
    }

    fn ensure_prepared(&self) -> Result<()> {
        if self.is_prepared() {
            Ok(())
        } else if self.state == StatementState::Dropped {
            Err(Error::gds(gds::BAD_STMT_HANDLE, &[]))
        } else {
            Err(Error::InvalidOperation("statement is not prepared".into()))
        }
    }

    /// Execute the statement with `params` bound in descriptor order.
    ///
    /// Stored procedure statements are executed with `op_execute2` and
    /// their single output row is kept for [`Statement::fetch`].
    pub async fn execute(
        &mut self,
        attachment: &mut Attachment,
        transaction: i32,
        params: &[SqlValue],
    ) -> Result<()> {
        self.ensure_prepared()?;
        if matches!(
            self.state,
            StatementState::Executed | StatementState::Fetching
        ) {
            self.close(attachment).await?;
        }
        if params.len() != self.parameters.len() {
            return Err(Error::Parameter(format!(
                "statement expects {} parameters, {} supplied",
                self.parameters.len(),
                params.len()
            )));
        }

        let params = self.store_blob_parameters(attachment, transaction, params).await?;
        // Encoding errors are raised before the execute round-trip.
        let message = self.encode_parameters(attachment, &params)?;
        let in_blr = if self.parameters.is_empty() {
            bytes::Bytes::new()
        } else {
            build_message_blr(&self.parameters)?
        };

        let result = self
            .execute_inner(attachment, transaction, &in_blr, &message)
            .await;
        self.track(result)
    }

    async fn execute_inner(
        &mut self,
        attachment: &mut Attachment,
        transaction: i32,
        in_blr: &[u8],
        message: &[u8],
    ) -> Result<()> {
        self.rows.clear();
        self.output_row = None;
        self.all_rows_fetched = false;
        self.transaction = Some(transaction);

        if self.statement_type == StatementType::StoredProcedure {
            let out_blr = build_message_blr(&self.fields)?;
            attachment.set_row_layout(Some(self.fields.clone()));
            attachment
                .send(request::execute(
                    self.handle,
                    transaction,
                    in_blr,
                    message,
                    Some(OutputMessage { blr: &out_blr }),
                ))
                .await?;
            // The row (if any) precedes the op_response.
            let row = match attachment.read_message().await? {
                ServerMessage::SqlResponse { row, .. } => row,
                ServerMessage::Response(response) if response.status.is_error() => {
                    return Err(Error::from_status(response.status));
                }
                other => {
                    return Err(Error::Codec(gds_codec::CodecError::UnexpectedMessage {
                        expected: "op_sql_response",
                        actual: other.name(),
                    }));
                }
            };
            attachment.read_generic().await?;
            self.output_row = match row {
                Some(raw) => Some(self.decode_row(attachment, raw)?),
                None => None,
            };
            self.all_rows_fetched = true;
        } else {
            attachment
                .call(request::execute(
                    self.handle,
                    transaction,
                    in_blr,
                    message,
                    None,
                ))
                .await?;
        }

        self.state = StatementState::Executed;
        tracing::debug!(handle = self.handle, transaction, "executed statement");

        if !self.statement_type.returns_cursor() || self.statement_type == StatementType::StoredProcedure {
            self.update_records_affected(attachment).await?;
        } else {
            self.records_affected = -1;
        }
        Ok(())
    }

    /// Write string and byte values bound to blob parameters into new
    /// blobs, binding their ids instead.
    async fn store_blob_parameters<'p>(
        &self,
        attachment: &mut Attachment,
        transaction: i32,
        params: &'p [SqlValue],
    ) -> Result<Cow<'p, [SqlValue]>> {
        let mut stored: Option<Vec<SqlValue>> = None;
        for (index, (value, descriptor)) in params.iter().zip(self.parameters.iter()).enumerate() {
            if !matches!(descriptor.kind(), Ok(ColumnKind::Blob)) {
                continue;
            }
            let contents = blob_contents(value, attachment.charset())
                .map_err(|e| Error::Parameter(format!("parameter {index}: {e}")))?;
            let Some(contents) = contents else {
                continue;
            };
            let id = write_blob(attachment, transaction, &contents).await?;
            if let Some(slot) = stored
                .get_or_insert_with(|| params.to_vec())
                .get_mut(index)
            {
                *slot = SqlValue::BlobId(id);
            }
        }
        Ok(stored.map_or(Cow::Borrowed(params), Cow::Owned))
    }

    fn encode_parameters(&self, attachment: &Attachment, params: &[SqlValue]) -> Result<BytesMut> {
        let mut message = BytesMut::new();
        for (index, (value, descriptor)) in params.iter().zip(self.parameters.iter()).enumerate() {
            encode_value(value, descriptor, attachment.charset(), &mut message).map_err(|e| {
                match e {
                    firebird_types::TypeError::Truncation { length, max } => {
                        tracing::debug!(index, length, max, "parameter value too long");
                        Error::gds(gds::ARITH_EXCEPT, &[])
                    }
                    other => Error::Parameter(format!("parameter {index}: {other}")),
                }
            })?;
        }
        Ok(message)
    }

    fn decode_row(&self, attachment: &Attachment, raw: RawRow) -> Result<Vec<SqlValue>> {
        let charset = attachment.charset();
        raw.iter()
            .zip(self.fields.iter())
            .map(|(value, field)| decode_value(value, field, charset).map_err(Error::from))
            .collect()
    }

    /// Return the next row, or `None` once the cursor is exhausted.
    ///
    /// Only select, select-for-update and stored procedure statements
    /// produce rows; `None` is returned for everything else. Calling this
    /// again after exhaustion keeps returning `None`.
    pub async fn fetch(&mut self, attachment: &mut Attachment) -> Result<Option<Vec<SqlValue>>> {
        if !self.statement_type.returns_cursor() {
            return Ok(None);
        }
        let row = if self.statement_type == StatementType::StoredProcedure {
            self.output_row.take()
        } else {
            if !matches!(
                self.state,
                StatementState::Executed | StatementState::Fetching
            ) {
                return Ok(None);
            }
            if self.rows.is_empty() && !self.all_rows_fetched {
                let result = self.fetch_batch(attachment).await;
                self.track(result)?;
            }
            self.rows.pop_front()
        };
        match row {
            Some(row) => self.load_blobs(attachment, row).await.map(Some),
            None => Ok(None),
        }
    }

    /// Replace blob ids in `row` with the blob contents.
    ///
    /// Runs after the whole fetch batch has been read, since a blob
    /// round-trip cannot interleave with a pending fetch answer.
    async fn load_blobs(
        &self,
        attachment: &mut Attachment,
        mut row: Vec<SqlValue>,
    ) -> Result<Vec<SqlValue>> {
        let Some(transaction) = self.transaction else {
            return Ok(row);
        };
        for (value, field) in row.iter_mut().zip(self.fields.iter()) {
            let SqlValue::BlobId(id) = *value else {
                continue;
            };
            if matches!(field.kind(), Ok(ColumnKind::Blob)) {
                let data = read_blob(attachment, transaction, id).await?;
                *value = blob_value(data, field, attachment.charset())?;
            }
        }
        Ok(row)
    }

    async fn fetch_batch(&mut self, attachment: &mut Attachment) -> Result<()> {
        let blr = build_message_blr(&self.fields)?;
        attachment.set_row_layout(Some(self.fields.clone()));
        let size = i32::try_from(self.fetch_size).unwrap_or(i32::MAX);
        attachment
            .send(request::fetch(self.handle, &blr, size))
            .await?;
        self.state = StatementState::Fetching;

        loop {
            match attachment.read_message().await? {
                ServerMessage::FetchResponse {
                    status,
                    count,
                    row,
                } => {
                    if let Some(raw) = row {
                        let values = self.decode_row(attachment, raw)?;
                        self.rows.push_back(values);
                        continue;
                    }
                    if status == FETCH_NO_MORE_ROWS {
                        self.all_rows_fetched = true;
                    }
                    tracing::trace!(
                        handle = self.handle,
                        status,
                        count,
                        rows = self.rows.len(),
                        "fetch batch complete"
                    );
                    return Ok(());
                }
                ServerMessage::Response(response) if response.status.is_error() => {
                    return Err(Error::from_status(response.status));
                }
                other => {
                    return Err(Error::Codec(gds_codec::CodecError::UnexpectedMessage {
                        expected: "op_fetch_response",
                        actual: other.name(),
                    }));
                }
            }
        }
    }

    /// Ask the server how many rows the last execution modified.
    ///
    /// The answer is the sum of inserted, updated and deleted rows; cursor
    /// statements report -1.
    pub async fn update_records_affected(&mut self, attachment: &mut Attachment) -> Result<i64> {
        if self.statement_type.returns_cursor() && self.statement_type != StatementType::StoredProcedure {
            self.records_affected = -1;
            return Ok(-1);
        }
        let answer = self.info(attachment, &RECORDS_ITEMS).await?;
        let counts = gds_protocol::info::parse_record_counts(&answer)?;
        self.records_affected = counts.modified();
        Ok(self.records_affected)
    }

    /// Server execution plan of the prepared statement.
    pub async fn plan(&mut self, attachment: &mut Attachment) -> Result<Option<String>> {
        self.ensure_prepared()?;
        let answer = self.info(attachment, &PLAN_ITEMS).await?;
        Ok(gds_protocol::info::parse_plan(&answer)?)
    }

    /// Close the cursor, keeping the statement prepared.
    ///
    /// `DSQL_close` is only sent for statements that open a cursor;
    /// stored procedure calls answer in one round-trip and hold none.
    pub async fn close(&mut self, attachment: &mut Attachment) -> Result<()> {
        let open = matches!(
            self.state,
            StatementState::Executed | StatementState::Fetching
        );
        if open
            && self.statement_type.returns_cursor()
            && self.statement_type != StatementType::StoredProcedure
        {
            let result = attachment
                .call(request::free_statement(self.handle, FreeOption::Close))
                .await
                .map(|_| ());
            self.track(result)?;
            tracing::trace!(handle = self.handle, "closed cursor");
        }
        self.rows.clear();
        self.output_row = None;
        self.all_rows_fetched = false;
        if self.is_prepared() {
            self.state = StatementState::Closed;
        }
        Ok(())
    }

    /// Release the server handle.
    pub async fn drop_statement(&mut self, attachment: &mut Attachment) -> Result<()> {
        if self.state == StatementState::Dropped {
            return Ok(());
        }
        self.state = StatementState::Dropped;
        self.rows.clear();
        self.output_row = None;
        if !attachment.is_active() {
            return Ok(());
        }
        attachment
            .call(request::free_statement(self.handle, FreeOption::Drop))
            .await?;
        tracing::trace!(handle = self.handle, "dropped statement");
        Ok(())
    }
}
