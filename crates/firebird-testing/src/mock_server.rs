//! Mock GDS server for unit testing.
//!
//! This module provides a scripted Firebird server that speaks enough of
//! protocol version 10 to drive the client end to end without a real
//! database instance.
//!
//! ## Features
//!
//! - Handshake, attach, create, detach and drop database
//! - Transactions with retaining and two-phase variants
//! - Scripted statements: descriptors, rows, record counts, plans, errors
//! - Truncated describe answers to exercise resumption
//! - Blob storage: created, written, opened and read in segments
//! - An event log for asserting what the client sent
//!
//! ## Example
//!
//! ```rust,ignore
//! use firebird_testing::mock_server::{MockGdsServer, MockStatement};
//! use firebird_testing::fixtures::int_column;
//! use firebird_types::SqlValue;
//!
//! #[tokio::test]
//! async fn test_query() {
//!     let server = MockGdsServer::builder()
//!         .with_statement(
//!             "SELECT ID FROM T",
//!             MockStatement::select(vec![int_column("ID")], vec![vec![SqlValue::Int(1)]]),
//!         )
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let cs = server.connection_string("employee.fdb");
//!     // Connect your client with cs...
//! }
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use firebird_types::{Charset, SqlValue, decode_value, encode_value};
use gds_protocol::blob::{MAX_SEGMENT_SIZE, SEGMENT_COMPLETE, SEGMENT_EOF, join_segments, put_segments};
use gds_protocol::descriptor::encode_describe;
use gds_protocol::isc::{arg, dpb, gds, info, req_info, sql_info};
use gds_protocol::op::PROTOCOL_VERSION10;
use gds_protocol::row::read_row;
use gds_protocol::vax::{vax_integer, write_vax};
use gds_protocol::{
    ColumnDescriptor, ColumnKind, FreeOption, Operation, ProtocolError, RawRow, StatementType, xdr,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Error type for mock server operations.
#[derive(Debug, Error)]
pub enum MockServerError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The client sent something the mock cannot parse.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A scripted value could not be encoded.
    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result type for mock server operations.
pub type Result<T> = std::result::Result<T, MockServerError>;

/// Error reported to the client in a status vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError {
    /// GDS error code.
    pub code: i32,
    /// Message text sent as an interpreted argument.
    pub message: String,
    /// Optional SQLSTATE.
    pub sql_state: Option<String>,
}

impl MockError {
    /// Create an error with a code and message.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            sql_state: None,
        }
    }

    /// Attach a SQLSTATE.
    #[must_use]
    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }
}

/// Scripted behavior for one SQL text.
#[derive(Debug, Clone)]
pub struct MockStatement {
    /// Statement type reported by `isc_info_sql_stmt_type`.
    pub statement_type: StatementType,
    /// Output column descriptors.
    pub columns: Vec<ColumnDescriptor>,
    /// Input parameter descriptors.
    pub params: Vec<ColumnDescriptor>,
    /// Rows returned by fetch (or the single `op_execute2` row).
    pub rows: Vec<Vec<SqlValue>>,
    /// Inserted, updated and deleted counts.
    pub counts: (i64, i64, i64),
    /// Plan text.
    pub plan: Option<String>,
    /// Error returned by prepare.
    pub prepare_error: Option<MockError>,
    /// Error returned by execute.
    pub execute_error: Option<MockError>,
    /// Maximum descriptors per describe answer.
    pub describe_chunk: Option<usize>,
}

impl MockStatement {
    fn new(statement_type: StatementType) -> Self {
        Self {
            statement_type,
            columns: Vec::new(),
            params: Vec::new(),
            rows: Vec::new(),
            counts: (0, 0, 0),
            plan: None,
            prepare_error: None,
            execute_error: None,
            describe_chunk: None,
        }
    }

    /// A SELECT returning `rows`.
    pub fn select(columns: Vec<ColumnDescriptor>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            ..Self::new(StatementType::Select)
        }
    }

    /// An EXECUTE PROCEDURE returning one row of output values.
    pub fn procedure(columns: Vec<ColumnDescriptor>, row: Vec<SqlValue>) -> Self {
        Self {
            columns,
            rows: vec![row],
            ..Self::new(StatementType::StoredProcedure)
        }
    }

    /// An INSERT affecting `count` rows.
    pub fn insert(count: i64) -> Self {
        Self {
            counts: (count, 0, 0),
            ..Self::new(StatementType::Insert)
        }
    }

    /// An UPDATE affecting `count` rows.
    pub fn update(count: i64) -> Self {
        Self {
            counts: (0, count, 0),
            ..Self::new(StatementType::Update)
        }
    }

    /// A DELETE affecting `count` rows.
    pub fn delete(count: i64) -> Self {
        Self {
            counts: (0, 0, count),
            ..Self::new(StatementType::Delete)
        }
    }

    /// A data definition statement.
    pub fn ddl() -> Self {
        Self::new(StatementType::Ddl)
    }

    /// A statement whose prepare fails.
    pub fn prepare_error(error: MockError) -> Self {
        Self {
            prepare_error: Some(error),
            ..Self::new(StatementType::None)
        }
    }

    /// Declare input parameters.
    #[must_use]
    pub fn with_params(mut self, params: Vec<ColumnDescriptor>) -> Self {
        self.params = params;
        self
    }

    /// Report a plan.
    #[must_use]
    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    /// Fail every execution with `error`.
    #[must_use]
    pub fn with_execute_error(mut self, error: MockError) -> Self {
        self.execute_error = Some(error);
        self
    }

    /// Split describe answers into chunks of `size` descriptors.
    #[must_use]
    pub fn with_describe_chunk(mut self, size: usize) -> Self {
        self.describe_chunk = Some(size.max(1));
        self
    }
}

/// Something the client asked the server to do.
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    /// Handshake.
    Connect,
    /// Attach to a database.
    Attach {
        /// Database path.
        database: String,
        /// User name from the DPB.
        user: String,
        /// Charset name from the DPB.
        charset: String,
        /// SQL role from the DPB.
        role: Option<String>,
    },
    /// Create a database.
    Create {
        /// Database path.
        database: String,
    },
    /// Detach.
    Detach,
    /// Drop the attached database.
    DropDatabase,
    /// Start a transaction.
    Begin {
        /// New transaction handle.
        handle: i32,
        /// Raw TPB.
        tpb: Vec<u8>,
    },
    /// Commit.
    Commit(i32),
    /// Commit retaining.
    CommitRetaining(i32),
    /// Rollback.
    Rollback(i32),
    /// Rollback retaining.
    RollbackRetaining(i32),
    /// Two-phase prepare.
    PrepareTransaction(i32),
    /// Statement prepare.
    Prepare {
        /// SQL text.
        sql: String,
        /// Transaction handle.
        transaction: i32,
    },
    /// Statement execution.
    Execute {
        /// SQL text.
        sql: String,
        /// Transaction handle.
        transaction: i32,
        /// Decoded parameter values.
        params: Vec<SqlValue>,
    },
    /// Fetch request.
    Fetch {
        /// SQL text.
        sql: String,
    },
    /// Statement close (`DSQL_close`).
    CloseStatement {
        /// SQL text.
        sql: String,
    },
    /// Statement drop (`DSQL_drop`).
    DropStatement,
    /// Database info request.
    InfoDatabase,
    /// A blob was opened for reading.
    OpenBlob {
        /// Blob id.
        id: i64,
    },
    /// A created blob was closed with its contents.
    BlobWritten {
        /// Id assigned to the blob.
        id: i64,
        /// Bytes written.
        data: Vec<u8>,
    },
    /// A blob was cancelled.
    CancelBlob,
    /// Network disconnect.
    Disconnect,
}

/// Configuration for the mock GDS server.
#[derive(Debug, Default)]
pub struct MockServerConfig {
    statements: HashMap<String, MockStatement>,
    default_statement: Option<MockStatement>,
    attach_error: Option<MockError>,
    database_info: HashMap<u8, Vec<u8>>,
}

impl MockServerConfig {
    fn find(&self, sql: &str) -> MockStatement {
        self.statements
            .get(sql.trim())
            .cloned()
            .or_else(|| self.default_statement.clone())
            .unwrap_or_else(MockStatement::ddl)
    }
}

/// Builder for [`MockGdsServer`].
#[derive(Debug, Default)]
pub struct MockServerBuilder {
    config: MockServerConfig,
}

impl MockServerBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the behavior for a SQL text (matched after trimming).
    pub fn with_statement(mut self, sql: impl Into<String>, statement: MockStatement) -> Self {
        self.config
            .statements
            .insert(sql.into().trim().to_string(), statement);
        self
    }

    /// Behavior for SQL texts without a script; a DDL statement otherwise.
    pub fn with_default_statement(mut self, statement: MockStatement) -> Self {
        self.config.default_statement = Some(statement);
        self
    }

    /// Reject every attach with `error`.
    pub fn with_attach_error(mut self, error: MockError) -> Self {
        self.config.attach_error = Some(error);
        self
    }

    /// Override the raw answer cluster for a database info item.
    pub fn with_database_info(mut self, item: u8, value: Vec<u8>) -> Self {
        self.config.database_info.insert(item, value);
        self
    }

    /// Build and start the mock server.
    pub async fn build(self) -> Result<MockGdsServer> {
        MockGdsServer::start(self.config).await
    }
}

/// A mock GDS server for testing.
///
/// Each accepted connection gets its own handle space; the event log is
/// shared by all connections.
#[derive(Debug)]
pub struct MockGdsServer {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    kill_tx: broadcast::Sender<()>,
    events: Arc<Mutex<Vec<MockEvent>>>,
    connection_count: Arc<AtomicUsize>,
}

impl MockGdsServer {
    /// Create a new builder for the mock server.
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start the mock server on an available port.
    pub async fn start(config: MockServerConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let (kill_tx, _) = broadcast::channel(4);
        let config = Arc::new(config);
        let events = Arc::new(Mutex::new(Vec::new()));
        let connection_count = Arc::new(AtomicUsize::new(0));

        let server = Self {
            addr,
            shutdown_tx: shutdown_tx.clone(),
            kill_tx: kill_tx.clone(),
            events: events.clone(),
            connection_count: connection_count.clone(),
        };

        let mut shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _peer_addr)) => {
                                let config = config.clone();
                                let events = events.clone();
                                let count = connection_count.clone();
                                let kill_rx = kill_tx.subscribe();
                                tokio::spawn(async move {
                                    count.fetch_add(1, Ordering::SeqCst);
                                    let mut conn = MockConnection::new(config, events);
                                    if let Err(e) = conn.run(stream, kill_rx).await {
                                        tracing::debug!(error = %e, "mock connection error");
                                    }
                                    count.fetch_sub(1, Ordering::SeqCst);
                                });
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "accept error");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Ok(server)
    }

    /// Get the server's listening address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the host string for connection configuration.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the port number.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Connection string pointing at this server.
    pub fn connection_string(&self, database: &str) -> String {
        format!(
            "DataSource={};Port={};Database={};User=SYSDBA;Password=masterkey",
            self.host(),
            self.port(),
            database
        )
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().clone()
    }

    /// Forget all recorded events.
    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Number of recorded events matching `predicate`.
    pub fn count_events(&self, predicate: impl Fn(&MockEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    /// Get the number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// Abruptly close every open connection.
    pub fn kill_connections(&self) {
        let _ = self.kill_tx.send(());
    }

    /// Stop accepting connections.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for MockGdsServer {
    fn drop(&mut self) {
        self.stop();
        self.kill_connections();
    }
}

/// A request decoded from the client.
#[derive(Debug)]
enum ClientRequest {
    Connect,
    Attach {
        create: bool,
        database: String,
        dpb: Bytes,
    },
    Handle(Operation, i32),
    Disconnect,
    Transaction {
        tpb: Bytes,
    },
    Prepare2(i32),
    InfoDatabase {
        items: Bytes,
    },
    PrepareStatement {
        transaction: i32,
        statement: i32,
        sql: String,
    },
    InfoSql {
        statement: i32,
        items: Bytes,
    },
    Execute {
        statement: i32,
        transaction: i32,
        params: Option<RawRow>,
        singleton: bool,
    },
    Fetch {
        statement: i32,
        count: i32,
    },
    Free {
        statement: i32,
        option: i32,
    },
    OpenBlob {
        create: bool,
        transaction: i32,
        id: i64,
    },
    GetSegment {
        blob: i32,
        length: i32,
    },
    PutSegments {
        blob: i32,
        data: Bytes,
        framed: bool,
    },
}

#[derive(Debug)]
struct OpenBlob {
    id: i64,
    data: Vec<u8>,
    position: usize,
    created: bool,
}

#[derive(Debug, Default)]
struct StatementState {
    sql: String,
    script: Option<MockStatement>,
    cursor: Option<usize>,
}

/// Per-connection server state.
struct MockConnection {
    config: Arc<MockServerConfig>,
    events: Arc<Mutex<Vec<MockEvent>>>,
    charset: Charset,
    next_handle: i32,
    transactions: HashMap<i32, bool>,
    statements: HashMap<i32, StatementState>,
    blobs: HashMap<i64, Vec<u8>>,
    open_blobs: HashMap<i32, OpenBlob>,
    next_blob_id: i64,
}

impl MockConnection {
    fn new(config: Arc<MockServerConfig>, events: Arc<Mutex<Vec<MockEvent>>>) -> Self {
        Self {
            config,
            events,
            charset: Charset::NONE,
            next_handle: 1,
            transactions: HashMap::new(),
            statements: HashMap::new(),
            blobs: HashMap::new(),
            open_blobs: HashMap::new(),
            next_blob_id: 0x0000_0081_0000_0000,
        }
    }

    fn record(&self, event: MockEvent) {
        self.events.lock().push(event);
    }

    fn allocate(&mut self) -> i32 {
        self.next_handle += 1;
        self.next_handle
    }

    async fn run(
        &mut self,
        mut stream: TcpStream,
        mut kill_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut input = BytesMut::with_capacity(8192);
        loop {
            loop {
                let mut cursor = &input[..];
                let request = match self.parse_request(&mut cursor) {
                    Ok(request) => request,
                    Err(ProtocolError::UnexpectedEof) => break,
                    Err(e) => return Err(e.into()),
                };
                let used = input.len() - cursor.len();
                input.advance(used);

                let mut output = BytesMut::new();
                let keep_open = self.handle(request, &mut output)?;
                if !output.is_empty() {
                    stream.write_all(&output).await?;
                }
                if !keep_open {
                    return Ok(());
                }
            }

            tokio::select! {
                read = stream.read_buf(&mut input) => {
                    if read? == 0 {
                        return Ok(());
                    }
                }
                _ = kill_rx.recv() => return Ok(()),
            }
        }
    }

    fn parse_request(&self, src: &mut &[u8]) -> std::result::Result<ClientRequest, ProtocolError> {
        let op = Operation::from_i32(xdr::read_i32(src)?)?;
        Ok(match op {
            Operation::Connect => {
                let _attach_op = xdr::read_i32(src)?;
                let _version = xdr::read_i32(src)?;
                let _arch = xdr::read_i32(src)?;
                let _database = xdr::read_buffer(src)?;
                let protocols = xdr::read_i32(src)?;
                let _user_id = xdr::read_buffer(src)?;
                for _ in 0..protocols.max(0) * 5 {
                    xdr::read_i32(src)?;
                }
                ClientRequest::Connect
            }
            Operation::Attach | Operation::Create => {
                let _ = xdr::read_i32(src)?;
                let database = xdr::read_string(src)?;
                let dpb = xdr::read_buffer(src)?;
                ClientRequest::Attach {
                    create: op == Operation::Create,
                    database,
                    dpb,
                }
            }
            Operation::Detach
            | Operation::DropDatabase
            | Operation::Commit
            | Operation::CommitRetaining
            | Operation::Rollback
            | Operation::RollbackRetaining
            | Operation::Prepare
            | Operation::AllocateStatement
            | Operation::CloseBlob
            | Operation::CancelBlob => ClientRequest::Handle(op, xdr::read_i32(src)?),
            Operation::Disconnect => ClientRequest::Disconnect,
            Operation::Transaction => {
                let _db = xdr::read_i32(src)?;
                ClientRequest::Transaction {
                    tpb: xdr::read_buffer(src)?,
                }
            }
            Operation::Prepare2 => {
                let handle = xdr::read_i32(src)?;
                let _message = xdr::read_buffer(src)?;
                ClientRequest::Prepare2(handle)
            }
            Operation::InfoDatabase => {
                let _db = xdr::read_i32(src)?;
                let _incarnation = xdr::read_i32(src)?;
                let items = xdr::read_buffer(src)?;
                let _len = xdr::read_i32(src)?;
                ClientRequest::InfoDatabase { items }
            }
            Operation::PrepareStatement => {
                let transaction = xdr::read_i32(src)?;
                let statement = xdr::read_i32(src)?;
                let _dialect = xdr::read_i32(src)?;
                let sql = self.charset.decode(&xdr::read_buffer(src)?)
                    .map(|s| s.into_owned())
                    .map_err(|_| ProtocolError::MalformedInfo("SQL text"))?;
                let _items = xdr::read_buffer(src)?;
                let _len = xdr::read_i32(src)?;
                ClientRequest::PrepareStatement {
                    transaction,
                    statement,
                    sql,
                }
            }
            Operation::InfoSql => {
                let statement = xdr::read_i32(src)?;
                let _incarnation = xdr::read_i32(src)?;
                let items = xdr::read_buffer(src)?;
                let _len = xdr::read_i32(src)?;
                ClientRequest::InfoSql { statement, items }
            }
            Operation::Execute | Operation::Execute2 => {
                let statement = xdr::read_i32(src)?;
                let transaction = xdr::read_i32(src)?;
                let _blr = xdr::read_buffer(src)?;
                let _message_number = xdr::read_i32(src)?;
                let messages = xdr::read_i32(src)?;
                let params = if messages > 0 {
                    let layout = self
                        .statements
                        .get(&statement)
                        .and_then(|s| s.script.as_ref())
                        .map(|s| s.params.clone())
                        .unwrap_or_default();
                    Some(read_row(src, &layout)?)
                } else {
                    None
                };
                if op == Operation::Execute2 {
                    let _out_blr = xdr::read_buffer(src)?;
                    let _out_message = xdr::read_i32(src)?;
                }
                ClientRequest::Execute {
                    statement,
                    transaction,
                    params,
                    singleton: op == Operation::Execute2,
                }
            }
            Operation::Fetch => {
                let statement = xdr::read_i32(src)?;
                let _blr = xdr::read_buffer(src)?;
                let _message_number = xdr::read_i32(src)?;
                let count = xdr::read_i32(src)?;
                ClientRequest::Fetch { statement, count }
            }
            Operation::FreeStatement => ClientRequest::Free {
                statement: xdr::read_i32(src)?,
                option: xdr::read_i32(src)?,
            },
            Operation::CreateBlob | Operation::OpenBlob => ClientRequest::OpenBlob {
                create: op == Operation::CreateBlob,
                transaction: xdr::read_i32(src)?,
                id: xdr::read_i64(src)?,
            },
            Operation::GetSegment => {
                let blob = xdr::read_i32(src)?;
                let length = xdr::read_i32(src)?;
                let _segment = xdr::read_buffer(src)?;
                ClientRequest::GetSegment { blob, length }
            }
            Operation::PutSegment => ClientRequest::PutSegments {
                blob: xdr::read_i32(src)?,
                data: xdr::read_buffer(src)?,
                framed: false,
            },
            Operation::BatchSegments => {
                let blob = xdr::read_i32(src)?;
                let _len = xdr::read_i32(src)?;
                ClientRequest::PutSegments {
                    blob,
                    data: xdr::read_buffer(src)?,
                    framed: true,
                }
            }
            other => {
                return Err(ProtocolError::UnexpectedOperation {
                    expected: "client request",
                    actual: other.code(),
                });
            }
        })
    }

    /// Handle one request; returns `false` when the connection should end.
    fn handle(&mut self, request: ClientRequest, out: &mut BytesMut) -> Result<bool> {
        match request {
            ClientRequest::Connect => {
                self.record(MockEvent::Connect);
                out.put_i32(Operation::Accept.code());
                out.put_i32(PROTOCOL_VERSION10);
                out.put_i32(1);
                out.put_i32(2);
            }
            ClientRequest::Attach {
                create,
                database,
                dpb,
            } => {
                if let Some(error) = self.config.attach_error.clone() {
                    write_response(out, 0, &[], Some(&error));
                    return Ok(true);
                }
                let attach = parse_dpb(&dpb);
                self.charset = Charset::from_name(&attach.charset).unwrap_or(Charset::NONE);
                if create {
                    self.record(MockEvent::Create {
                        database: database.clone(),
                    });
                }
                self.record(MockEvent::Attach {
                    database,
                    user: attach.user,
                    charset: attach.charset,
                    role: attach.role,
                });
                write_response(out, 1, &[], None);
            }
            ClientRequest::Handle(op, handle) => self.handle_simple(op, handle, out),
            ClientRequest::Disconnect => {
                self.record(MockEvent::Disconnect);
                return Ok(false);
            }
            ClientRequest::Transaction { tpb } => {
                let handle = self.allocate();
                self.transactions.insert(handle, false);
                self.record(MockEvent::Begin {
                    handle,
                    tpb: tpb.to_vec(),
                });
                write_response(out, handle, &[], None);
            }
            ClientRequest::Prepare2(handle) => {
                self.finish_transaction(Operation::Prepare2, handle, out);
            }
            ClientRequest::InfoDatabase { items } => {
                self.record(MockEvent::InfoDatabase);
                let answer = self.database_info(&items);
                write_response(out, 0, &answer, None);
            }
            ClientRequest::PrepareStatement {
                transaction,
                statement,
                sql,
            } => self.prepare(transaction, statement, sql, out),
            ClientRequest::InfoSql { statement, items } => {
                let answer = self
                    .statements
                    .get(&statement)
                    .and_then(|s| s.script.as_ref())
                    .map(|script| sql_info_answer(script, &items));
                match answer {
                    Some(answer) => write_response(out, 0, &answer, None),
                    None => write_response(out, 0, &[], Some(&bad_statement())),
                }
            }
            ClientRequest::Execute {
                statement,
                transaction,
                params,
                singleton,
            } => self.execute(statement, transaction, params, singleton, out)?,
            ClientRequest::Fetch { statement, count } => self.fetch(statement, count, out)?,
            ClientRequest::Free { statement, option } => {
                if option == FreeOption::Drop as i32 {
                    self.statements.remove(&statement);
                    self.record(MockEvent::DropStatement);
                } else if let Some(state) = self.statements.get_mut(&statement) {
                    state.cursor = None;
                    let sql = state.sql.clone();
                    self.record(MockEvent::CloseStatement { sql });
                }
                write_response(out, 0, &[], None);
            }
            ClientRequest::OpenBlob {
                create,
                transaction,
                id,
            } => self.open_blob(create, transaction, id, out),
            ClientRequest::GetSegment { blob, length } => self.get_segment(blob, length, out),
            ClientRequest::PutSegments { blob, data, framed } => {
                let Some(blob) = self.open_blobs.get_mut(&blob).filter(|b| b.created) else {
                    write_response(out, 0, &[], Some(&bad_blob()));
                    return Ok(true);
                };
                if framed {
                    join_segments(&data, &mut blob.data)?;
                } else {
                    blob.data.extend_from_slice(&data);
                }
                write_response(out, 0, &[], None);
            }
        }
        Ok(true)
    }

    fn handle_simple(&mut self, op: Operation, handle: i32, out: &mut BytesMut) {
        match op {
            Operation::Detach => {
                self.record(MockEvent::Detach);
                self.transactions.clear();
                self.statements.clear();
                self.open_blobs.clear();
                write_response(out, 0, &[], None);
            }
            Operation::DropDatabase => {
                self.record(MockEvent::DropDatabase);
                write_response(out, 0, &[], None);
            }
            Operation::AllocateStatement => {
                let handle = self.allocate();
                self.statements.insert(handle, StatementState::default());
                write_response(out, handle, &[], None);
            }
            Operation::CloseBlob => match self.open_blobs.remove(&handle) {
                Some(blob) => {
                    if blob.created {
                        self.record(MockEvent::BlobWritten {
                            id: blob.id,
                            data: blob.data.clone(),
                        });
                        self.blobs.insert(blob.id, blob.data);
                    }
                    write_response(out, 0, &[], None);
                }
                None => write_response(out, 0, &[], Some(&bad_blob())),
            },
            Operation::CancelBlob => match self.open_blobs.remove(&handle) {
                Some(blob) => {
                    if blob.created {
                        self.blobs.remove(&blob.id);
                    }
                    self.record(MockEvent::CancelBlob);
                    write_response(out, 0, &[], None);
                }
                None => write_response(out, 0, &[], Some(&bad_blob())),
            },
            other => self.finish_transaction(other, handle, out),
        }
    }

    fn open_blob(&mut self, create: bool, transaction: i32, id: i64, out: &mut BytesMut) {
        if !self.transactions.contains_key(&transaction) {
            write_response(out, 0, &[], Some(&bad_transaction()));
            return;
        }
        let blob = if create {
            OpenBlob {
                id: self.store_blob(Vec::new()),
                data: Vec::new(),
                position: 0,
                created: true,
            }
        } else {
            let Some(data) = self.blobs.get(&id) else {
                write_response(out, 0, &[], Some(&MockError::new(gds::BAD_SEGSTR_ID, "invalid BLOB ID")));
                return;
            };
            self.record(MockEvent::OpenBlob { id });
            OpenBlob {
                id,
                data: data.clone(),
                position: 0,
                created: false,
            }
        };
        let handle = self.allocate();
        let id = blob.id;
        self.open_blobs.insert(handle, blob);
        write_response_with_id(out, handle, id, &[], None);
    }

    /// Answer with one segment of at most `length - 2` bytes; the answer
    /// handle turns to EOF once the last byte has been sent.
    fn get_segment(&mut self, handle: i32, length: i32, out: &mut BytesMut) {
        let Some(blob) = self.open_blobs.get_mut(&handle).filter(|b| !b.created) else {
            write_response(out, 0, &[], Some(&bad_blob()));
            return;
        };
        let room = usize::try_from(length).unwrap_or(0).min(MAX_SEGMENT_SIZE);
        let remaining = &blob.data[blob.position..];
        let take = remaining.len().min(room.saturating_sub(2).max(1));
        let framed = put_segments(&remaining[..take], take);
        blob.position += take;
        let status = if blob.position >= blob.data.len() {
            SEGMENT_EOF
        } else {
            SEGMENT_COMPLETE
        };
        write_response(out, status, &framed, None);
    }

    /// Keep `data` as a new blob and return its id.
    fn store_blob(&mut self, data: Vec<u8>) -> i64 {
        self.next_blob_id += 1;
        self.blobs.insert(self.next_blob_id, data);
        self.next_blob_id
    }

    /// Scripted row with string and byte values in blob columns moved
    /// into blob storage.
    fn stage_row(&mut self, row: &[SqlValue], columns: &[ColumnDescriptor]) -> Vec<SqlValue> {
        let charset = self.charset;
        row.iter()
            .zip(columns)
            .map(|(value, column)| {
                if !matches!(column.kind(), Ok(ColumnKind::Blob)) {
                    return value.clone();
                }
                match value {
                    SqlValue::String(text) => {
                        let bytes = charset
                            .encode(text)
                            .map(|b| b.into_owned())
                            .unwrap_or_else(|_| text.as_bytes().to_vec());
                        SqlValue::BlobId(self.store_blob(bytes))
                    }
                    SqlValue::Binary(bytes) => SqlValue::BlobId(self.store_blob(bytes.to_vec())),
                    other => other.clone(),
                }
            })
            .collect()
    }

    /// Parameter value with a stored blob id replaced by its contents.
    fn resolve_blob(&self, value: SqlValue, column: &ColumnDescriptor) -> SqlValue {
        let SqlValue::BlobId(id) = value else {
            return value;
        };
        match self.blobs.get(&id) {
            Some(data) if column.sub_type == 1 => SqlValue::String(
                self.charset
                    .decode(data)
                    .map(|s| s.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(data).into_owned()),
            ),
            Some(data) => SqlValue::Binary(Bytes::from(data.clone())),
            None => value,
        }
    }

    fn finish_transaction(&mut self, op: Operation, handle: i32, out: &mut BytesMut) {
        if !self.transactions.contains_key(&handle) {
            write_response(out, 0, &[], Some(&bad_transaction()));
            return;
        }
        match op {
            Operation::Commit => {
                self.transactions.remove(&handle);
                self.record(MockEvent::Commit(handle));
            }
            Operation::Rollback => {
                self.transactions.remove(&handle);
                self.record(MockEvent::Rollback(handle));
            }
            Operation::CommitRetaining => self.record(MockEvent::CommitRetaining(handle)),
            Operation::RollbackRetaining => self.record(MockEvent::RollbackRetaining(handle)),
            _ => {
                self.transactions.insert(handle, true);
                self.record(MockEvent::PrepareTransaction(handle));
            }
        }
        write_response(out, 0, &[], None);
    }

    fn prepare(&mut self, transaction: i32, statement: i32, sql: String, out: &mut BytesMut) {
        self.record(MockEvent::Prepare {
            sql: sql.clone(),
            transaction,
        });
        if !self.transactions.contains_key(&transaction) {
            write_response(out, 0, &[], Some(&bad_transaction()));
            return;
        }
        let script = self.config.find(&sql);
        if let Some(error) = &script.prepare_error {
            write_response(out, 0, &[], Some(error));
            return;
        }
        let Some(state) = self.statements.get_mut(&statement) else {
            write_response(out, 0, &[], Some(&bad_statement()));
            return;
        };
        let answer = describe_answer(sql_info::SELECT, &script.columns, 1, script.describe_chunk);
        state.sql = sql;
        state.cursor = None;
        state.script = Some(script);
        write_response(out, 0, &answer, None);
    }

    fn execute(
        &mut self,
        statement: i32,
        transaction: i32,
        params: Option<RawRow>,
        singleton: bool,
        out: &mut BytesMut,
    ) -> Result<()> {
        let charset = self.charset;
        let Some(script) = self
            .statements
            .get(&statement)
            .and_then(|state| state.script.clone())
        else {
            write_response(out, 0, &[], Some(&bad_statement()));
            return Ok(());
        };

        let mut values = Vec::new();
        if let Some(row) = params {
            for (raw, column) in row.iter().zip(&script.params) {
                let value = decode_value(raw, column, charset)
                    .map_err(|e| MockServerError::Encoding(e.to_string()))?;
                values.push(self.resolve_blob(value, column));
            }
        }
        let staged = match script.rows.first() {
            Some(row) if singleton => Some(self.stage_row(row, &script.columns)),
            _ => None,
        };
        let Some(state) = self.statements.get_mut(&statement) else {
            write_response(out, 0, &[], Some(&bad_statement()));
            return Ok(());
        };
        let sql = state.sql.clone();
        if script.statement_type.returns_cursor() && !singleton {
            state.cursor = Some(0);
        }
        self.record(MockEvent::Execute {
            sql,
            transaction,
            params: values,
        });

        if !self.transactions.contains_key(&transaction) {
            write_response(out, 0, &[], Some(&bad_transaction()));
            return Ok(());
        }
        if let Some(error) = &script.execute_error {
            write_response(out, 0, &[], Some(error));
            return Ok(());
        }
        if singleton {
            out.put_i32(Operation::SqlResponse.code());
            match staged {
                Some(row) => {
                    out.put_i32(1);
                    encode_row(out, &row, &script.columns, charset)?;
                }
                None => out.put_i32(0),
            }
        }
        write_response(out, 0, &[], None);
        Ok(())
    }

    fn fetch(&mut self, statement: i32, count: i32, out: &mut BytesMut) -> Result<()> {
        let charset = self.charset;
        let Some(state) = self.statements.get(&statement) else {
            write_response(out, 0, &[], Some(&bad_statement()));
            return Ok(());
        };
        let (Some(script), Some(position)) = (state.script.clone(), state.cursor) else {
            write_response(out, 0, &[], Some(&bad_statement()));
            return Ok(());
        };

        let batch = count.max(1) as usize;
        let end = (position + batch).min(script.rows.len());
        for row in &script.rows[position..end] {
            let row = self.stage_row(row, &script.columns);
            out.put_i32(Operation::FetchResponse.code());
            out.put_i32(0);
            out.put_i32(1);
            encode_row(out, &row, &script.columns, charset)?;
        }
        let Some(state) = self.statements.get_mut(&statement) else {
            return Ok(());
        };
        out.put_i32(Operation::FetchResponse.code());
        out.put_i32(if end == script.rows.len() { 100 } else { 0 });
        out.put_i32(0);
        state.cursor = Some(end);

        let sql = state.sql.clone();
        self.record(MockEvent::Fetch { sql });
        Ok(())
    }

    fn database_info(&self, items: &[u8]) -> Vec<u8> {
        let mut answer = Vec::new();
        for &item in items {
            if item == info::END {
                break;
            }
            answer.push(item);
            let value = match self.config.database_info.get(&item) {
                Some(value) => value.clone(),
                None => default_database_info(item),
            };
            write_vax(&mut answer, value.len() as i64, 2);
            answer.extend_from_slice(&value);
        }
        answer.push(info::END);
        answer
    }
}

struct AttachInfo {
    user: String,
    charset: String,
    role: Option<String>,
}

fn parse_dpb(buf: &[u8]) -> AttachInfo {
    let mut attach = AttachInfo {
        user: String::new(),
        charset: "NONE".to_string(),
        role: None,
    };
    let mut pos = 1;
    while pos + 1 < buf.len() {
        let item = buf[pos];
        let len = buf[pos + 1] as usize;
        let start = pos + 2;
        let end = (start + len).min(buf.len());
        let text = String::from_utf8_lossy(&buf[start..end]).into_owned();
        match item {
            dpb::USER_NAME => attach.user = text,
            dpb::LC_CTYPE => attach.charset = text,
            dpb::SQL_ROLE_NAME => attach.role = Some(text),
            _ => {}
        }
        pos = end;
    }
    attach
}

fn default_database_info(item: u8) -> Vec<u8> {
    fn int(value: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_vax(&mut buf, value, 4);
        buf
    }
    fn counted(text: &str) -> Vec<u8> {
        let mut buf = vec![1, text.len() as u8];
        buf.extend_from_slice(text.as_bytes());
        buf
    }
    match item {
        info::PAGE_SIZE => int(8192),
        info::NUM_BUFFERS => int(2048),
        info::ODS_VERSION => int(12),
        info::ODS_MINOR_VERSION => int(2),
        info::DB_SQL_DIALECT => int(3),
        info::FORCED_WRITES => int(1),
        info::DB_READ_ONLY | info::NO_RESERVE => int(0),
        info::DB_CLASS => int(info::SERVER_ACCESS),
        info::ISC_VERSION => counted("LI-V3.0.10 Mock"),
        info::FIREBIRD_VERSION => counted("LI-V3.0.10.33601 Firebird 3.0"),
        info::BASE_LEVEL => vec![1, 3],
        info::IMPLEMENTATION => vec![1, 66, 1],
        _ => int(0),
    }
}

fn bad_transaction() -> MockError {
    MockError::new(
        gds::BAD_TRANS_HANDLE,
        "invalid transaction handle (expecting explicit transaction start)",
    )
}

fn bad_blob() -> MockError {
    MockError::new(gds::BAD_SEGSTR_HANDLE, "invalid BLOB handle")
}

fn bad_statement() -> MockError {
    MockError::new(gds::BAD_STMT_HANDLE, "invalid statement handle")
}

/// Write an `op_response`.
fn write_response(out: &mut BytesMut, handle: i32, data: &[u8], error: Option<&MockError>) {
    write_response_with_id(out, handle, 0, data, error);
}

/// Write an `op_response` carrying a blob id.
fn write_response_with_id(
    out: &mut BytesMut,
    handle: i32,
    blob_id: i64,
    data: &[u8],
    error: Option<&MockError>,
) {
    out.put_i32(Operation::Response.code());
    out.put_i32(handle);
    out.put_i64(blob_id);
    xdr::write_buffer(out, data);
    match error {
        Some(error) => {
            out.put_i32(arg::GDS);
            out.put_i32(error.code);
            if !error.message.is_empty() {
                out.put_i32(arg::INTERPRETED);
                xdr::write_string(out, error.message.as_bytes());
            }
            if let Some(state) = &error.sql_state {
                out.put_i32(arg::SQL_STATE);
                xdr::write_string(out, state.as_bytes());
            }
        }
        None => {
            out.put_i32(arg::GDS);
            out.put_i32(0);
        }
    }
    out.put_i32(arg::END);
}

fn encode_row(
    out: &mut BytesMut,
    row: &[SqlValue],
    columns: &[ColumnDescriptor],
    charset: Charset,
) -> Result<()> {
    for (value, column) in row.iter().zip(columns) {
        encode_value(value, column, charset, out)
            .map_err(|e| MockServerError::Encoding(e.to_string()))?;
    }
    Ok(())
}

/// Describe answer starting at one-based `start`.
fn describe_answer(
    section: u8,
    vars: &[ColumnDescriptor],
    start: usize,
    chunk: Option<usize>,
) -> Vec<u8> {
    let first = start.max(1) - 1;
    let end = match chunk {
        Some(size) => (first + size).min(vars.len()),
        None => vars.len(),
    };
    let selected: Vec<(usize, &ColumnDescriptor)> = vars
        .iter()
        .enumerate()
        .skip(first)
        .take(end.saturating_sub(first))
        .map(|(i, v)| (i + 1, v))
        .collect();
    encode_describe(section, vars.len(), &selected, end < vars.len())
}

/// Answer an `op_info_sql` request.
fn sql_info_answer(script: &MockStatement, items: &[u8]) -> Vec<u8> {
    let mut items = items;
    let mut start = 1usize;
    if items.first() == Some(&sql_info::SQLDA_START) {
        start = vax_integer(items, 2, 2).unwrap_or(1).max(1) as usize;
        items = items.get(4..).unwrap_or_default();
    }

    match items.first().copied() {
        Some(sql_info::SELECT) => {
            describe_answer(sql_info::SELECT, &script.columns, start, script.describe_chunk)
        }
        Some(sql_info::BIND) => {
            describe_answer(sql_info::BIND, &script.params, start, script.describe_chunk)
        }
        Some(sql_info::STMT_TYPE) => {
            let mut answer = vec![sql_info::STMT_TYPE, 4, 0];
            write_vax(&mut answer, script.statement_type.code(), 4);
            answer.push(info::END);
            answer
        }
        Some(sql_info::RECORDS) => {
            let (inserted, updated, deleted) = script.counts;
            let selected = if script.statement_type.returns_cursor() {
                script.rows.len() as i64
            } else {
                0
            };
            let mut inner = Vec::new();
            for (item, value) in [
                (req_info::SELECT_COUNT, selected),
                (req_info::INSERT_COUNT, inserted),
                (req_info::UPDATE_COUNT, updated),
                (req_info::DELETE_COUNT, deleted),
            ] {
                inner.extend_from_slice(&[item, 4, 0]);
                write_vax(&mut inner, value, 4);
            }
            inner.push(info::END);
            let mut answer = vec![sql_info::RECORDS];
            write_vax(&mut answer, inner.len() as i64, 2);
            answer.extend_from_slice(&inner);
            answer.push(info::END);
            answer
        }
        Some(sql_info::GET_PLAN) => {
            let plan = script.plan.clone().unwrap_or_default();
            let mut answer = vec![sql_info::GET_PLAN];
            write_vax(&mut answer, plan.len() as i64, 2);
            answer.extend_from_slice(plan.as_bytes());
            answer.push(info::END);
            answer
        }
        _ => vec![info::END],
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::fixtures::{int_column, varchar_column};
    use gds_protocol::{DescribeProgress, DescriptorSet};

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockGdsServer::builder().build().await.unwrap();

        assert!(server.port() > 0);
        assert_eq!(server.host(), "127.0.0.1");
        assert!(
            server
                .connection_string("test.fdb")
                .contains("Database=test.fdb")
        );
    }

    #[test]
    fn test_unscripted_sql_is_ddl() {
        let config = MockServerConfig::default();
        assert_eq!(config.find("CREATE TABLE T (A INT)").statement_type, StatementType::Ddl);
    }

    #[test]
    fn test_chunked_describe_resumes() {
        let columns = vec![int_column("A"), int_column("B"), varchar_column("C", 10)];
        let first = describe_answer(sql_info::SELECT, &columns, 1, Some(2));
        let mut set = DescriptorSet::new();
        assert_eq!(
            set.parse(&first).unwrap(),
            DescribeProgress::Truncated { last_index: 2 }
        );
        let rest = describe_answer(sql_info::SELECT, &columns, 3, Some(2));
        assert_eq!(set.parse(&rest).unwrap(), DescribeProgress::Complete);
        assert_eq!(set.finish().unwrap().len(), 3);
    }

    #[test]
    fn test_records_answer() {
        let script = MockStatement::update(7);
        let answer = sql_info_answer(&script, &[sql_info::RECORDS, info::END]);
        let counts = gds_protocol::info::parse_record_counts(&answer).unwrap();
        assert_eq!(counts.updated, 7);
        assert_eq!(counts.modified(), 7);
    }

    #[test]
    fn test_error_response_layout() {
        let mut out = BytesMut::new();
        write_response(&mut out, 0, &[], Some(&MockError::new(335_544_580, "Table unknown")));
        let mut src = out.freeze();
        match gds_protocol::decode_message(&mut src, None).unwrap() {
            gds_protocol::ServerMessage::Response(r) => {
                assert_eq!(r.status.code(), Some(335_544_580));
                assert_eq!(r.status.message(), "Table unknown");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_blob_columns_are_staged_into_storage() {
        let mut conn = MockConnection::new(
            Arc::new(MockServerConfig::default()),
            Arc::new(Mutex::new(Vec::new())),
        );
        let columns = vec![int_column("ID"), crate::fixtures::blob_column("DATA")];
        let row = conn.stage_row(
            &[SqlValue::Int(1), SqlValue::Binary(Bytes::from_static(b"xyz"))],
            &columns,
        );
        assert_eq!(row[0], SqlValue::Int(1));
        let SqlValue::BlobId(id) = row[1] else {
            panic!("expected blob id, got {:?}", row[1]);
        };
        assert_eq!(conn.blobs.get(&id).map(Vec::as_slice), Some(&b"xyz"[..]));
        assert_eq!(
            conn.resolve_blob(SqlValue::BlobId(id), &columns[1]),
            SqlValue::Binary(Bytes::from_static(b"xyz"))
        );
    }

    #[test]
    fn test_get_segment_flags_eof_with_last_chunk() {
        let mut conn = MockConnection::new(
            Arc::new(MockServerConfig::default()),
            Arc::new(Mutex::new(Vec::new())),
        );
        let id = conn.store_blob(b"abcdef".to_vec());
        conn.transactions.insert(5, false);
        let mut out = BytesMut::new();
        conn.open_blob(false, 5, id, &mut out);
        let mut src = out.freeze();
        let handle = match gds_protocol::decode_message(&mut src, None).unwrap() {
            gds_protocol::ServerMessage::Response(r) => {
                assert_eq!(r.blob_id, id);
                r.handle
            }
            other => panic!("unexpected {other:?}"),
        };

        let mut out = BytesMut::new();
        conn.get_segment(handle, 6, &mut out);
        conn.get_segment(handle, 6, &mut out);
        let mut src = out.freeze();
        let mut data = Vec::new();
        let mut statuses = Vec::new();
        for _ in 0..2 {
            match gds_protocol::decode_message(&mut src, None).unwrap() {
                gds_protocol::ServerMessage::Response(r) => {
                    join_segments(&r.data, &mut data).unwrap();
                    statuses.push(r.handle);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(data, b"abcdef");
        assert_eq!(statuses, vec![SEGMENT_COMPLETE, SEGMENT_EOF]);
    }

    #[test]
    fn test_parse_dpb() {
        let buf = gds_protocol::DatabaseParameterBuffer::new()
            .string(dpb::USER_NAME, "SYSDBA")
            .string(dpb::LC_CTYPE, "UTF8");
        let attach = parse_dpb(buf.as_bytes());
        assert_eq!(attach.user, "SYSDBA");
        assert_eq!(attach.charset, "UTF8");
        assert!(attach.role.is_none());
    }
}
