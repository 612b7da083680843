//! Physical database attachment.
//!
//! An [`Attachment`] owns the TCP connection and the server-side database
//! handle. It performs the protocol handshake, attaches to (or creates) a
//! database, and offers a single request/response primitive that turns
//! failed status vectors into [`Error::Server`].

use bytes::Bytes;
use firebird_types::Charset;
use gds_codec::Connection;
use gds_protocol::isc::{dpb, info};
use gds_protocol::request;
use gds_protocol::{
    DatabaseParameterBuffer, GenericResponse, InfoValue, Operation, ServerMessage,
};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::Config;
use crate::error::{Error, Result, log_warnings};

/// Host name sent in the handshake's user identification block.
const CLIENT_HOST: &str = "firebird-client";

/// Buffer size requested for database info answers.
const INFO_BUFFER_SIZE: i32 = 1024;

/// An attached database.
pub struct Attachment {
    conn: Connection<TcpStream>,
    handle: i32,
    charset: Charset,
    dialect: i32,
    database: String,
    packet_size: u32,
    detached: bool,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("handle", &self.handle)
            .field("database", &self.database)
            .field("charset", &self.charset.name())
            .field("detached", &self.detached)
            .finish()
    }
}

impl Attachment {
    /// Connect and attach to an existing database.
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(config, Operation::Attach, None).await
    }

    /// Connect and create a new database, leaving it attached.
    pub async fn create(config: &Config, page_size: Option<i32>) -> Result<Self> {
        Self::open(config, Operation::Create, page_size).await
    }

    async fn open(config: &Config, op: Operation, page_size: Option<i32>) -> Result<Self> {
        if config.database.is_empty() {
            return Err(Error::Config("database is required".into()));
        }

        let addr = config.address();
        tracing::info!(host = %config.host, port = config.port, database = %config.database, "connecting to Firebird");

        let stream = timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(|e| Error::Connection(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;

        let mut conn = Connection::new(stream);
        handshake(&mut conn, config).await?;

        let dpb = build_dpb(config, page_size);
        conn.send(request::attach(op, &config.database, dpb.as_bytes()))
            .await?;
        let response = conn.read_generic_response().await?;
        if response.status.is_error() {
            let _ = conn.close().await;
            return Err(Error::from_status(response.status));
        }
        log_warnings(&response.status);

        tracing::debug!(handle = response.handle, created = (op == Operation::Create), "attached to database");

        Ok(Self {
            conn,
            handle: response.handle,
            charset: config.charset,
            dialect: config.dialect,
            database: config.database.clone(),
            packet_size: config.packet_size,
            detached: false,
        })
    }

    /// Server-side database handle.
    #[must_use]
    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// Negotiated connection charset.
    #[must_use]
    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// SQL dialect used to prepare statements.
    #[must_use]
    pub fn dialect(&self) -> i32 {
        self.dialect
    }

    /// Database path this attachment was opened with.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Segment size used for blob transfers: the configured packet size.
    #[must_use]
    pub fn segment_size(&self) -> usize {
        (self.packet_size as usize).min(gds_protocol::blob::MAX_SEGMENT_SIZE)
    }

    /// Whether the attachment can still carry requests.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.detached && !self.conn.is_closed()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    /// Send one request and read its `op_response`.
    ///
    /// Warnings are logged; a failed status vector becomes an error.
    pub async fn call(&mut self, request: Bytes) -> Result<GenericResponse> {
        self.ensure_active()?;
        let response = self.conn.call(request).await?;
        if response.status.is_error() {
            return Err(Error::from_status(response.status));
        }
        log_warnings(&response.status);
        Ok(response)
    }

    /// Send a request without reading its answer.
    pub(crate) async fn send(&mut self, request: Bytes) -> Result<()> {
        self.ensure_active()?;
        self.conn.send(request).await?;
        Ok(())
    }

    /// Read the next message, skipping keep-alive packets.
    pub(crate) async fn read_message(&mut self) -> Result<ServerMessage> {
        Ok(self.conn.read_response().await?)
    }

    /// Read an `op_response`, turning a failed status into an error.
    pub(crate) async fn read_generic(&mut self) -> Result<GenericResponse> {
        let response = self.conn.read_generic_response().await?;
        if response.status.is_error() {
            return Err(Error::from_status(response.status));
        }
        log_warnings(&response.status);
        Ok(response)
    }

    /// Set the row layout used to decode upcoming fetch and SQL responses.
    pub(crate) fn set_row_layout(
        &mut self,
        layout: Option<std::sync::Arc<[gds_protocol::ColumnDescriptor]>>,
    ) {
        self.conn.set_row_layout(layout);
    }

    /// Request database information items.
    pub async fn database_info(&mut self, items: &[u8]) -> Result<Vec<(u8, InfoValue)>> {
        let request = request::info_database(
            self.handle,
            &gds_protocol::info::database_info_items(items),
            INFO_BUFFER_SIZE,
        );
        let response = self.call(request).await?;
        Ok(gds_protocol::info::decode_database_info(&response.data)?)
    }

    /// Check that the server still answers on this attachment.
    pub async fn ping(&mut self) -> Result<()> {
        self.database_info(&[info::ODS_VERSION]).await.map(|_| ())
    }

    /// Detach from the database and close the network connection.
    pub async fn detach(&mut self) -> Result<()> {
        if self.detached {
            return Ok(());
        }
        let result = self
            .call(request::handle_only(Operation::Detach, self.handle))
            .await;
        self.disconnect().await;
        tracing::debug!(handle = self.handle, "detached from database");
        result.map(|_| ())
    }

    /// Drop the attached database and close the network connection.
    pub async fn drop_database(&mut self) -> Result<()> {
        let result = self
            .call(request::handle_only(Operation::DropDatabase, self.handle))
            .await;
        self.disconnect().await;
        tracing::debug!(database = %self.database, "dropped database");
        result.map(|_| ())
    }

    async fn disconnect(&mut self) {
        self.detached = true;
        if !self.conn.is_closed() {
            if let Err(e) = self.conn.send(request::disconnect()).await {
                tracing::trace!(error = %e, "disconnect request failed");
            }
            let _ = self.conn.close().await;
        }
    }
}

async fn handshake(conn: &mut Connection<TcpStream>, config: &Config) -> Result<()> {
    conn.send(request::connect(&config.database, &config.user, CLIENT_HOST))
        .await?;
    match conn.read_response().await? {
        ServerMessage::Accept { version, .. } => {
            tracing::trace!(version, "protocol accepted");
            Ok(())
        }
        ServerMessage::Reject => Err(Error::ConnectionRejected),
        ServerMessage::Response(response) if response.status.is_error() => {
            Err(Error::from_status(response.status))
        }
        other => Err(Error::Connection(format!(
            "unexpected handshake answer {}",
            other.name()
        ))),
    }
}

fn build_dpb(config: &Config, page_size: Option<i32>) -> DatabaseParameterBuffer {
    let mut dpb = DatabaseParameterBuffer::new()
        .int(dpb::DUMMY_PACKET_INTERVAL, 120)
        .byte(dpb::SQL_DIALECT, config.dialect.clamp(1, 3) as u8)
        .string(dpb::LC_CTYPE, config.charset.name())
        .string(dpb::USER_NAME, &config.user)
        .string(dpb::PASSWORD, &config.password)
        .int(
            dpb::CONNECT_TIMEOUT,
            i32::try_from(config.connect_timeout.as_secs()).unwrap_or(i32::MAX),
        );
    if let Some(role) = &config.role {
        dpb = dpb.string(dpb::SQL_ROLE_NAME, role);
    }
    if let Some(size) = page_size {
        dpb = dpb.int(dpb::PAGE_SIZE, size);
    }
    dpb
}
