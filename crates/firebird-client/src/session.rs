//! Database session.
//!
//! A [`Session`] is one logical connection: it owns the physical
//! [`Attachment`], the session's single transaction context and the flag
//! that marks an open data reader. Commands, transactions and readers
//! borrow the session mutably for every round-trip, so only one request
//! is ever in flight.

use gds_protocol::InfoValue;

use crate::attachment::Attachment;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::info::{DATABASE_INFO_ITEMS, DatabaseInfo};
use crate::transaction::{
    IsolationLevel, PARALLEL_TRANSACTIONS, TRANSACTION_COMPLETED, Transaction, TransactionContext,
};

pub(crate) const READER_OPEN: &str =
    "There is already an open DataReader associated with this Connection which must be closed first.";
pub(crate) const PENDING_TRANSACTION: &str = "Execute requires the Command object to have a \
    Transaction object when the Connection object assigned to the command is in a pending local \
    transaction.";

/// A logical connection to a Firebird database.
///
/// # Example
///
/// ```rust,ignore
/// use firebird_client::{Command, Config, Session};
///
/// let config = Config::from_connection_string(
///     "DataSource=localhost;Database=/data/app.fdb;User=SYSDBA;Password=masterkey",
/// )?;
/// let mut session = Session::connect(config).await?;
/// let mut cmd = Command::new("SELECT COUNT(*) FROM RDB$RELATIONS");
/// let count = cmd.execute_scalar(&mut session).await?;
/// session.close().await?;
/// ```
#[derive(Debug)]
pub struct Session {
    config: Config,
    attachment: Option<Attachment>,
    transaction: Option<TransactionContext>,
    reader_open: bool,
    next_transaction_id: u64,
}

impl Session {
    /// Create a closed session; call [`Session::open`] to attach.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            attachment: None,
            transaction: None,
            reader_open: false,
            next_transaction_id: 1,
        }
    }

    /// Create a session and attach to the configured database.
    pub async fn connect(config: Config) -> Result<Self> {
        let mut session = Self::new(config);
        session.open().await?;
        Ok(session)
    }

    /// Create the configured database and keep it attached.
    pub async fn create_database(config: Config, page_size: Option<i32>) -> Result<Self> {
        let attachment = Attachment::create(&config, page_size).await?;
        let mut session = Self::new(config);
        session.attachment = Some(attachment);
        Ok(session)
    }

    /// Attach to the database. Does nothing when already open.
    pub async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        self.attachment = Some(Attachment::connect(&self.config).await?);
        self.transaction = None;
        self.reader_open = false;
        Ok(())
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the session is attached.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.attachment.as_ref().is_some_and(Attachment::is_active)
    }

    /// Whether an explicit transaction is active.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transaction
            .as_ref()
            .is_some_and(|ctx| !ctx.implicit && !ctx.state.is_updated())
    }

    /// Whether a data reader is open on this session.
    #[must_use]
    pub fn is_reader_open(&self) -> bool {
        self.reader_open
    }

    /// Begin a read-committed transaction.
    pub async fn begin_transaction(&mut self) -> Result<Transaction> {
        self.begin_transaction_with(IsolationLevel::default()).await
    }

    /// Begin a transaction with the given isolation level.
    ///
    /// Only one transaction may be active per session.
    pub async fn begin_transaction_with(&mut self, isolation: IsolationLevel) -> Result<Transaction> {
        self.ensure_no_reader()?;
        self.settle_implicit().await;
        if self.transaction.is_some() {
            return Err(Error::InvalidOperation(PARALLEL_TRANSACTIONS.into()));
        }

        let id = self.allocate_transaction_id();
        let attachment = self.attachment_mut()?;
        let ctx = TransactionContext::begin(attachment, id, isolation, false).await?;
        self.transaction = Some(ctx);
        Ok(Transaction::new(id, isolation))
    }

    /// Decoded answers for the given database info items.
    pub async fn database_info_items(&mut self, items: &[u8]) -> Result<Vec<(u8, InfoValue)>> {
        self.attachment_mut()?.database_info(items).await
    }

    /// Server and database properties.
    pub async fn database_info(&mut self) -> Result<DatabaseInfo> {
        let items = self.database_info_items(&DATABASE_INFO_ITEMS).await?;
        Ok(DatabaseInfo::from_items(items))
    }

    /// Check that the server still answers.
    pub async fn ping(&mut self) -> Result<()> {
        self.attachment_mut()?.ping().await
    }

    /// Roll back any active transaction and detach.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut attachment) = self.attachment.take() else {
            return Ok(());
        };
        self.reader_open = false;
        if let Some(mut ctx) = self.transaction.take() {
            if !ctx.state.is_updated() && attachment.is_active() {
                if let Err(e) = ctx.rollback(&mut attachment).await {
                    tracing::warn!(error = %e, "rollback on close failed");
                }
            }
        }
        attachment.detach().await
    }

    /// Roll back whatever transaction is still open and forget any reader,
    /// leaving the attachment ready for another user.
    pub async fn reset(&mut self) -> Result<()> {
        self.reader_open = false;
        let Some(mut ctx) = self.transaction.take() else {
            return Ok(());
        };
        if ctx.state.is_updated() {
            return Ok(());
        }
        let attachment = self.attachment_mut()?;
        tracing::debug!(handle = ctx.handle, implicit = ctx.implicit, "rolling back on reset");
        ctx.rollback(attachment).await
    }

    /// Drop the attached database and close the session.
    pub async fn drop_database(&mut self) -> Result<()> {
        let mut attachment = self.attachment.take().ok_or(Error::ConnectionClosed)?;
        self.reader_open = false;
        if let Some(mut ctx) = self.transaction.take() {
            if !ctx.state.is_updated() {
                if let Err(e) = ctx.rollback(&mut attachment).await {
                    tracing::warn!(error = %e, "rollback before drop failed");
                }
            }
        }
        attachment.drop_database().await
    }

    pub(crate) fn attachment_mut(&mut self) -> Result<&mut Attachment> {
        match self.attachment.as_mut() {
            Some(attachment) if attachment.is_active() => Ok(attachment),
            _ => Err(Error::ConnectionClosed),
        }
    }

    pub(crate) fn context(&self) -> Option<&TransactionContext> {
        self.transaction.as_ref()
    }

    pub(crate) fn clear_transaction(&mut self) {
        self.transaction = None;
    }

    pub(crate) fn set_reader_open(&mut self, open: bool) {
        self.reader_open = open;
    }

    fn allocate_transaction_id(&mut self) -> u64 {
        let id = self.next_transaction_id;
        self.next_transaction_id += 1;
        id
    }

    fn ensure_no_reader(&self) -> Result<()> {
        if self.reader_open {
            Err(Error::InvalidOperation(READER_OPEN.into()))
        } else {
            Ok(())
        }
    }

    /// Attachment and context of the explicit transaction `id`.
    pub(crate) fn explicit_context(
        &mut self,
        id: u64,
    ) -> Result<(&mut Attachment, &mut TransactionContext)> {
        self.ensure_no_reader()?;
        let attachment = match self.attachment.as_mut() {
            Some(attachment) if attachment.is_active() => attachment,
            _ => return Err(Error::ConnectionClosed),
        };
        match self.transaction.as_mut() {
            Some(ctx) if ctx.id == id && !ctx.implicit && !ctx.state.is_updated() => {
                Ok((attachment, ctx))
            }
            _ => Err(Error::Transaction(TRANSACTION_COMPLETED.into())),
        }
    }

    /// Transaction handle a command should run under.
    ///
    /// A command bound to `requested` must name the session's active
    /// transaction. Otherwise an implicit transaction owned by `command`
    /// is started, unless an explicit one is pending.
    pub(crate) async fn command_transaction(
        &mut self,
        command: u64,
        requested: Option<&Transaction>,
    ) -> Result<i32> {
        if let Some(tx) = requested {
            return match &self.transaction {
                Some(ctx) if ctx.id == tx.id() && !ctx.state.is_updated() => Ok(ctx.handle),
                _ => Err(Error::Transaction(TRANSACTION_COMPLETED.into())),
            };
        }

        match &self.transaction {
            Some(ctx) if ctx.implicit && ctx.owner == Some(command) && !ctx.state.is_updated() => {
                return Ok(ctx.handle);
            }
            Some(ctx) if !ctx.implicit && !ctx.state.is_updated() => {
                return Err(Error::InvalidOperation(PENDING_TRANSACTION.into()));
            }
            _ => {}
        }
        self.settle_implicit().await;

        let id = self.allocate_transaction_id();
        let attachment = self.attachment_mut()?;
        let mut ctx =
            TransactionContext::begin(attachment, id, IsolationLevel::default(), true).await?;
        ctx.owner = Some(command);
        let handle = ctx.handle;
        self.transaction = Some(ctx);
        Ok(handle)
    }

    /// End the implicit transaction owned by `command`.
    ///
    /// On success it is committed and a commit failure is returned; on
    /// failure it is rolled back and rollback errors are only logged.
    /// Either way the context is discarded.
    pub(crate) async fn finish_implicit(&mut self, command: u64, success: bool) -> Result<()> {
        let owned = self
            .transaction
            .as_ref()
            .is_some_and(|ctx| ctx.implicit && ctx.owner == Some(command));
        if !owned {
            return Ok(());
        }
        let Some(mut ctx) = self.transaction.take() else {
            return Ok(());
        };
        if ctx.state.is_updated() {
            return Ok(());
        }
        let Some(attachment) = self.attachment.as_mut().filter(|a| a.is_active()) else {
            return Ok(());
        };

        if success {
            let result = ctx.commit(attachment).await;
            if result.is_err() {
                if let Err(e) = ctx.rollback(attachment).await {
                    tracing::warn!(error = %e, "implicit transaction rollback failed");
                }
            }
            result
        } else {
            if let Err(e) = ctx.rollback(attachment).await {
                tracing::warn!(error = %e, "implicit transaction rollback failed");
            }
            Ok(())
        }
    }

    /// Commit an implicit transaction left behind by a reader that was
    /// dropped without being closed.
    async fn settle_implicit(&mut self) {
        let leftover = self.transaction.as_ref().is_some_and(|ctx| ctx.implicit);
        if !leftover {
            return;
        }
        if let Some(owner) = self.transaction.as_ref().and_then(|ctx| ctx.owner) {
            tracing::debug!(command = owner, "settling leftover implicit transaction");
            if let Err(e) = self.finish_implicit(owner, true).await {
                tracing::warn!(error = %e, "leftover implicit transaction commit failed");
            }
        }
        self.transaction = None;
    }
}
