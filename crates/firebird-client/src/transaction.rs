//! Transaction support.
//!
//! This module provides isolation levels, the server-side transaction
//! context owned by a [`Session`], and the user-visible [`Transaction`]
//! handle with savepoint support.
//!
//! A session carries at most one transaction at a time. The context moves
//! through `None -> Started -> (Prepared) -> Committed | RolledBack`; once
//! committed or rolled back it is "updated" and can no longer be used.

use gds_protocol::isc::tpb;
use gds_protocol::request;
use gds_protocol::{Operation, TransactionParameterBuffer};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::attachment::Attachment;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::statement::Statement;

pub(crate) const PARALLEL_TRANSACTIONS: &str =
    "A transaction is currently active. Parallel transactions are not supported.";
pub(crate) const TRANSACTION_COMPLETED: &str =
    "This transaction has completed; it is no longer usable.";

/// Transaction isolation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read committed, seeing the latest committed record versions.
    ReadUncommitted,

    /// Read committed, waiting on uncommitted record versions.
    #[default]
    ReadCommitted,

    /// Snapshot of the database taken at transaction start.
    RepeatableRead,

    /// Snapshot with table-level consistency locks.
    Serializable,
}

impl IsolationLevel {
    /// Transaction parameter buffer requesting this isolation level.
    ///
    /// Every buffer asks for read-write access and waits on lock conflicts.
    #[must_use]
    pub fn tpb(&self) -> TransactionParameterBuffer {
        let base = TransactionParameterBuffer::new()
            .flag(tpb::WRITE)
            .flag(tpb::WAIT);
        match self {
            Self::Serializable => base.flag(tpb::CONSISTENCY),
            Self::RepeatableRead => base.flag(tpb::CONCURRENCY),
            Self::ReadUncommitted => base.flag(tpb::READ_COMMITTED).flag(tpb::REC_VERSION),
            Self::ReadCommitted => base
                .flag(tpb::READ_COMMITTED)
                .flag(tpb::NO_REC_VERSION),
        }
    }

    /// Get the isolation level name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

/// Lifecycle state of a transaction context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Not started on the server yet.
    None,
    /// Started and usable.
    Started,
    /// First phase of a two-phase commit done.
    Prepared,
    /// Committed.
    Committed,
    /// Rolled back.
    RolledBack,
}

impl TransactionState {
    /// Whether the transaction has finished and can no longer be used.
    #[must_use]
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

/// Server-side transaction owned by a session.
#[derive(Debug)]
pub(crate) struct TransactionContext {
    pub(crate) id: u64,
    pub(crate) handle: i32,
    pub(crate) state: TransactionState,
    pub(crate) isolation: IsolationLevel,
    /// Started by a command on the caller's behalf.
    pub(crate) implicit: bool,
    /// Command that started an implicit transaction.
    pub(crate) owner: Option<u64>,
}

impl TransactionContext {
    /// Start a transaction on the server.
    pub(crate) async fn begin(
        attachment: &mut Attachment,
        id: u64,
        isolation: IsolationLevel,
        implicit: bool,
    ) -> Result<Self> {
        let tpb = isolation.tpb();
        let response = attachment
            .call(request::start_transaction(attachment.handle(), tpb.as_bytes()))
            .await?;
        tracing::debug!(
            handle = response.handle,
            isolation = isolation.name(),
            implicit,
            "transaction started"
        );
        Ok(Self {
            id,
            handle: response.handle,
            state: TransactionState::Started,
            isolation,
            implicit,
            owner: None,
        })
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.state.is_updated() {
            Err(Error::Transaction(TRANSACTION_COMPLETED.into()))
        } else {
            Ok(())
        }
    }

    pub(crate) async fn commit(&mut self, attachment: &mut Attachment) -> Result<()> {
        self.ensure_usable()?;
        attachment
            .call(request::handle_only(Operation::Commit, self.handle))
            .await?;
        self.state = TransactionState::Committed;
        tracing::debug!(handle = self.handle, "transaction committed");
        Ok(())
    }

    pub(crate) async fn rollback(&mut self, attachment: &mut Attachment) -> Result<()> {
        self.ensure_usable()?;
        let result = attachment
            .call(request::handle_only(Operation::Rollback, self.handle))
            .await;
        // The handle is gone either way.
        self.state = TransactionState::RolledBack;
        result?;
        tracing::debug!(handle = self.handle, "transaction rolled back");
        Ok(())
    }

    pub(crate) async fn commit_retaining(&mut self, attachment: &mut Attachment) -> Result<()> {
        self.ensure_usable()?;
        attachment
            .call(request::handle_only(Operation::CommitRetaining, self.handle))
            .await?;
        self.state = TransactionState::Started;
        tracing::debug!(handle = self.handle, "transaction committed, context retained");
        Ok(())
    }

    pub(crate) async fn rollback_retaining(&mut self, attachment: &mut Attachment) -> Result<()> {
        self.ensure_usable()?;
        attachment
            .call(request::handle_only(Operation::RollbackRetaining, self.handle))
            .await?;
        self.state = TransactionState::Started;
        tracing::debug!(handle = self.handle, "transaction rolled back, context retained");
        Ok(())
    }

    pub(crate) async fn prepare(
        &mut self,
        attachment: &mut Attachment,
        message: Option<&[u8]>,
    ) -> Result<()> {
        self.ensure_usable()?;
        attachment
            .call(request::prepare_transaction(self.handle, message))
            .await?;
        self.state = TransactionState::Prepared;
        tracing::debug!(handle = self.handle, "transaction prepared");
        Ok(())
    }
}

/// A savepoint within a transaction.
///
/// The savepoint name is validated when created to prevent SQL injection.
#[derive(Debug, Clone)]
pub struct SavePoint {
    pub(crate) name: String,
}

impl SavePoint {
    pub(crate) fn new(name: String) -> Self {
        Self { name }
    }

    /// Get the savepoint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl AsRef<str> for SavePoint {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// An explicit transaction started with [`Session::begin_transaction`].
///
/// The handle holds no connection state of its own; every operation
/// takes the session it was started on. Once committed or rolled back,
/// further operations fail with "This transaction has completed; it is
/// no longer usable."
///
/// # Example
///
/// ```rust,ignore
/// let tx = session.begin_transaction().await?;
/// let mut cmd = Command::new("INSERT INTO orders (customer_id) VALUES (@id)")
///     .with_transaction(&tx)
///     .bind("@id", 42);
/// cmd.execute_non_query(&mut session).await?;
///
/// let sp = tx.save(&mut session, "before_items").await?;
/// // ...
/// tx.rollback_to(&mut session, &sp).await?;
/// tx.commit(&mut session).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: u64,
    isolation: IsolationLevel,
}

impl Transaction {
    pub(crate) fn new(id: u64, isolation: IsolationLevel) -> Self {
        Self { id, isolation }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Get the isolation level of this transaction.
    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation
    }

    /// Whether the transaction is still the session's active transaction.
    #[must_use]
    pub fn is_active(&self, session: &Session) -> bool {
        session
            .context()
            .is_some_and(|ctx| ctx.id == self.id && !ctx.state.is_updated())
    }

    /// Commit the transaction.
    pub async fn commit(&self, session: &mut Session) -> Result<()> {
        let (attachment, ctx) = session.explicit_context(self.id)?;
        ctx.commit(attachment).await?;
        session.clear_transaction();
        Ok(())
    }

    /// Roll back the transaction.
    pub async fn rollback(&self, session: &mut Session) -> Result<()> {
        let (attachment, ctx) = session.explicit_context(self.id)?;
        let result = ctx.rollback(attachment).await;
        session.clear_transaction();
        result
    }

    /// Commit the work done so far and keep the transaction open.
    pub async fn commit_retaining(&self, session: &mut Session) -> Result<()> {
        let (attachment, ctx) = session.explicit_context(self.id)?;
        ctx.commit_retaining(attachment).await
    }

    /// Undo the work done so far and keep the transaction open.
    pub async fn rollback_retaining(&self, session: &mut Session) -> Result<()> {
        let (attachment, ctx) = session.explicit_context(self.id)?;
        ctx.rollback_retaining(attachment).await
    }

    /// First phase of a two-phase commit.
    pub async fn prepare(&self, session: &mut Session) -> Result<()> {
        let (attachment, ctx) = session.explicit_context(self.id)?;
        ctx.prepare(attachment, None).await
    }

    /// First phase of a two-phase commit, recording `data` with the
    /// prepared transaction for recovery tools.
    pub async fn prepare_with(&self, session: &mut Session, data: &[u8]) -> Result<()> {
        let (attachment, ctx) = session.explicit_context(self.id)?;
        ctx.prepare(attachment, Some(data)).await
    }

    /// Create a savepoint.
    ///
    /// Use it with [`Transaction::rollback_to`] to partially undo work.
    pub async fn save(&self, session: &mut Session, name: &str) -> Result<SavePoint> {
        validate_identifier(name)?;
        tracing::debug!(name = name, "creating savepoint");
        // name is validated above
        self.run(session, &format!("SAVEPOINT {name}")).await?;
        Ok(SavePoint::new(name.to_string()))
    }

    /// Roll back to a savepoint, keeping the transaction active.
    ///
    /// The savepoint remains valid and can be rolled back to again.
    pub async fn rollback_to(&self, session: &mut Session, savepoint: impl AsRef<str>) -> Result<()> {
        let name = savepoint.as_ref();
        validate_identifier(name)?;
        tracing::debug!(name = name, "rolling back to savepoint");
        self.run(session, &format!("ROLLBACK WORK TO SAVEPOINT {name}"))
            .await
    }

    /// Release a savepoint.
    pub async fn release(&self, session: &mut Session, savepoint: impl AsRef<str>) -> Result<()> {
        let name = savepoint.as_ref();
        validate_identifier(name)?;
        tracing::debug!(name = name, "releasing savepoint");
        self.run(session, &format!("RELEASE SAVEPOINT {name}"))
            .await
    }

    /// Run `sql` through a throwaway statement bound to this transaction.
    async fn run(&self, session: &mut Session, sql: &str) -> Result<()> {
        let (attachment, ctx) = session.explicit_context(self.id)?;
        let handle = ctx.handle;
        let mut statement = Statement::allocate(attachment).await?;
        let result = async {
            statement.prepare(attachment, sql, handle).await?;
            statement.execute(attachment, handle, &[]).await
        }
        .await;
        let dropped = statement.drop_statement(attachment).await;
        result?;
        dropped
    }
}

static IDENTIFIER_RE: Lazy<std::result::Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_$]{0,62}$"));

/// Validate a SQL identifier to prevent injection.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    let re = IDENTIFIER_RE
        .as_ref()
        .map_err(|e| Error::Config(e.to_string()))?;

    if name.is_empty() {
        return Err(Error::InvalidIdentifier(
            "identifier cannot be empty".into(),
        ));
    }

    if !re.is_match(name) {
        return Err(Error::InvalidIdentifier(format!(
            "invalid identifier '{name}': must start with letter/underscore, \
             contain only alphanumerics/_/$, and be 1-63 characters"
        )));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_tpb() {
        assert_eq!(
            IsolationLevel::ReadCommitted.tpb().as_bytes(),
            &[tpb::VERSION3, tpb::WRITE, tpb::WAIT, tpb::READ_COMMITTED, tpb::NO_REC_VERSION]
        );
        assert_eq!(
            IsolationLevel::ReadUncommitted.tpb().as_bytes(),
            &[tpb::VERSION3, tpb::WRITE, tpb::WAIT, tpb::READ_COMMITTED, tpb::REC_VERSION]
        );
        assert_eq!(
            IsolationLevel::RepeatableRead.tpb().as_bytes(),
            &[tpb::VERSION3, tpb::WRITE, tpb::WAIT, tpb::CONCURRENCY]
        );
        assert_eq!(
            IsolationLevel::Serializable.tpb().as_bytes(),
            &[tpb::VERSION3, tpb::WRITE, tpb::WAIT, tpb::CONSISTENCY]
        );
    }

    #[test]
    fn test_isolation_level_name() {
        assert_eq!(IsolationLevel::ReadCommitted.name(), "READ COMMITTED");
        assert_eq!(IsolationLevel::Serializable.name(), "SERIALIZABLE");
    }

    #[test]
    fn test_default_isolation_level() {
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_updated_states() {
        assert!(!TransactionState::Started.is_updated());
        assert!(!TransactionState::Prepared.is_updated());
        assert!(TransactionState::Committed.is_updated());
        assert!(TransactionState::RolledBack.is_updated());
    }

    #[test]
    fn test_savepoint_name() {
        let sp = SavePoint::new("my_savepoint".to_string());
        assert_eq!(sp.name(), "my_savepoint");
        assert_eq!(sp.as_ref(), "my_savepoint");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("before_items").is_ok());
        assert!(validate_identifier("SP$1").is_ok());
        assert!(matches!(
            validate_identifier(""),
            Err(Error::InvalidIdentifier(_))
        ));
        assert!(matches!(
            validate_identifier("x; DROP TABLE T"),
            Err(Error::InvalidIdentifier(_))
        ));
        assert!(validate_identifier("1abc").is_err());
    }
}
