//! # firebird-client
//!
//! Async Firebird client over the GDS remote protocol.
//!
//! This is the primary public API surface of the workspace. A [`Session`]
//! owns one attachment; [`Command`]s run SQL against it, optionally inside
//! an explicit [`Transaction`], and [`DataReader`]s iterate the rows.
//!
//! ## Features
//!
//! - **Named parameters**: `@name` placeholders rewritten to positional markers
//! - **Batches**: several statements separated by a configurable terminator
//! - **Implicit transactions**: commands without a transaction get one that
//!   is committed on success and rolled back on failure
//! - **Transactions**: isolation levels, retaining commit/rollback,
//!   two-phase prepare and savepoints
//! - **Stored procedures**: call text generated from the parameters, output
//!   parameters captured after execution
//! - **Blobs**: blob columns read as text or bytes, string and byte
//!   parameters stored into new blobs
//!
//! ## Example
//!
//! ```rust,ignore
//! use firebird_client::{Command, CommandBehavior, Config, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_connection_string(
//!         "DataSource=localhost;Database=/data/app.fdb;User=SYSDBA;Password=masterkey;Charset=UTF8",
//!     )?;
//!     let mut session = Session::connect(config).await?;
//!
//!     let mut query = Command::new("SELECT NAME FROM USERS WHERE ID = @id").bind("@id", 1);
//!     let mut reader = query.execute_reader(&mut session, CommandBehavior::default()).await?;
//!     while reader.read().await? {
//!         println!("User: {}", reader.get_string(0)?);
//!     }
//!     reader.close().await?;
//!
//!     let tx = session.begin_transaction().await?;
//!     let mut insert = Command::new("INSERT INTO USERS (NAME) VALUES (@name)")
//!         .with_transaction(&tx)
//!         .bind("@name", "Alice");
//!     insert.execute_non_query(&mut session).await?;
//!     tx.commit(&mut session).await?;
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod attachment;
pub mod batch;
pub mod blob;
pub mod command;
pub mod config;
pub mod error;
pub mod info;
pub mod parameter;
pub mod reader;
pub mod rewrite;
pub mod session;
pub mod statement;
pub mod transaction;

pub use attachment::Attachment;
pub use blob::Blob;
pub use command::{Command, CommandType};
pub use config::Config;
pub use error::{Error, Result};
pub use info::DatabaseInfo;
pub use parameter::{Parameter, ParameterDirection};
pub use reader::{CommandBehavior, DataReader};
pub use session::Session;
pub use statement::{Statement, StatementState};
pub use transaction::{IsolationLevel, SavePoint, Transaction, TransactionState};

// Re-export commonly used types
pub use firebird_types::{Charset, FromSql, SqlValue, ToSql};
pub use gds_protocol::{ColumnDescriptor, StatementType};
