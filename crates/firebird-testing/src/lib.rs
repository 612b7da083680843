//! # firebird-testing
//!
//! Test infrastructure for Firebird client development.
//!
//! This crate provides a scripted GDS server that answers the client's
//! requests over a real TCP socket, plus helpers for building column
//! descriptors in tests.
//!
//! ## Features
//!
//! - Mock GDS server for unit and integration tests (no database required)
//! - Scripted statements with descriptors, rows and record counts
//! - An event log of every request the server handled
//! - Column descriptor fixtures
//!
//! ## Mock Server Example
//!
//! ```rust,ignore
//! use firebird_testing::fixtures::{int_column, varchar_column};
//! use firebird_testing::mock_server::{MockGdsServer, MockStatement};
//! use firebird_types::SqlValue;
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = MockGdsServer::builder()
//!         .with_statement(
//!             "SELECT ID, NAME FROM USERS",
//!             MockStatement::select(
//!                 vec![int_column("ID"), varchar_column("NAME", 50)],
//!                 vec![vec![SqlValue::Int(1), SqlValue::from("Alice")]],
//!             ),
//!         )
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let connection_string = server.connection_string("test.fdb");
//!     // ...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_server;

pub use mock_server::{
    MockError, MockEvent, MockGdsServer, MockServerBuilder, MockServerConfig, MockServerError,
    MockStatement,
};
