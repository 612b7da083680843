//! # gds-protocol
//!
//! Pure implementation of the Firebird "GDS" remote protocol (version 10).
//!
//! This crate provides XDR primitives, request encoding, server message
//! decoding, info buffer parsing, BLR message descriptions, blob segment
//! framing, and status vector interpretation.
//!
//! ## Design Philosophy
//!
//! This crate is intentionally IO-agnostic. It contains no networking logic and
//! makes no assumptions about the async runtime. Higher-level crates build upon
//! this foundation to provide async I/O capabilities.
//!
//! ## Example
//!
//! ```rust
//! use gds_protocol::{ColumnDescriptor, build_message_blr, types::sql_type};
//!
//! let columns = [ColumnDescriptor::new(sql_type::LONG, 4)];
//! let blr = build_message_blr(&columns).unwrap();
//! assert_eq!(blr[0], gds_protocol::isc::blr::VERSION5);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod blob;
pub mod blr;
pub mod descriptor;
pub mod error;
pub mod info;
pub mod isc;
pub mod message;
pub mod op;
pub mod params;
pub mod request;
pub mod row;
pub mod status;
pub mod types;
pub mod vax;
pub mod xdr;

pub use blr::build_message_blr;
pub use descriptor::{ColumnDescriptor, DescribeProgress, DescriptorSet};
pub use error::ProtocolError;
pub use info::{InfoValue, RecordCounts};
pub use message::{GenericResponse, ServerMessage, decode_message};
pub use op::{FreeOption, Operation};
pub use params::{DatabaseParameterBuffer, TransactionParameterBuffer};
pub use row::RawRow;
pub use status::{ServerError, Severity, StatusVector};
pub use types::{ColumnKind, StatementType};
