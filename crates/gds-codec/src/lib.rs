//! # gds-codec
//!
//! Async framing layer for GDS message handling.
//!
//! This crate turns a raw byte stream into decoded server messages. GDS
//! messages carry no length header, so the codec decodes speculatively
//! and waits for more input whenever a message is incomplete.
//!
//! ## Features
//!
//! - Message reassembly across TCP segment boundaries
//! - Row-layout aware decoding of fetch responses
//! - Keep-alive (`op_dummy`) filtering
//! - Integration with tokio-util's codec framework
//!
//! ## Architecture
//!
//! The codec layer sits between raw TCP streams and the higher-level client:
//!
//! ```text
//! TCP Stream → GdsCodec (message framing) → Connection → Client
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod error;
pub mod framed;
pub mod message_codec;

pub use connection::Connection;
pub use error::CodecError;
pub use framed::MessageStream;
pub use message_codec::{DEFAULT_MAX_MESSAGE_SIZE, GdsCodec};
