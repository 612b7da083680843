//! GDS message codec implementation.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use gds_protocol::{ColumnDescriptor, ProtocolError, ServerMessage, decode_message};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;

/// Default upper bound on a single buffered server message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// GDS message codec for tokio-util framing.
///
/// GDS has no outer framing: a message ends where its XDR content ends. The
/// decoder therefore parses from the start of the buffer on every attempt
/// and only consumes input once a whole message was read. Row-carrying
/// messages need the layout of the rows, set with [`GdsCodec::set_row_layout`].
#[derive(Debug, Clone)]
pub struct GdsCodec {
    row_layout: Option<Arc<[ColumnDescriptor]>>,
    max_message_size: usize,
}

impl GdsCodec {
    /// Create a codec with no row layout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            row_layout: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Limit the bytes buffered for a single message.
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the layout used to decode fetch and SQL responses.
    pub fn set_row_layout(&mut self, layout: Option<Arc<[ColumnDescriptor]>>) {
        self.row_layout = layout;
    }

    /// Current row layout.
    #[must_use]
    pub fn row_layout(&self) -> Option<&Arc<[ColumnDescriptor]>> {
        self.row_layout.as_ref()
    }
}

impl Default for GdsCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for GdsCodec {
    type Item = ServerMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let mut cursor = &src[..];
        let layout = self.row_layout.as_deref();
        match decode_message(&mut cursor, layout) {
            Ok(message) => {
                let consumed = src.len() - cursor.remaining();
                src.advance(consumed);
                tracing::trace!(
                    message = message.name(),
                    length = consumed,
                    "decoded GDS message"
                );
                Ok(Some(message))
            }
            Err(ProtocolError::UnexpectedEof) => {
                if src.len() > self.max_message_size {
                    return Err(CodecError::MessageTooLarge {
                        size: src.len(),
                        max: self.max_message_size,
                    });
                }
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Encoder<Bytes> for GdsCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        tracing::trace!(length = item.len(), "encoded GDS request");
        Ok(())
    }
}
