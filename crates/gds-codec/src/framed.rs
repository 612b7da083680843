//! Framed message stream for async I/O.
//!
//! `MessageStream<T>` yields decoded server messages and accepts encoded
//! requests; it is the transport half of [`crate::Connection`].

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::Sink;
use gds_protocol::{ColumnDescriptor, ServerMessage};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use crate::error::CodecError;
use crate::message_codec::GdsCodec;

pin_project! {
    /// A framed GDS message stream over an async I/O transport.
    ///
    /// This wraps a tokio-util `Framed` codec and provides a higher-level
    /// interface for sending requests and receiving server messages.
    pub struct MessageStream<T> {
        #[pin]
        inner: Framed<T, GdsCodec>,
    }
}

impl<T> MessageStream<T>
where
    T: AsyncRead + AsyncWrite,
{
    /// Create a new message stream over the given transport.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Framed::new(transport, GdsCodec::new()),
        }
    }

    /// Create a new message stream with a custom codec.
    pub fn with_codec(transport: T, codec: GdsCodec) -> Self {
        Self {
            inner: Framed::new(transport, codec),
        }
    }

    /// Get a reference to the underlying transport.
    pub fn get_ref(&self) -> &T {
        self.inner.get_ref()
    }

    /// Get a mutable reference to the underlying transport.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// Get a reference to the codec.
    pub fn codec(&self) -> &GdsCodec {
        self.inner.codec()
    }

    /// Set the layout of rows carried by upcoming fetch responses.
    pub fn set_row_layout(&mut self, layout: Option<Arc<[ColumnDescriptor]>>) {
        self.inner.codec_mut().set_row_layout(layout);
    }

    /// Consume the stream and return the underlying transport.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// Get a reference to the read buffer.
    pub fn read_buffer(&self) -> &BytesMut {
        self.inner.read_buffer()
    }
}

impl<T> Stream for MessageStream<T>
where
    T: AsyncRead + Unpin,
{
    type Item = Result<ServerMessage, CodecError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

impl<T> Sink<Bytes> for MessageStream<T>
where
    T: AsyncWrite + Unpin,
{
    type Error = CodecError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Bytes) -> Result<(), Self::Error> {
        self.project().inner.start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}

impl<T> std::fmt::Debug for MessageStream<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("transport", self.inner.get_ref())
            .finish()
    }
}
