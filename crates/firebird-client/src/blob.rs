//! Blob transfer.
//!
//! Blob columns hold an 8-byte id; the contents live server-side and are
//! moved in segments through a blob handle opened inside a transaction.
//! [`Statement`](crate::Statement) uses [`read_blob`] to turn fetched ids
//! into values and [`write_blob`] to store string or byte parameters bound
//! to blob columns.

use bytes::Bytes;
use firebird_types::{Charset, SqlValue, TypeError};
use gds_protocol::blob::{MAX_SEGMENT_SIZE, SEGMENT_EOF, join_segments, put_segments};
use gds_protocol::request;
use gds_protocol::{ColumnDescriptor, Operation};

use crate::attachment::Attachment;
use crate::error::Result;

/// Blob subtype holding text in a character set.
pub const SUB_TYPE_TEXT: i32 = 1;

/// An open server-side blob.
#[derive(Debug)]
pub struct Blob {
    handle: i32,
    id: i64,
    segment_size: usize,
}

impl Blob {
    /// Create a new blob for writing.
    pub async fn create(attachment: &mut Attachment, transaction: i32) -> Result<Self> {
        let response = attachment
            .call(request::open_blob(Operation::CreateBlob, transaction, 0))
            .await?;
        tracing::trace!(handle = response.handle, id = response.blob_id, "created blob");
        Ok(Self {
            handle: response.handle,
            id: response.blob_id,
            segment_size: attachment.segment_size(),
        })
    }

    /// Open an existing blob for reading.
    pub async fn open(attachment: &mut Attachment, transaction: i32, id: i64) -> Result<Self> {
        let response = attachment
            .call(request::open_blob(Operation::OpenBlob, transaction, id))
            .await?;
        tracing::trace!(handle = response.handle, id, "opened blob");
        Ok(Self {
            handle: response.handle,
            id,
            segment_size: attachment.segment_size(),
        })
    }

    /// Blob id, valid once the blob is closed.
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Read the remaining contents.
    pub async fn read_to_end(&mut self, attachment: &mut Attachment) -> Result<Vec<u8>> {
        let requested = i32::try_from((self.segment_size + 2).min(MAX_SEGMENT_SIZE))
            .unwrap_or(i32::MAX);
        let mut data = Vec::new();
        loop {
            let response = attachment
                .call(request::get_segment(self.handle, requested))
                .await?;
            join_segments(&response.data, &mut data)?;
            if response.handle == SEGMENT_EOF {
                return Ok(data);
            }
        }
    }

    /// Write `data` in segments of the attachment's packet size.
    pub async fn write_all(&mut self, attachment: &mut Attachment, data: &[u8]) -> Result<()> {
        // Each batch stays within one segment buffer.
        for chunk in data.chunks(self.segment_size.max(1)) {
            let framed = put_segments(chunk, self.segment_size);
            attachment
                .call(request::batch_segments(self.handle, &framed))
                .await?;
        }
        Ok(())
    }

    /// Close the blob, keeping what was written.
    pub async fn close(self, attachment: &mut Attachment) -> Result<()> {
        attachment
            .call(request::handle_only(Operation::CloseBlob, self.handle))
            .await?;
        Ok(())
    }

    /// Discard the blob.
    pub async fn cancel(self, attachment: &mut Attachment) -> Result<()> {
        attachment
            .call(request::handle_only(Operation::CancelBlob, self.handle))
            .await?;
        Ok(())
    }
}

/// Read the whole blob `id`.
///
/// The blob handle is cancelled when reading fails.
pub async fn read_blob(attachment: &mut Attachment, transaction: i32, id: i64) -> Result<Vec<u8>> {
    let mut blob = Blob::open(attachment, transaction, id).await?;
    match blob.read_to_end(attachment).await {
        Ok(data) => {
            blob.close(attachment).await?;
            tracing::debug!(id, len = data.len(), "read blob");
            Ok(data)
        }
        Err(e) => {
            if let Err(cancel) = blob.cancel(attachment).await {
                tracing::debug!(error = %cancel, "blob cancel failed");
            }
            Err(e)
        }
    }
}

/// Store `data` in a new blob and return its id.
///
/// The blob handle is cancelled when writing fails.
pub async fn write_blob(attachment: &mut Attachment, transaction: i32, data: &[u8]) -> Result<i64> {
    let mut blob = Blob::create(attachment, transaction).await?;
    match blob.write_all(attachment, data).await {
        Ok(()) => {
            let id = blob.id();
            blob.close(attachment).await?;
            tracing::debug!(id, len = data.len(), "wrote blob");
            Ok(id)
        }
        Err(e) => {
            if let Err(cancel) = blob.cancel(attachment).await {
                tracing::debug!(error = %cancel, "blob cancel failed");
            }
            Err(e)
        }
    }
}

/// Value read from a blob column: text for text subtypes, bytes otherwise.
pub(crate) fn blob_value(data: Vec<u8>, column: &ColumnDescriptor, charset: Charset) -> Result<SqlValue> {
    if column.sub_type == SUB_TYPE_TEXT {
        Ok(SqlValue::String(charset.decode(&data)?.into_owned()))
    } else {
        Ok(SqlValue::Binary(Bytes::from(data)))
    }
}

/// Contents to store for a value bound to a blob parameter.
///
/// Returns `None` for values passed through unchanged (NULL and blob ids).
pub(crate) fn blob_contents(
    value: &SqlValue,
    charset: Charset,
) -> std::result::Result<Option<Vec<u8>>, TypeError> {
    match value {
        SqlValue::String(text) => Ok(Some(charset.encode(text)?.into_owned())),
        SqlValue::Binary(bytes) => Ok(Some(bytes.to_vec())),
        SqlValue::Null | SqlValue::BlobId(_) => Ok(None),
        other => Err(TypeError::UnsupportedConversion {
            from: other.type_name().to_string(),
            to: "BLOB",
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use gds_protocol::types::sql_type;

    fn blob_column(sub_type: i32) -> ColumnDescriptor {
        ColumnDescriptor::new(sql_type::BLOB + 1, 8).with_sub_type(sub_type)
    }

    #[test]
    fn test_text_subtype_decodes_with_charset() {
        let value = blob_value("grüße".as_bytes().to_vec(), &blob_column(1), Charset::UTF8).unwrap();
        assert_eq!(value, SqlValue::String("grüße".into()));
    }

    #[test]
    fn test_binary_subtype_keeps_bytes() {
        let value = blob_value(vec![0, 255, 7], &blob_column(0), Charset::UTF8).unwrap();
        assert_eq!(value, SqlValue::Binary(Bytes::from_static(&[0, 255, 7])));
    }

    #[test]
    fn test_contents_of_bound_values() {
        assert_eq!(
            blob_contents(&SqlValue::String("abc".into()), Charset::UTF8).unwrap(),
            Some(b"abc".to_vec())
        );
        assert_eq!(blob_contents(&SqlValue::BlobId(4), Charset::UTF8).unwrap(), None);
        assert_eq!(blob_contents(&SqlValue::Null, Charset::UTF8).unwrap(), None);
        assert!(blob_contents(&SqlValue::Int(4), Charset::UTF8).is_err());
    }
}
