//! Blob segment framing.
//!
//! Blob contents travel as segments: a two-byte little-endian length
//! followed by that many bytes. `op_get_segment` answers and
//! `op_batch_segments` requests both carry runs of such segments.

use crate::error::ProtocolError;

/// `op_get_segment` answer handle: the buffer holds whole segments.
pub const SEGMENT_COMPLETE: i32 = 0;

/// `op_get_segment` answer handle: the last segment continues.
pub const SEGMENT_INCOMPLETE: i32 = 1;

/// `op_get_segment` answer handle: the blob has no more data.
pub const SEGMENT_EOF: i32 = 2;

/// Largest segment (and segment buffer) the protocol accepts.
pub const MAX_SEGMENT_SIZE: usize = i16::MAX as usize;

/// Append the contents of the segments in `data` to `out`.
pub fn join_segments(mut data: &[u8], out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    while !data.is_empty() {
        let [lo, hi, rest @ ..] = data else {
            return Err(ProtocolError::TruncatedSegment);
        };
        let len = usize::from(u16::from_le_bytes([*lo, *hi]));
        let Some(segment) = rest.get(..len) else {
            return Err(ProtocolError::TruncatedSegment);
        };
        out.extend_from_slice(segment);
        data = &rest[len..];
    }
    Ok(())
}

/// Frame `data` as segments of at most `segment_size` bytes.
#[must_use]
pub fn put_segments(data: &[u8], segment_size: usize) -> Vec<u8> {
    let size = segment_size.clamp(1, MAX_SEGMENT_SIZE);
    let mut out = Vec::with_capacity(data.len() + 2 * data.len().div_ceil(size));
    for chunk in data.chunks(size) {
        // chunk.len() <= MAX_SEGMENT_SIZE
        out.extend_from_slice(&(chunk.len() as u16).to_le_bytes());
        out.extend_from_slice(chunk);
    }
    out
}
