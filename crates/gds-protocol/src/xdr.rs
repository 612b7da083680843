//! XDR encoding primitives.
//!
//! The GDS protocol carries every request and response as a stream of XDR
//! items: big-endian 32-bit integers, 64-bit longs, IEEE floats and opaque
//! byte runs padded to a four byte boundary.

use bytes::{Buf, BufMut, Bytes};

use crate::error::ProtocolError;

/// Zero bytes used for XDR padding.
const PAD: [u8; 4] = [0; 4];

/// Space bytes used to pad fixed-width CHAR values.
const SPACES: [u8; 32] = [b' '; 32];

/// Number of padding bytes that follow an opaque run of `len` bytes.
#[must_use]
pub const fn pad_len(len: usize) -> usize {
    (4 - (len & 3)) & 3
}

/// Write a 32-bit big-endian integer.
pub fn write_i32(dst: &mut impl BufMut, value: i32) {
    dst.put_i32(value);
}

/// Write a 64-bit big-endian integer.
pub fn write_i64(dst: &mut impl BufMut, value: i64) {
    dst.put_i64(value);
}

/// Write an opaque run followed by its padding (no length prefix).
pub fn write_opaque(dst: &mut impl BufMut, data: &[u8]) {
    dst.put_slice(data);
    dst.put_slice(&PAD[..pad_len(data.len())]);
}

/// Write a length-prefixed buffer: length, bytes, padding.
pub fn write_buffer(dst: &mut impl BufMut, data: &[u8]) {
    dst.put_i32(data.len() as i32);
    write_opaque(dst, data);
}

/// Write a length-prefixed string using its raw bytes.
pub fn write_string(dst: &mut impl BufMut, value: &[u8]) {
    write_buffer(dst, value);
}

/// Write exactly `len` bytes of `data`, filling with spaces, then XDR padding.
///
/// Used for fixed-width CHAR columns where the server expects the declared
/// byte length on the wire.
pub fn write_fixed_text(dst: &mut impl BufMut, data: &[u8], len: usize) {
    let used = data.len().min(len);
    dst.put_slice(&data[..used]);
    let mut fill = len - used;
    while fill > 0 {
        let chunk = fill.min(SPACES.len());
        dst.put_slice(&SPACES[..chunk]);
        fill -= chunk;
    }
    dst.put_slice(&PAD[..pad_len(len)]);
}

/// Read a 32-bit big-endian integer.
pub fn read_i32(src: &mut impl Buf) -> Result<i32, ProtocolError> {
    if src.remaining() < 4 {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(src.get_i32())
}

/// Read a 64-bit big-endian integer.
pub fn read_i64(src: &mut impl Buf) -> Result<i64, ProtocolError> {
    if src.remaining() < 8 {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(src.get_i64())
}

/// Read a 32-bit IEEE float.
pub fn read_f32(src: &mut impl Buf) -> Result<f32, ProtocolError> {
    if src.remaining() < 4 {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(src.get_f32())
}

/// Read a 64-bit IEEE double.
pub fn read_f64(src: &mut impl Buf) -> Result<f64, ProtocolError> {
    if src.remaining() < 8 {
        return Err(ProtocolError::UnexpectedEof);
    }
    Ok(src.get_f64())
}

/// Read `len` opaque bytes and skip their padding.
pub fn read_opaque(src: &mut impl Buf, len: usize) -> Result<Bytes, ProtocolError> {
    let padded = len + pad_len(len);
    if src.remaining() < padded {
        return Err(ProtocolError::UnexpectedEof);
    }
    let data = src.copy_to_bytes(len);
    src.advance(pad_len(len));
    Ok(data)
}

/// Read a length-prefixed buffer.
pub fn read_buffer(src: &mut impl Buf) -> Result<Bytes, ProtocolError> {
    let len = read_i32(src)?;
    if len < 0 {
        return Err(ProtocolError::InvalidLength(len));
    }
    read_opaque(src, len as usize)
}

/// Read a length-prefixed string, replacing invalid UTF-8 sequences.
pub fn read_string(src: &mut impl Buf) -> Result<String, ProtocolError> {
    let data = read_buffer(src)?;
    Ok(String::from_utf8_lossy(&data).into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use proptest::prelude::*;

    #[test]
    fn test_pad_len() {
        assert_eq!(pad_len(0), 0);
        assert_eq!(pad_len(1), 3);
        assert_eq!(pad_len(2), 2);
        assert_eq!(pad_len(3), 1);
        assert_eq!(pad_len(4), 0);
        assert_eq!(pad_len(5), 3);
        assert_eq!(pad_len(6), 2);
        assert_eq!(pad_len(7), 1);
        assert_eq!(pad_len(8), 0);
        assert_eq!(pad_len(9), 3);
        assert_eq!(pad_len(usize::MAX), 1);
    }

    #[test]
    fn test_write_buffer_longer_than_a_word() {
        let mut buf = BytesMut::new();
        write_buffer(&mut buf, b"abcde");
        assert_eq!(&buf[..], &[0, 0, 0, 5, b'a', b'b', b'c', b'd', b'e', 0, 0, 0]);
    }

    #[test]
    fn test_write_buffer_layout() {
        let mut buf = BytesMut::new();
        write_buffer(&mut buf, b"abc");
        assert_eq!(&buf[..], &[0, 0, 0, 3, b'a', b'b', b'c', 0]);
    }

    #[test]
    fn test_write_fixed_text_pads_with_spaces() {
        let mut buf = BytesMut::new();
        write_fixed_text(&mut buf, b"ab", 5);
        assert_eq!(&buf[..], b"ab   \0\0\0");
    }

    #[test]
    fn test_read_buffer_negative_length() {
        let mut src: &[u8] = &[0xFF, 0xFF, 0xFF, 0xFF];
        assert_eq!(read_buffer(&mut src), Err(ProtocolError::InvalidLength(-1)));
    }

    #[test]
    fn test_read_opaque_short_input() {
        let mut src: &[u8] = &[1, 2, 3];
        assert_eq!(read_opaque(&mut src, 3), Err(ProtocolError::UnexpectedEof));
    }

    proptest! {
        #[test]
        fn prop_buffer_is_word_aligned(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut buf = BytesMut::new();
            write_buffer(&mut buf, &data);
            prop_assert_eq!(buf.len() % 4, 0);

            let mut src = buf.freeze();
            let read = read_buffer(&mut src).unwrap();
            prop_assert_eq!(&read[..], &data[..]);
            prop_assert_eq!(src.remaining(), 0);
        }
    }
}
