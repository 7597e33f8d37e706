//! Primitive wire types of the AMQP binary format.
//!
//! The decoder is a [`Cursor`] over an immutable byte region: every read
//! advances it by exactly the type's wire width or fails with
//! [`CodecError::TruncatedInput`] while leaving the position untouched, so
//! the same offset can be retried once more bytes arrive. The codec itself
//! holds no buffered state between calls.
//!
//! Encoding is the byte-exact inverse, writing into a [`BytesMut`]. All
//! multi-byte integers use network byte order.

use bytes::{BufMut, BytesMut};

pub mod error;
mod value;

#[cfg(test)]
mod tests;

pub use error::CodecError;
pub use value::{FieldArray, FieldTable, FieldValue};

/// Maximum byte length of a short string (length fits one byte).
pub const SHORT_STR_MAX: usize = u8::MAX as usize;

/// Read-only cursor over a byte region.
///
/// Reads never look past `pos`; a failed read leaves `pos` where it was.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor positioned at the start of `buf`.
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self { Self { buf, pos: 0 } }

    /// Current offset from the start of the region.
    #[must_use]
    pub const fn position(&self) -> usize { self.pos }

    /// Bytes left between the position and the end of the region.
    #[must_use]
    pub const fn remaining(&self) -> usize { self.buf.len() - self.pos }

    /// Whether every byte of the region has been consumed.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool { self.pos == self.buf.len() }

    /// Take the next `n` bytes, advancing the cursor.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] without advancing when fewer
    /// than `n` bytes remain.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::TruncatedInput {
                at: self.pos,
                need: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Decode an unsigned 8-bit integer.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when no byte remains.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> { Ok(self.take(1)?[0]) }

    /// Decode a network-order unsigned 16-bit integer.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when fewer than two bytes remain.
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Decode a network-order unsigned 32-bit integer.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when fewer than four bytes remain.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Decode a network-order unsigned 64-bit integer.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when fewer than eight bytes remain.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Decode a signed 8-bit integer.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when no byte remains.
    #[expect(clippy::cast_possible_wrap, reason = "bit-exact reinterpretation")]
    pub fn read_i8(&mut self) -> Result<i8, CodecError> { Ok(self.read_u8()? as i8) }

    /// Decode a network-order signed 16-bit integer.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when fewer than two bytes remain.
    #[expect(clippy::cast_possible_wrap, reason = "bit-exact reinterpretation")]
    pub fn read_i16(&mut self) -> Result<i16, CodecError> { Ok(self.read_u16()? as i16) }

    /// Decode a network-order signed 32-bit integer.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when fewer than four bytes remain.
    #[expect(clippy::cast_possible_wrap, reason = "bit-exact reinterpretation")]
    pub fn read_i32(&mut self) -> Result<i32, CodecError> { Ok(self.read_u32()? as i32) }

    /// Decode a network-order signed 64-bit integer.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when fewer than eight bytes remain.
    #[expect(clippy::cast_possible_wrap, reason = "bit-exact reinterpretation")]
    pub fn read_i64(&mut self) -> Result<i64, CodecError> { Ok(self.read_u64()? as i64) }

    /// Decode a network-order IEEE 754 single-precision float.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when fewer than four bytes remain.
    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Decode a network-order IEEE 754 double-precision float.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when fewer than eight bytes remain.
    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    /// Decode a short string: one length byte, then that many UTF-8 bytes.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when the region ends early, or
    /// [`CodecError::InvalidUtf8`] when the content is not valid UTF-8.
    pub fn read_short_str(&mut self) -> Result<&'a str, CodecError> {
        let start = self.pos;
        let len = self.read_u8()? as usize;
        match self.take(len) {
            Ok(bytes) => std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8),
            Err(e) => {
                // Undo the length byte so a retry restarts cleanly.
                self.pos = start;
                Err(e)
            }
        }
    }

    /// Decode a long string: a four-byte length, then that many raw bytes.
    ///
    /// Long strings carry arbitrary binary and are returned as a byte slice.
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when the region ends early.
    pub fn read_long_str(&mut self) -> Result<&'a [u8], CodecError> {
        let start = self.pos;
        let len = self.read_u32()? as usize;
        match self.take(len) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                self.pos = start;
                Err(e)
            }
        }
    }

    /// Decode a POSIX timestamp (seconds, 64-bit).
    ///
    /// # Errors
    /// Returns [`CodecError::TruncatedInput`] when fewer than eight bytes remain.
    pub fn read_timestamp(&mut self) -> Result<u64, CodecError> { self.read_u64() }
}

/// Encode an unsigned 8-bit integer.
pub fn write_u8(dst: &mut BytesMut, value: u8) { dst.put_u8(value); }

/// Encode a network-order unsigned 16-bit integer.
pub fn write_u16(dst: &mut BytesMut, value: u16) { dst.put_u16(value); }

/// Encode a network-order unsigned 32-bit integer.
pub fn write_u32(dst: &mut BytesMut, value: u32) { dst.put_u32(value); }

/// Encode a network-order unsigned 64-bit integer.
pub fn write_u64(dst: &mut BytesMut, value: u64) { dst.put_u64(value); }

/// Encode a signed 8-bit integer.
pub fn write_i8(dst: &mut BytesMut, value: i8) { dst.put_i8(value); }

/// Encode a network-order signed 16-bit integer.
pub fn write_i16(dst: &mut BytesMut, value: i16) { dst.put_i16(value); }

/// Encode a network-order signed 32-bit integer.
pub fn write_i32(dst: &mut BytesMut, value: i32) { dst.put_i32(value); }

/// Encode a network-order signed 64-bit integer.
pub fn write_i64(dst: &mut BytesMut, value: i64) { dst.put_i64(value); }

/// Encode a network-order single-precision float.
pub fn write_f32(dst: &mut BytesMut, value: f32) { write_u32(dst, value.to_bits()); }

/// Encode a network-order double-precision float.
pub fn write_f64(dst: &mut BytesMut, value: f64) { write_u64(dst, value.to_bits()); }

/// Encode a short string (one length byte plus UTF-8 content).
///
/// # Errors
/// Returns [`CodecError::ValueTooLong`] when `value` exceeds 255 bytes.
pub fn write_short_str(dst: &mut BytesMut, value: &str) -> Result<(), CodecError> {
    if value.len() > SHORT_STR_MAX {
        return Err(CodecError::ValueTooLong {
            len: value.len(),
            max: SHORT_STR_MAX,
        });
    }
    #[expect(clippy::cast_possible_truncation, reason = "length checked above")]
    dst.put_u8(value.len() as u8);
    dst.put_slice(value.as_bytes());
    Ok(())
}

/// Encode a long string (four-byte length plus raw bytes).
///
/// # Errors
/// Returns [`CodecError::ValueTooLong`] when `value` exceeds `u32::MAX` bytes.
pub fn write_long_str(dst: &mut BytesMut, value: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(value.len()).map_err(|_| CodecError::ValueTooLong {
        len: value.len(),
        max: u32::MAX as usize,
    })?;
    dst.put_u32(len);
    dst.put_slice(value);
    Ok(())
}

/// Encode a POSIX timestamp.
pub fn write_timestamp(dst: &mut BytesMut, value: u64) { write_u64(dst, value); }
