//! Big-endian write primitives.
//!
//! The read side lives in [`ByteCursor`](super::cursor::ByteCursor); writes go
//! to an in-memory buffer so one root item can be assembled before it is
//! committed to the output.

use crate::error::EncodeError;
use crate::limits::MAX_STRING_LEN;

/// Writer for encoding binary data.
#[derive(Debug, Clone, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Creates a new writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates a new writer with capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Returns a reference to the written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Discards the written bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    #[inline]
    pub fn write_u8(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Writes raw bytes.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Writes a count as a non-negative `i32`, failing if it does not fit.
    pub fn write_length(&mut self, len: usize, max: usize, field: &'static str) -> Result<(), EncodeError> {
        if len > max || len > i32::MAX as usize {
            return Err(EncodeError::LengthExceedsLimit { field, len, max });
        }
        self.write_i32(len as i32);
        Ok(())
    }

    /// Writes a count as a `u16`, failing if it does not fit.
    pub fn write_short_length(&mut self, len: usize, field: &'static str) -> Result<(), EncodeError> {
        let short = u16::try_from(len).map_err(|_| EncodeError::LengthExceedsLimit {
            field,
            len,
            max: u16::MAX as usize,
        })?;
        self.write_u16(short);
        Ok(())
    }

    /// Writes an `i32`-length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str) {
        self.write_i32(s.len() as i32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Writes a string after checking it against [`MAX_STRING_LEN`].
    pub fn write_checked_string(&mut self, s: &str, field: &'static str) -> Result<(), EncodeError> {
        if s.len() > MAX_STRING_LEN {
            return Err(EncodeError::LengthExceedsLimit {
                field,
                len: s.len(),
                max: MAX_STRING_LEN,
            });
        }
        self.write_string(s);
        Ok(())
    }

    /// Writes an `i32`-length-prefixed byte block; `None` is written as length -1.
    pub fn write_byte_block(&mut self, bytes: Option<&[u8]>) {
        match bytes {
            Some(bytes) => {
                self.write_i32(bytes.len() as i32);
                self.buf.extend_from_slice(bytes);
            }
            None => self.write_i32(-1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mut w = Writer::new();
        w.write_u16(0x0102);
        w.write_i32(-2);
        w.write_string("ab");
        w.write_byte_block(None);
        assert_eq!(
            w.as_bytes(),
            &[0x01, 0x02, 0xFF, 0xFF, 0xFF, 0xFE, 0, 0, 0, 2, b'a', b'b', 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_length_checks() {
        let mut w = Writer::new();
        assert!(w.write_short_length(70_000, "ports").is_err());
        assert!(w.write_length(11, 10, "nodes").is_err());
        assert!(w.is_empty());

        w.write_short_length(3, "ports").unwrap();
        w.write_length(10, 10, "nodes").unwrap();
        assert_eq!(w.len(), 6);

        w.clear();
        assert!(w.is_empty());
    }
}
