//! Buffered byte cursor with an incremental content digest.
//!
//! Wraps any [`Read`] source and provides big-endian typed reads with
//! transparent refills. A SHA-256 digest can be armed over a caller-delimited
//! range; bytes leaving the buffer window during a refill are folded into the
//! digest before the window is compacted.

use std::io::{self, Read};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::DecodeError;
use crate::limits::{CURRENT_VERSION, DEFAULT_BUFFER_SIZE, LEGACY_VERSION, MAGIC, MAX_BYTES_LEN, MAX_STRING_LEN};
use crate::model::Version;

/// SHA-256 over one graph's node and block sections.
pub type ContentDigest = [u8; 32];

/// Smallest buffer the cursor works with.
const MIN_BUFFER_SIZE: usize = 16;

#[derive(Debug, Clone)]
struct DigestState {
    hasher: Sha256,
    /// Buffer offset of the first byte not yet folded into `hasher`.
    from: usize,
}

/// Reader over a byte source with typed reads and digest support.
#[derive(Debug)]
pub struct ByteCursor<R> {
    source: R,
    buf: Vec<u8>,
    pos: usize,
    end: usize,
    /// Absolute stream offset of `buf[0]`.
    base: u64,
    digest: Option<DigestState>,
    version: Version,
}

impl<R: Read> ByteCursor<R> {
    /// Creates a cursor with the default buffer size.
    pub fn new(source: R) -> Self {
        Self::with_capacity(source, DEFAULT_BUFFER_SIZE)
    }

    /// Creates a cursor with an initial buffer of `capacity` bytes.
    pub fn with_capacity(source: R, capacity: usize) -> Self {
        Self {
            source,
            buf: vec![0; capacity.max(MIN_BUFFER_SIZE)],
            pos: 0,
            end: 0,
            base: 0,
            digest: None,
            version: LEGACY_VERSION,
        }
    }

    /// Returns the absolute offset of the next byte to be consumed.
    pub fn position(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Format version of the stream being read.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Overrides the stream version (used for headerless legacy streams).
    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    // =========================================================================
    // Buffering
    // =========================================================================

    fn compact(&mut self) {
        if let Some(digest) = &mut self.digest {
            digest.hasher.update(&self.buf[digest.from..self.pos]);
            digest.from = 0;
        }
        self.buf.copy_within(self.pos..self.end, 0);
        self.base += self.pos as u64;
        self.end -= self.pos;
        self.pos = 0;
    }

    /// Makes `n` bytes available; returns false if the source ends first.
    fn fill(&mut self, n: usize) -> io::Result<bool> {
        if self.end - self.pos >= n {
            return Ok(true);
        }
        self.compact();
        if self.buf.len() < n {
            let grown = n.max(self.buf.len() * 2);
            self.buf.resize(grown, 0);
        }
        while self.end < n {
            match self.source.read(&mut self.buf[self.end..]) {
                Ok(0) => return Ok(false),
                Ok(read) => self.end += read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    fn require(&mut self, n: usize, context: &'static str) -> Result<(), DecodeError> {
        if self.fill(n).map_err(|e| DecodeError::from_io(e, context))? {
            Ok(())
        } else {
            Err(DecodeError::TruncatedInput { context })
        }
    }

    #[inline]
    fn take<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], DecodeError> {
        self.require(N, context)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    /// Returns true if the source has no more bytes.
    pub fn is_at_end(&mut self) -> Result<bool, DecodeError> {
        let available = self.fill(1).map_err(|e| DecodeError::from_io(e, "end of stream"))?;
        Ok(!available)
    }

    /// Returns the next `n` bytes without consuming them, or `None` if the
    /// stream ends first.
    pub fn peek(&mut self, n: usize) -> Result<Option<&[u8]>, DecodeError> {
        if self.fill(n).map_err(|e| DecodeError::from_io(e, "peek"))? {
            Ok(Some(&self.buf[self.pos..self.pos + n]))
        } else {
            Ok(None)
        }
    }

    /// Discards `n` bytes.
    pub fn skip(&mut self, mut n: u64) -> Result<(), DecodeError> {
        loop {
            let available = (self.end - self.pos) as u64;
            if available >= n {
                self.pos += n as usize;
                return Ok(());
            }
            n -= available;
            self.pos = self.end;
            self.require(1, "skipped bytes")?;
        }
    }

    // =========================================================================
    // Typed reads
    // =========================================================================

    #[inline]
    pub fn read_u8(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take::<1>(context)?[0])
    }

    #[inline]
    pub fn read_i8(&mut self, context: &'static str) -> Result<i8, DecodeError> {
        Ok(i8::from_be_bytes(self.take(context)?))
    }

    #[inline]
    pub fn read_u16(&mut self, context: &'static str) -> Result<u16, DecodeError> {
        Ok(u16::from_be_bytes(self.take(context)?))
    }

    #[inline]
    pub fn read_i16(&mut self, context: &'static str) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.take(context)?))
    }

    #[inline]
    pub fn read_i32(&mut self, context: &'static str) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.take(context)?))
    }

    #[inline]
    pub fn read_i64(&mut self, context: &'static str) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.take(context)?))
    }

    #[inline]
    pub fn read_f32(&mut self, context: &'static str) -> Result<f32, DecodeError> {
        Ok(f32::from_be_bytes(self.take(context)?))
    }

    #[inline]
    pub fn read_f64(&mut self, context: &'static str) -> Result<f64, DecodeError> {
        Ok(f64::from_be_bytes(self.take(context)?))
    }

    /// Reads exactly `n` bytes into an owned buffer.
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<Vec<u8>, DecodeError> {
        self.require(n, context)?;
        let bytes = self.buf[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(bytes)
    }

    /// Reads a non-negative `i32` length bounded by `max`.
    pub fn read_length(&mut self, max: usize, field: &'static str) -> Result<usize, DecodeError> {
        let len = self.read_i32(field)?;
        let len = usize::try_from(len).map_err(|_| DecodeError::NegativeLength { field, len: len as i64 })?;
        if len > max {
            return Err(DecodeError::LengthExceedsLimit { field, len, max });
        }
        Ok(len)
    }

    /// Reads an `i32`-length-prefixed byte block; a negative length means absent.
    pub fn read_byte_block(&mut self, field: &'static str) -> Result<Option<Vec<u8>>, DecodeError> {
        let len = self.read_i32(field)?;
        let Ok(len) = usize::try_from(len) else {
            return Ok(None);
        };
        if len > MAX_BYTES_LEN {
            return Err(DecodeError::LengthExceedsLimit { field, len, max: MAX_BYTES_LEN });
        }
        self.read_bytes(len, field).map(Some)
    }

    /// Reads an `i32`-length-prefixed UTF-8 string.
    pub fn read_string(&mut self, field: &'static str) -> Result<String, DecodeError> {
        let len = self.read_length(MAX_STRING_LEN, field)?;
        self.require(len, field)?;
        let s = std::str::from_utf8(&self.buf[self.pos..self.pos + len])
            .map(str::to_string)
            .map_err(|_| DecodeError::InvalidUtf8 { field })?;
        self.pos += len;
        Ok(s)
    }

    // =========================================================================
    // Header and digest
    // =========================================================================

    /// Consumes a stream header if one starts at the current position.
    ///
    /// Returns false (consuming nothing) if the next bytes are not the magic.
    /// A header announcing a newer version than [`CURRENT_VERSION`] fails with
    /// [`DecodeError::VersionMismatch`].
    pub fn read_header(&mut self) -> Result<bool, DecodeError> {
        match self.peek(MAGIC.len())? {
            Some(bytes) if bytes == MAGIC => {}
            _ => return Ok(false),
        }
        self.pos += MAGIC.len();
        let major = self.read_u8("major version")?;
        let minor = self.read_u8("minor version")?;
        let found = Version::new(major, minor);
        if found > CURRENT_VERSION {
            return Err(DecodeError::VersionMismatch {
                found,
                supported: CURRENT_VERSION,
            });
        }
        debug!(version = %found, offset = self.position(), "stream header");
        self.version = found;
        Ok(true)
    }

    /// Arms a fresh digest at the current position.
    pub fn start_digest(&mut self) {
        self.digest = Some(DigestState {
            hasher: Sha256::new(),
            from: self.pos,
        });
    }

    /// Returns the digest of the bytes consumed since [`start_digest`](Self::start_digest)
    /// and disarms it; `None` if no digest was armed.
    pub fn finish_digest(&mut self) -> Option<ContentDigest> {
        let mut digest = self.digest.take()?;
        digest.hasher.update(&self.buf[digest.from..self.pos]);
        Some(digest.hasher.finalize().into())
    }

    /// Disarms the digest without finishing it.
    pub fn cancel_digest(&mut self) {
        self.digest = None;
    }

    /// Returns true while a digest is armed.
    pub fn is_digesting(&self) -> bool {
        self.digest.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::primitives::Writer;

    fn cursor(bytes: &[u8]) -> ByteCursor<&[u8]> {
        ByteCursor::with_capacity(bytes, MIN_BUFFER_SIZE)
    }

    #[test]
    fn test_typed_reads_across_refills() {
        let mut w = Writer::new();
        for i in 0..20 {
            w.write_i32(i * 1000);
            w.write_i64(-(i as i64));
            w.write_f64(i as f64 / 2.0);
            w.write_u16(i as u16);
        }
        let bytes = w.into_bytes();
        let mut c = cursor(&bytes);
        for i in 0..20 {
            assert_eq!(c.read_i32("i32").unwrap(), i * 1000);
            assert_eq!(c.read_i64("i64").unwrap(), -(i as i64));
            assert_eq!(c.read_f64("f64").unwrap(), i as f64 / 2.0);
            assert_eq!(c.read_u16("u16").unwrap(), i as u16);
        }
        assert!(c.is_at_end().unwrap());
        assert_eq!(c.position(), bytes.len() as u64);
    }

    #[test]
    fn test_string_and_blocks() {
        let mut w = Writer::new();
        w.write_string("héllo wörld, a string longer than the buffer");
        w.write_byte_block(None);
        w.write_byte_block(Some(&[1, 2, 3]));
        w.write_f32(1.5);
        let bytes = w.into_bytes();

        let mut c = cursor(&bytes);
        assert_eq!(
            c.read_string("s").unwrap(),
            "héllo wörld, a string longer than the buffer"
        );
        assert_eq!(c.read_byte_block("b").unwrap(), None);
        assert_eq!(c.read_byte_block("b").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(c.read_f32("f").unwrap(), 1.5);
    }

    #[test]
    fn test_invalid_utf8() {
        let mut w = Writer::new();
        w.write_i32(2);
        w.write_bytes(&[0xC3, 0x28]);
        let bytes = w.into_bytes();
        let result = cursor(&bytes).read_string("name");
        assert!(matches!(result, Err(DecodeError::InvalidUtf8 { field: "name" })));
    }

    #[test]
    fn test_negative_string_length() {
        let bytes = (-5i32).to_be_bytes();
        let result = cursor(&bytes).read_string("name");
        assert!(matches!(result, Err(DecodeError::NegativeLength { len: -5, .. })));
    }

    #[test]
    fn test_truncated() {
        let bytes = [0u8, 1, 2];
        let mut c = cursor(&bytes);
        let result = c.read_i32("node id");
        assert!(matches!(result, Err(DecodeError::TruncatedInput { context: "node id" })));
    }

    #[test]
    fn test_peek_is_non_consuming() {
        let bytes = [9u8, 8, 7];
        let mut c = cursor(&bytes);
        assert_eq!(c.peek(2).unwrap(), Some(&[9u8, 8][..]));
        assert_eq!(c.peek(4).unwrap(), None);
        assert_eq!(c.read_u8("b").unwrap(), 9);
        assert_eq!(c.position(), 1);
    }

    #[test]
    fn test_header() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[7, 0, 0x02]);
        let mut c = cursor(&bytes);
        assert_eq!(c.version(), LEGACY_VERSION);
        assert!(c.read_header().unwrap());
        assert_eq!(c.version(), Version::new(7, 0));
        assert!(!c.read_header().unwrap());
        assert_eq!(c.read_u8("op").unwrap(), 0x02);
    }

    #[test]
    fn test_header_version_gate() {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[CURRENT_VERSION.major + 1, 0]);
        let result = cursor(&bytes).read_header();
        assert!(matches!(result, Err(DecodeError::VersionMismatch { .. })));

        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&[CURRENT_VERSION.major, CURRENT_VERSION.minor + 1]);
        assert!(cursor(&bytes).read_header().is_err());
    }

    #[test]
    fn test_digest_spans_refills() {
        let data: Vec<u8> = (0..200u8).collect();
        let mut c = cursor(&data);
        c.skip(10).unwrap();
        c.start_digest();
        c.read_bytes(100, "payload").unwrap();
        for _ in 0..10 {
            c.read_u8("byte").unwrap();
        }
        let digest = c.finish_digest().unwrap();
        assert!(!c.is_digesting());

        let expected: ContentDigest = Sha256::digest(&data[10..120]).into();
        assert_eq!(digest, expected);
        assert_eq!(c.finish_digest(), None);

        c.start_digest();
        c.read_bytes(5, "bytes").unwrap();
        c.cancel_digest();
        assert!(!c.is_digesting());
        assert_eq!(c.finish_digest(), None);
    }

    #[test]
    fn test_skip() {
        let data: Vec<u8> = (0..100u8).collect();
        let mut c = cursor(&data);
        c.skip(73).unwrap();
        assert_eq!(c.read_u8("b").unwrap(), 73);
        assert!(matches!(c.skip(500), Err(DecodeError::TruncatedInput { .. })));
    }
}
