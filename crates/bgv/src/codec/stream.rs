//! Input sources: plain dumps and zstd-framed dumps.

use std::io::{self, BufRead, BufReader, Read};

use tracing::debug;

use crate::error::DecodeError;

/// zstd frame magic number, as it appears on the wire.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// A dump source, decompressed on the fly if it was written compressed.
pub enum DumpReader<R: BufRead> {
    Plain(R),
    Zstd(zstd::Decoder<'static, R>),
}

impl<R: BufRead> DumpReader<R> {
    pub fn is_compressed(&self) -> bool {
        matches!(self, DumpReader::Zstd(_))
    }
}

impl<R: BufRead> Read for DumpReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DumpReader::Plain(r) => r.read(buf),
            DumpReader::Zstd(r) => r.read(buf),
        }
    }
}

/// Opens a dump, detecting zstd compression from the first bytes.
pub fn open_dump<R: Read>(reader: R) -> Result<DumpReader<BufReader<R>>, DecodeError> {
    let mut reader = BufReader::new(reader);
    let head = reader
        .fill_buf()
        .map_err(|e| DecodeError::from_io(e, "stream magic"))?;

    if head.starts_with(&ZSTD_MAGIC) {
        debug!("zstd-compressed dump");
        let decoder = zstd::Decoder::with_buffer(reader)
            .map_err(|e| DecodeError::Decompression(e.to_string()))?;
        Ok(DumpReader::Zstd(decoder))
    } else {
        Ok(DumpReader::Plain(reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_passthrough() {
        let data = b"BIGV\x08\x00\x02".to_vec();
        let mut reader = open_dump(data.as_slice()).unwrap();
        assert!(!reader.is_compressed());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_zstd_detected() {
        let data = b"BIGV\x08\x00".repeat(100);
        let compressed = zstd::encode_all(data.as_slice(), 3).unwrap();
        let mut reader = open_dump(compressed.as_slice()).unwrap();
        assert!(reader.is_compressed());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_empty_input() {
        let mut reader = open_dump(&[][..]).unwrap();
        let mut out = Vec::new();
        assert_eq!(reader.read_to_end(&mut out).unwrap(), 0);
    }

    #[test]
    fn test_corrupt_frame_is_io_error() {
        let mut data = ZSTD_MAGIC.to_vec();
        data.extend_from_slice(&[0xFF; 16]);
        let result = open_dump(data.as_slice()).and_then(|mut reader| {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).map_err(DecodeError::Io)
        });
        assert!(result.is_err());
    }
}
