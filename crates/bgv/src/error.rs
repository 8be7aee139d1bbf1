//! Error types for BGV encoding and decoding.

use std::io;

use thiserror::Error;

use crate::codec::pool::ConstantPool;
use crate::model::{PoolKind, Version};

/// Coarse error classes, used to decide whether a failure is recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// B001: Stream ended in the middle of a record
    Truncated,
    /// B002: Stream version is newer than supported
    Version,
    /// B003: Corrupted framing inside a root item
    Framing,
    /// B004: Underlying I/O failure
    Io,
    /// B005: Recovery signal, handled by the root loop
    Recovery,
}

impl ErrorCode {
    /// Returns the error code string (e.g., "B001").
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::Truncated => "B001",
            ErrorCode::Version => "B002",
            ErrorCode::Framing => "B003",
            ErrorCode::Io => "B004",
            ErrorCode::Recovery => "B005",
        }
    }
}

/// Request to abandon the current root item and resume at `end`.
///
/// Raised by a [`Builder`](crate::builder::Builder) (or by decoding code on
/// its behalf) when it knows where the current root item ends in the stream.
#[derive(Debug, Clone)]
pub struct SkipRoot {
    /// Absolute stream offset of the first byte after the abandoned item.
    pub end: u64,
    /// Pool to adopt once the skip completes.
    pub pool: Option<ConstantPool>,
}

impl SkipRoot {
    /// Skips to `end`, keeping the current constant pool.
    pub fn to(end: u64) -> Self {
        Self { end, pool: None }
    }

    /// Skips to `end` and continues with `pool`.
    pub fn with_pool(end: u64, pool: ConstantPool) -> Self {
        Self { end, pool: Some(pool) }
    }
}

/// Error during binary decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    // === B001: Truncated input ===
    #[error("[B001] unexpected end of input while reading {context}")]
    TruncatedInput { context: &'static str },

    // === B002: Version mismatch ===
    #[error("[B002] stream version {found} is newer than supported {supported}")]
    VersionMismatch { found: Version, supported: Version },

    // === B003: Corrupted framing ===
    #[error("[B003] pool index {index} out of bounds (size: {size})")]
    InvalidPoolIndex { index: u16, size: usize },

    #[error("[B003] invalid tag 0x{tag:02x} while reading {context}")]
    MalformedTag { context: &'static str, tag: u8 },

    #[error("[B003] expected pool entry of kind {expected:?}, found {found:?}")]
    PoolKindMismatch { expected: PoolKind, found: PoolKind },

    #[error("[B003] {feature} requires format version {required}, stream is {found}")]
    FeatureNotInVersion {
        feature: &'static str,
        required: Version,
        found: Version,
    },

    #[error("[B003] invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("[B003] {field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("[B003] negative length {len} for {field}")]
    NegativeLength { field: &'static str, len: i64 },

    #[error("[B003] graph nesting exceeds maximum depth {max}")]
    NestingTooDeep { max: usize },

    #[error("[B003] enum ordinal {ordinal} out of range for {klass}")]
    InvalidEnumOrdinal { klass: String, ordinal: i32 },

    // === B004: I/O ===
    #[error("[B004] i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("[B004] zstd decompression failed: {0}")]
    Decompression(String),

    // === B005: Recovery ===
    #[error("[B005] skip to offset {}", .0.end)]
    SkipRoot(SkipRoot),
}

impl DecodeError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::TruncatedInput { .. } => ErrorCode::Truncated,
            DecodeError::VersionMismatch { .. } => ErrorCode::Version,
            DecodeError::Io(_) | DecodeError::Decompression(_) => ErrorCode::Io,
            DecodeError::SkipRoot(_) => ErrorCode::Recovery,
            _ => ErrorCode::Framing,
        }
    }

    /// Maps a short read reported by the source to [`DecodeError::TruncatedInput`].
    pub(crate) fn from_io(err: io::Error, context: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::TruncatedInput { context }
        } else {
            DecodeError::Io(err)
        }
    }
}

impl From<SkipRoot> for DecodeError {
    fn from(skip: SkipRoot) -> Self {
        DecodeError::SkipRoot(skip)
    }
}

/// Error during binary encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{feature} cannot be written in format version {version}")]
    UnsupportedInVersion {
        feature: &'static str,
        version: Version,
    },

    #[error("version {requested} is newer than supported {supported}")]
    VersionTooNew { requested: Version, supported: Version },

    #[error("pool capacity {requested} is below minimum {min}")]
    PoolTooSmall { requested: usize, min: usize },

    #[error("write cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("zstd compression failed: {0}")]
    CompressionFailed(String),
}
