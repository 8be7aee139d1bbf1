//! Protocol constants and decoding limits.
//!
//! The limits bound every allocation the decoder makes from a length read
//! off the wire, so a corrupted count fails fast instead of exhausting memory.

use crate::model::Version;

/// Stream header magic.
pub const MAGIC: &[u8; 4] = b"BIGV";

/// Newest format version this crate reads and writes.
pub const CURRENT_VERSION: Version = Version::new(8, 0);

/// Version assumed for streams that start without a header.
pub const LEGACY_VERSION: Version = Version::new(1, 0);

/// First version with source positions in the constant pool.
pub const SOURCE_POSITIONS_SINCE: Version = Version::new(6, 0);

/// First version with the `STREAM_PROPERTIES` root item.
pub const STREAM_PROPERTIES_SINCE: Version = Version::new(7, 0);

/// First version with pooled node references and the 32-bit property count escape.
pub const LARGE_PROPERTIES_SINCE: Version = Version::new(8, 0);

/// 16-bit property count that announces a following 32-bit count.
pub const PROPERTY_COUNT_ESCAPE: u16 = 0xFFFF;

// Root op-codes
pub const BEGIN_GROUP: u8 = 0x00;
pub const BEGIN_GRAPH: u8 = 0x01;
pub const CLOSE_GROUP: u8 = 0x02;
pub const STREAM_PROPERTIES: u8 = 0x03;

// Pool tags
pub const POOL_NEW: u8 = 0x00;
pub const POOL_STRING: u8 = 0x01;
pub const POOL_ENUM: u8 = 0x02;
pub const POOL_CLASS: u8 = 0x03;
pub const POOL_METHOD: u8 = 0x04;
pub const POOL_NULL: u8 = 0x05;
pub const POOL_NODE_CLASS: u8 = 0x06;
pub const POOL_FIELD: u8 = 0x07;
pub const POOL_SIGNATURE: u8 = 0x08;
pub const POOL_NODE_SOURCE_POSITION: u8 = 0x09;
pub const POOL_NODE: u8 = 0x0A;

// Property value tags
pub const PROPERTY_POOL: u8 = 0x00;
pub const PROPERTY_INT: u8 = 0x01;
pub const PROPERTY_LONG: u8 = 0x02;
pub const PROPERTY_DOUBLE: u8 = 0x03;
pub const PROPERTY_FLOAT: u8 = 0x04;
pub const PROPERTY_TRUE: u8 = 0x05;
pub const PROPERTY_FALSE: u8 = 0x06;
pub const PROPERTY_ARRAY: u8 = 0x07;
pub const PROPERTY_SUBGRAPH: u8 = 0x08;

// Class kinds
pub const KLASS: u8 = 0x00;
pub const ENUM_KLASS: u8 = 0x01;

/// Maximum string length in bytes (16 MiB).
pub const MAX_STRING_LEN: usize = 16 * 1024 * 1024;

/// Maximum byte block length (method bytecode) in bytes (64 MiB).
pub const MAX_BYTES_LEN: usize = 64 * 1024 * 1024;

/// Maximum element count of an array property value.
pub const MAX_ARRAY_LEN: usize = 16 * 1024 * 1024;

/// Maximum entry count of one property list.
pub const MAX_PROPERTIES: usize = 1024 * 1024;

/// Maximum node or block count of one graph.
pub const MAX_NODES_PER_GRAPH: usize = 64 * 1024 * 1024;

/// Maximum nesting of graphs inside node properties.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Default read buffer size of the byte cursor.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default number of live indices in the encoder's constant pool.
pub const DEFAULT_POOL_CAPACITY: usize = 8000;

/// Smallest pool capacity the encoder accepts.
///
/// Writing one pool entry can define a handful of nested entries (a method
/// defines its holder, name and signature); the entry being written must not
/// be recycled by its own children.
pub const MIN_POOL_CAPACITY: usize = 16;
