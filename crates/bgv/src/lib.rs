//! BGV: streaming binary codec for compiler graph dumps.
//!
//! A BGV stream is a sequence of nested groups holding graphs of typed nodes
//! and edges, with shared descriptors (classes, methods, node classes, source
//! positions) interned in a constant pool that the producer manages.
//!
//! # Quick Start
//!
//! ```rust
//! use bgv::{Document, Graph, Group, GroupElement, EncodeOptions, encode_document, decode_document};
//!
//! let mut group = Group::new("demo.Main.run", "run");
//! group.elements.push(GroupElement::Graph(Graph::new(0, "After parsing", Vec::new())));
//! let mut document = Document::new();
//! document.groups.push(group);
//!
//! let bytes = encode_document(&document, EncodeOptions::new()).unwrap();
//! let report = decode_document(bytes.as_slice());
//! assert!(report.is_complete());
//! assert_eq!(report.document.groups[0].name, "demo.Main.run");
//! ```
//!
//! # Modules
//!
//! - [`model`]: Document tree and constant pool payloads
//! - [`codec`]: Byte cursor, decoder, encoder and constant pools
//! - [`builder`]: The decoder's event interface and the document-building implementation
//! - [`error`]: Error types
//! - [`limits`]: Protocol constants and decoding limits
//!
//! # Untrusted input
//!
//! Every length read from the wire is checked against [`limits`] before
//! anything is allocated, and recursion through nested graphs and source
//! position callers is bounded. Corrupt input ends in a [`DecodeError`], with
//! the partial document kept.
//!
//! # Compression
//!
//! [`codec::open_dump`] detects zstd-framed dumps and decompresses them on
//! the fly; [`EncodeOptions::compressed`] produces them.

pub mod builder;
pub mod codec;
pub mod error;
pub mod limits;
pub mod model;

pub use builder::{Builder, LoadReport, LoadingError, ModelBuilder, NullBuilder};
pub use codec::{
    DecodeOptions, Decoder, EncodeOptions, Encoder, decode_document, decode_document_with,
    encode_document, encode_document_to, open_dump,
};
pub use error::{DecodeError, EncodeError};
pub use model::{Document, Edge, Graph, Group, GroupElement, Node, PoolValue, Properties, Value, Version};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
