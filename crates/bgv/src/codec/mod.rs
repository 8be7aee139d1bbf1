//! Binary encoding/decoding of BGV streams.
//!
//! Reading goes through a [`ByteCursor`] into a [`Decoder`] that drives a
//! [`Builder`](crate::builder::Builder); writing goes through an [`Encoder`]
//! that interns pool values in a [`PoolWriter`].

pub mod cursor;
pub mod decoder;
pub mod encoder;
pub mod pool;
pub mod primitives;
pub mod stream;

#[cfg(test)]
mod test_support;

pub use cursor::{ByteCursor, ContentDigest};
pub use decoder::{DecodeOptions, Decoder, decode_document, decode_document_with};
pub use encoder::{EncodeOptions, Encoder, encode_document, encode_document_to};
pub use pool::{ConstantPool, PoolRef, PoolWriter};
pub use primitives::Writer;
pub use stream::{DumpReader, open_dump};
