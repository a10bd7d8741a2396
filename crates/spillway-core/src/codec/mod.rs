//! Binary tuple encoding.
//!
//! A tuple is written as its element count followed by one tagged element per
//! position. No length prefix wraps the tuple; the count bounds the decode
//! loop, and decode consumes exactly what encode wrote.
//!
//! # Element tags
//!
//! | Tag | Element | Payload |
//! |-----|---------|---------|
//! | 0 | Null | none |
//! | 1 | Bool | one byte |
//! | 2 | Int32 | zig-zag varint |
//! | 3 | Int64 | zig-zag varint |
//! | 4 | Float64 | 8 bytes, big endian |
//! | 5 | String | varint length + UTF-8 |
//! | 6 | Bytes | varint length + bytes |
//! | 7 | Tuple | nested tuple |
//! | 8 | Named object | type name (as String payload) + serializer payload |
//! | >= 128 | Registered object token | serializer payload |
//!
//! Tags are varints, so tokens up to 16383 take two bytes.

mod registry;
mod serializer;
mod tuple_codec;
pub mod varint;

pub use registry::{Serialization, SerializationBuilder, TokenRegistry};
pub use serializer::{BincodeSerializer, ObjectSerializer};
pub use tuple_codec::TupleCodec;

/// Smallest token a user type may register; lower values are built-in tags.
pub const MIN_TOKEN: u32 = 128;

/// Deepest tuple nesting the codec writes or reads.
pub const MAX_NESTING_DEPTH: usize = 128;

pub(crate) const TAG_NULL: u32 = 0;
pub(crate) const TAG_BOOL: u32 = 1;
pub(crate) const TAG_INT32: u32 = 2;
pub(crate) const TAG_INT64: u32 = 3;
pub(crate) const TAG_FLOAT64: u32 = 4;
pub(crate) const TAG_STRING: u32 = 5;
pub(crate) const TAG_BYTES: u32 = 6;
pub(crate) const TAG_TUPLE: u32 = 7;
pub(crate) const TAG_NAMED: u32 = 8;
