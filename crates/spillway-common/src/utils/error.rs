//! Error types for Spillway.
//!
//! Each concern has its own enum ([`CodecError`], [`SpillError`], [`GateError`]);
//! [`Error`] unifies them for callers that only need to propagate.

use std::io;

use thiserror::Error;

/// Result type alias for Spillway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Spillway.
#[derive(Error, Debug)]
pub enum Error {
    /// Tuple encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Spill storage failure.
    #[error(transparent)]
    Spill(#[from] SpillError),

    /// Join gate misuse or failed build.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A field selector referenced a position the tuple does not have.
    #[error("field position {pos} out of range for tuple of arity {arity}")]
    FieldOutOfRange {
        /// Requested position.
        pos: usize,
        /// Arity of the tuple.
        arity: usize,
    },

    /// The upstream grouping layer reported a failure.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while encoding or decoding tuples.
#[derive(Error, Debug)]
pub enum CodecError {
    /// A decoded token is not registered.
    #[error("unknown serialization token: {0}")]
    UnknownToken(u32),

    /// A decoded type name has no serializer.
    #[error("no serializer registered for type name: {0}")]
    UnknownTypeName(String),

    /// A value's type has neither a token serializer nor a named serializer.
    #[error("type {0} is not registered for serialization")]
    UnregisteredType(String),

    /// Two types claimed the same token.
    #[error("token {token} claimed by both {first} and {second}")]
    DuplicateToken {
        /// The contested token.
        token: u32,
        /// Type registered first.
        first: String,
        /// Type registered second.
        second: String,
    },

    /// One type was given two tokens.
    #[error("type {type_name} registered with tokens {first} and {second}")]
    DuplicateTypeName {
        /// The type name.
        type_name: String,
        /// Token registered first.
        first: u32,
        /// Token registered second.
        second: u32,
    },

    /// Two serializers were registered for one type name.
    #[error("serializer for {0} registered twice")]
    DuplicateSerializer(String),

    /// A token collided with the range reserved for built-in tags.
    #[error("token {token} for {type_name} is reserved, tokens must be >= {min}")]
    ReservedToken {
        /// The offending token.
        token: u32,
        /// The type it was registered for.
        type_name: String,
        /// Smallest allowed token.
        min: u32,
    },

    /// A token mapping string could not be parsed.
    #[error("invalid token specification: {0:?}")]
    InvalidTokenSpec(String),

    /// The byte stream ended in the middle of a tuple.
    #[error("truncated input while reading {0}")]
    Truncated(&'static str),

    /// An element tag that is neither built in nor a token.
    #[error("invalid element tag: {0}")]
    InvalidTag(u32),

    /// Bytes were left over after decoding a complete tuple.
    #[error("{0} trailing bytes after tuple")]
    TrailingBytes(usize),

    /// A string payload was not valid UTF-8.
    #[error("invalid UTF-8 in string element")]
    InvalidUtf8,

    /// A variable-length integer overflowed its target width.
    #[error("varint overflow")]
    VarintOverflow,

    /// Tuples were nested deeper than the codec allows.
    #[error("tuple nesting exceeds {0} levels")]
    NestingTooDeep(usize),

    /// An object serializer failed.
    #[error("serializer for {type_name} failed: {message}")]
    Payload {
        /// Type being (de)serialized.
        type_name: String,
        /// Error reported by the serializer.
        message: String,
    },

    /// Underlying stream error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Maps an I/O error, turning an unexpected EOF into [`CodecError::Truncated`].
    #[must_use]
    pub fn from_read(err: io::Error, what: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated(what)
        } else {
            Self::Io(err)
        }
    }
}

/// Errors raised by spillable collections.
#[derive(Error, Debug)]
pub enum SpillError {
    /// Writing or reading a spill segment failed.
    #[error("spill {op} failed: {source}")]
    Io {
        /// The operation that failed.
        op: &'static str,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A tuple could not be encoded into a spill segment.
    #[error("cannot spill tuple: {0}")]
    Encode(#[source] CodecError),

    /// A spilled segment could not be decoded.
    #[error("corrupt spill segment {segment}: {source}")]
    Decode {
        /// Zero-based segment number.
        segment: usize,
        /// Underlying codec error.
        #[source]
        source: CodecError,
    },

    /// A streamed branch was traversed a second time.
    #[error("streamed branch already consumed")]
    StreamConsumed,

    /// A list backed by a live stream was appended to.
    #[error("cannot append to a streamed list")]
    Streamed,
}

/// Errors raised by join gates.
#[derive(Error, Debug)]
pub enum GateError {
    /// Branch position outside `[0, size)`.
    #[error("invalid group position: {pos} (gate has {size} branches)")]
    InvalidPosition {
        /// Requested position.
        pos: usize,
        /// Number of branches.
        size: usize,
    },

    /// A previous build failed; the gate must be discarded.
    #[error("gate is poisoned by an earlier failure")]
    Poisoned,

    /// `reset` has not been called yet.
    #[error("gate has no active grouping")]
    NoActiveKey,

    /// A merged tuple did not match the arity of the stream.
    #[error("arity mismatch in branch {branch}: expected {expected}, found {found}")]
    ArityMismatch {
        /// Branch that produced the tuple.
        branch: usize,
        /// Arity established by the first tuple.
        expected: usize,
        /// Arity of the offending tuple.
        found: usize,
    },
}
