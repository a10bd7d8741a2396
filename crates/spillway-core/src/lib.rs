//! # spillway-core
//!
//! Core layer for Spillway: the tuple codec, spillable tuple lists and the
//! join gates that partition one key's values into per-branch collections.
//!
//! This crate depends only on `spillway-common`.
//!
//! ## Modules
//!
//! - [`codec`] - Binary tuple encoding with an extensible type-token registry
//! - [`spill`] - Spill storage, listeners and [`SpillableTupleList`]
//! - [`gate`] - The [`JoinGate`] capability and its two implementations

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod gate;
pub mod spill;

// Re-export commonly used types
pub use codec::{BincodeSerializer, ObjectSerializer, Serialization, TokenRegistry, TupleCodec};
pub use gate::{CoGroupGate, JoinGate, MemoryJoinGate, TupleStream};
pub use spill::{
    FileSpillStorage, IndexTupleSource, MemorySpillStorage, SpillListener, SpillStorage,
    SpillThreshold, SpillableTupleList, source_from, source_from_pairs,
};
