//! Transparent spilling for per-branch tuple collections.
//!
//! A [`SpillableTupleList`] buffers tuples in memory and, once its
//! [`SpillThreshold`] is crossed, writes the buffer as a new segment through
//! a [`SpillStorage`]. Segments are read back lazily, one tuple at a time.
//!
//! # Segment format
//!
//! ```text
//! varint(count) tuple{count}
//! ```
//!
//! where each tuple is encoded by the [`TupleCodec`](crate::codec::TupleCodec).
//!
//! # Architecture
//!
//! - [`SpillableTupleList`] - Append-only list with threshold spilling
//! - [`SpillStorage`] - Segment store ([`FileSpillStorage`], [`MemorySpillStorage`])
//! - [`SpillListener`] - Write/read notifications for metrics
//! - [`Upstream`] - The live input a streamed branch reads from

mod list;
mod listener;
mod storage;
mod stream;

pub use list::{DEFAULT_SPILL_THRESHOLD, SpillThreshold, SpillableTupleList, TupleIter};
pub(crate) use list::DetachedStream;
pub use listener::{NoopSpillListener, ReadSpillEvent, SpillListener, SpillReason, WriteSpillEvent};
pub use storage::{FileSpillStorage, MemorySpillStorage, SegmentHandle, SegmentWriter, SpillStorage};
pub use stream::{IndexTupleSource, SharedUpstream, Upstream, source_from, source_from_pairs};
