//! Append-only tuple list that spills to external storage.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spillway_common::types::{IndexTuple, Tuple};
use spillway_common::utils::error::{Result, SpillError};

use super::listener::{
    ReadSpillEvent, SpillListener, SpillReason, WriteSpillEvent, notify_read, notify_write,
};
use super::storage::{SegmentHandle, SpillStorage};
use super::stream::{SharedUpstream, StreamIter};
use crate::codec::TupleCodec;
use crate::codec::varint::{read_len, write_u64};

/// Default number of buffered tuples that triggers a spill.
pub const DEFAULT_SPILL_THRESHOLD: usize = 10_000;

/// When a list writes its buffer out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpillThreshold {
    /// Spill once this many tuples are buffered.
    Tuples(usize),
    /// Spill once the estimated buffered size reaches this many bytes.
    Bytes(usize),
}

impl SpillThreshold {
    fn reached(self, tuples: usize, bytes: usize) -> Option<SpillReason> {
        match self {
            Self::Tuples(limit) if tuples >= limit.max(1) => Some(SpillReason::TupleCount),
            Self::Bytes(limit) if bytes >= limit.max(1) => Some(SpillReason::ByteSize),
            _ => None,
        }
    }
}

impl Default for SpillThreshold {
    fn default() -> Self {
        Self::Tuples(DEFAULT_SPILL_THRESHOLD)
    }
}

#[derive(Clone)]
struct Segment {
    handle: Arc<dyn SegmentHandle>,
    tuples: usize,
}

enum StreamState {
    Unopened { head: Tuple, upstream: SharedUpstream },
    Open,
}

/// What was left of a list's stream when the gate detached it.
pub(crate) enum DetachedStream {
    /// Nobody has read the stream; `head` is its first value.
    Unopened { head: Tuple },
    /// The stream is being read; the list keeps treating it as consumed.
    Open,
}

/// Ordered, append-only tuple buffer that spills to external storage.
///
/// Tuples accumulate in memory until the [`SpillThreshold`] is crossed; the
/// buffer is then written as a new segment and cleared. Iteration reads each
/// segment in creation order, one tuple at a time, followed by the buffer.
///
/// A list can instead be backed by a live upstream with
/// [`set_iterator`](Self::set_iterator). It is then single-pass and read-only.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use spillway_common::tuple;
/// use spillway_core::codec::{Serialization, TupleCodec};
/// use spillway_core::spill::{MemorySpillStorage, SpillThreshold, SpillableTupleList};
///
/// let codec = TupleCodec::new(Arc::new(Serialization::empty()));
/// let storage = Arc::new(MemorySpillStorage::new());
/// let mut list = SpillableTupleList::new(SpillThreshold::Tuples(2), codec, storage);
///
/// assert!(!list.add(tuple![1i64]).unwrap());
/// assert!(list.add(tuple![2i64]).unwrap());
/// list.add(tuple![3i64]).unwrap();
///
/// let values: Vec<_> = list.iter().unwrap().map(Result::unwrap).collect();
/// assert_eq!(values, vec![tuple![1i64], tuple![2i64], tuple![3i64]]);
/// assert_eq!(list.spill_count(), 1);
/// ```
pub struct SpillableTupleList {
    threshold: SpillThreshold,
    codec: TupleCodec,
    storage: Arc<dyn SpillStorage>,
    listener: Option<Arc<dyn SpillListener>>,
    description: Arc<str>,
    buffer: Arc<Vec<Tuple>>,
    buffered_bytes: usize,
    segments: Vec<Segment>,
    stream: Option<StreamState>,
}

impl SpillableTupleList {
    /// Creates an empty list.
    #[must_use]
    pub fn new(threshold: SpillThreshold, codec: TupleCodec, storage: Arc<dyn SpillStorage>) -> Self {
        Self {
            threshold,
            codec,
            storage,
            listener: None,
            description: Arc::from(""),
            buffer: Arc::new(Vec::new()),
            buffered_bytes: 0,
            segments: Vec::new(),
            stream: None,
        }
    }

    /// Notifies `listener` of spill writes and reads.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn SpillListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Creates an empty list sharing this list's configuration.
    #[must_use]
    pub fn fork_empty(&self) -> Self {
        Self {
            threshold: self.threshold,
            codec: self.codec.clone(),
            storage: Arc::clone(&self.storage),
            listener: self.listener.clone(),
            description: Arc::clone(&self.description),
            buffer: Arc::new(Vec::new()),
            buffered_bytes: 0,
            segments: Vec::new(),
            stream: None,
        }
    }

    /// Returns the spill threshold.
    #[must_use]
    pub fn threshold(&self) -> SpillThreshold {
        self.threshold
    }

    /// Describes the list in spill events, usually by its grouping key.
    pub fn set_grouping(&mut self, grouping: &Tuple) {
        self.description = Arc::from(grouping.print());
    }

    /// Returns the description used in spill events.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Appends `tuple`, spilling the buffer if the threshold is crossed.
    ///
    /// Returns `true` exactly when this call wrote a segment.
    ///
    /// # Errors
    ///
    /// Fails if the list is streamed, if a value cannot be encoded, or if the
    /// segment cannot be written. The buffer is left intact on failure.
    pub fn add(&mut self, tuple: Tuple) -> std::result::Result<bool, SpillError> {
        if self.stream.is_some() {
            return Err(SpillError::Streamed);
        }
        self.buffered_bytes += tuple.estimated_size();
        Arc::make_mut(&mut self.buffer).push(tuple);

        match self.threshold.reached(self.buffer.len(), self.buffered_bytes) {
            Some(reason) => {
                self.spill(reason)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes the buffer out as a new segment, even below the threshold.
    ///
    /// # Errors
    ///
    /// Fails if a value cannot be encoded or the segment cannot be written.
    pub fn flush(&mut self) -> std::result::Result<(), SpillError> {
        self.spill(SpillReason::Materialize)
    }

    fn spill(&mut self, reason: SpillReason) -> std::result::Result<(), SpillError> {
        let tuples = self.buffer.len();
        if tuples == 0 {
            return Ok(());
        }

        notify_write(
            self.listener.as_deref(),
            &WriteSpillEvent {
                list: &self.description,
                tuples,
                estimated_bytes: self.buffered_bytes,
                spill_count: self.segments.len() + 1,
                reason,
            },
        );

        let mut writer = self
            .storage
            .create()
            .map_err(|source| SpillError::Io { op: "create", source })?;
        write_u64(&mut writer, tuples as u64).map_err(SpillError::Encode)?;
        for tuple in self.buffer.iter() {
            self.codec
                .write_tuple(&mut writer, tuple)
                .map_err(SpillError::Encode)?;
        }
        let handle = writer
            .finish()
            .map_err(|source| SpillError::Io { op: "write", source })?;

        tracing::debug!(
            list = %self.description,
            tuples,
            bytes = handle.byte_len(),
            segment = self.segments.len(),
            %reason,
            "spilled tuple list"
        );

        self.segments.push(Segment { handle, tuples });
        match Arc::get_mut(&mut self.buffer) {
            Some(buffer) => buffer.clear(),
            None => self.buffer = Arc::new(Vec::new()),
        }
        self.buffered_bytes = 0;
        Ok(())
    }

    /// Number of segments written since the list was last cleared.
    #[must_use]
    pub fn spill_count(&self) -> usize {
        self.segments.len()
    }

    /// Number of tuples held, not counting a live stream.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.tuples).sum::<usize>() + self.buffer.len()
    }

    /// Returns `true` if the list holds no tuples. A streamed list always
    /// holds at least its first value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stream.is_none() && self.segments.is_empty() && self.buffer.is_empty()
    }

    /// Returns `true` if the list is backed by a live upstream.
    #[must_use]
    pub fn is_streamed(&self) -> bool {
        self.stream.is_some()
    }

    /// Discards all segments, the buffer and any installed stream.
    pub fn clear(&mut self) {
        self.segments.clear();
        match Arc::get_mut(&mut self.buffer) {
            Some(buffer) => buffer.clear(),
            None => self.buffer = Arc::new(Vec::new()),
        }
        self.buffered_bytes = 0;
        self.stream = None;
    }

    /// Installs the still-open upstream as this list's source.
    ///
    /// `head` is the first value of the branch; the rest is pulled from
    /// `upstream` as the list is read. Upstream must deliver this branch's
    /// values contiguously; that is not checked.
    pub fn set_iterator(&mut self, head: IndexTuple, upstream: SharedUpstream) {
        self.clear();
        self.stream = Some(StreamState::Unopened {
            head: head.into_tuple(),
            upstream,
        });
    }

    /// Returns a lazy traversal of the list.
    ///
    /// Buffered lists may be traversed any number of times; each traversal is
    /// a snapshot unaffected by later appends. A streamed list yields its live
    /// stream once.
    ///
    /// # Errors
    ///
    /// Returns [`SpillError::StreamConsumed`] on the second traversal of a
    /// streamed list.
    pub fn iter(&mut self) -> std::result::Result<TupleIter, SpillError> {
        match self.stream.take() {
            Some(StreamState::Unopened { head, upstream }) => {
                self.stream = Some(StreamState::Open);
                Ok(TupleIter::new(Source::Stream(StreamIter::new(head, upstream))))
            }
            Some(StreamState::Open) => {
                self.stream = Some(StreamState::Open);
                Err(SpillError::StreamConsumed)
            }
            None => Ok(TupleIter::new(Source::Spilled(SpilledIter {
                description: Arc::clone(&self.description),
                codec: self.codec.clone(),
                listener: self.listener.clone(),
                segments: self.segments.clone(),
                next_segment: 0,
                cursor: None,
                memory: Arc::clone(&self.buffer),
                memory_pos: 0,
            }))),
        }
    }

    /// Detaches the live stream. An unopened stream leaves the list buffered
    /// and empty; an open one stays installed so re-reads still fail.
    pub(crate) fn detach_stream(&mut self) -> Option<DetachedStream> {
        match self.stream.take()? {
            StreamState::Unopened { head, .. } => Some(DetachedStream::Unopened { head }),
            StreamState::Open => {
                self.stream = Some(StreamState::Open);
                Some(DetachedStream::Open)
            }
        }
    }
}

impl fmt::Debug for SpillableTupleList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpillableTupleList")
            .field("description", &self.description)
            .field("threshold", &self.threshold)
            .field("buffered", &self.buffer.len())
            .field("segments", &self.segments.len())
            .field("streamed", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

/// Lazy traversal of a [`SpillableTupleList`].
///
/// Yields `Err` at most once; the iterator is exhausted after an error.
pub struct TupleIter {
    source: Source,
    failed: bool,
}

enum Source {
    Spilled(SpilledIter),
    Stream(StreamIter),
}

impl TupleIter {
    fn new(source: Source) -> Self {
        Self {
            source,
            failed: false,
        }
    }
}

impl Iterator for TupleIter {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = match &mut self.source {
            Source::Spilled(iter) => iter.next(),
            Source::Stream(iter) => iter.next(),
        };
        if matches!(next, Some(Err(_))) {
            self.failed = true;
        }
        next
    }
}

impl std::iter::FusedIterator for TupleIter {}

struct SegmentCursor {
    reader: Box<dyn Read + Send>,
    remaining: usize,
    segment: usize,
}

struct SpilledIter {
    description: Arc<str>,
    codec: TupleCodec,
    listener: Option<Arc<dyn SpillListener>>,
    segments: Vec<Segment>,
    next_segment: usize,
    cursor: Option<SegmentCursor>,
    memory: Arc<Vec<Tuple>>,
    memory_pos: usize,
}

impl SpilledIter {
    fn open_segment(&self, index: usize) -> Result<SegmentCursor> {
        let segment = &self.segments[index];
        notify_read(
            self.listener.as_deref(),
            &ReadSpillEvent {
                list: &self.description,
                segment: index,
                tuples: segment.tuples,
            },
        );

        let mut reader = segment
            .handle
            .open()
            .map_err(|source| SpillError::Io { op: "open", source })?;
        let remaining = read_len(&mut reader, "segment header").map_err(|source| {
            SpillError::Decode {
                segment: index,
                source,
            }
        })?;
        Ok(SegmentCursor {
            reader,
            remaining,
            segment: index,
        })
    }
}

impl Iterator for SpilledIter {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cursor) = self.cursor.as_mut() {
                if cursor.remaining > 0 {
                    cursor.remaining -= 1;
                    let segment = cursor.segment;
                    return Some(
                        self.codec
                            .read_tuple(&mut cursor.reader)
                            .map_err(|source| SpillError::Decode { segment, source }.into()),
                    );
                }
                self.cursor = None;
            }

            if self.next_segment < self.segments.len() {
                let index = self.next_segment;
                self.next_segment += 1;
                match self.open_segment(index) {
                    Ok(cursor) => self.cursor = Some(cursor),
                    Err(err) => return Some(Err(err)),
                }
                continue;
            }

            let tuple = self.memory.get(self.memory_pos)?.clone();
            self.memory_pos += 1;
            return Some(Ok(tuple));
        }
    }
}
