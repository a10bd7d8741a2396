//! The still-open upstream a streamed branch reads from.
//!
//! Upstream delivers one key's `(branch, tuple)` pairs contiguous by branch,
//! branch 0 first. A streamed list yields branch-0 values straight from the
//! source and stops at the first pair of another branch, which is parked as
//! `pending` until the gate routes the rest of the input.

use std::sync::Arc;

use parking_lot::Mutex;
use spillway_common::types::{IndexTuple, Tuple};
use spillway_common::utils::error::Result;

use super::list::TupleIter;

/// One key's `(branch, tuple)` pairs as delivered by the grouping layer.
pub type IndexTupleSource = Box<dyn Iterator<Item = Result<IndexTuple>> + Send>;

/// Upstream shared between a streamed list and the gate that installed it.
pub type SharedUpstream = Arc<Mutex<Upstream>>;

/// Boxes any pair iterator into an [`IndexTupleSource`].
pub fn source_from<I>(iter: I) -> IndexTupleSource
where
    I: IntoIterator<Item = Result<IndexTuple>>,
    I::IntoIter: Send + 'static,
{
    Box::new(iter.into_iter())
}

/// Boxes infallible pairs into an [`IndexTupleSource`].
pub fn source_from_pairs<I>(pairs: I) -> IndexTupleSource
where
    I: IntoIterator<Item = (usize, Tuple)>,
    I::IntoIter: Send + 'static,
{
    Box::new(pairs.into_iter().map(|pair| Ok(IndexTuple::from(pair))))
}

/// Remaining input of the active key.
pub struct Upstream {
    source: IndexTupleSource,
    branch: usize,
    pending: Option<IndexTuple>,
    exhausted: bool,
    stream_done: bool,
    diverted: Option<TupleIter>,
}

impl Upstream {
    /// Wraps `source`, streaming values tagged with `branch`.
    #[must_use]
    pub fn shared(source: IndexTupleSource, branch: usize) -> SharedUpstream {
        Arc::new(Mutex::new(Self {
            source,
            branch,
            pending: None,
            exhausted: false,
            stream_done: false,
            diverted: None,
        }))
    }

    /// Branch whose values are streamed.
    #[must_use]
    pub fn branch(&self) -> usize {
        self.branch
    }

    /// Returns `true` once the stream has seen the end of its branch.
    #[must_use]
    pub fn stream_done(&self) -> bool {
        self.stream_done && self.diverted.is_none()
    }

    /// Next value of the streamed branch.
    pub(crate) fn next_streamed(&mut self) -> Option<Result<Tuple>> {
        if let Some(diverted) = self.diverted.as_mut() {
            return diverted.next();
        }
        if self.stream_done {
            return None;
        }
        match self.pull() {
            Some(Ok(pair)) if pair.index() == self.branch => Some(Ok(pair.into_tuple())),
            Some(Ok(pair)) => {
                self.pending = Some(pair);
                self.stream_done = true;
                None
            }
            Some(Err(err)) => {
                self.stream_done = true;
                Some(Err(err))
            }
            None => {
                self.stream_done = true;
                None
            }
        }
    }

    /// Takes everything the stream has not consumed: the parked pair, then
    /// the rest of the source.
    pub(crate) fn take_rest(&mut self) -> IndexTupleSource {
        self.stream_done = true;
        let pending = self.pending.take().map(Ok);
        if self.exhausted {
            return source_from(pending);
        }
        self.exhausted = true;
        let source = std::mem::replace(&mut self.source, Box::new(std::iter::empty()));
        Box::new(pending.into_iter().chain(source))
    }

    /// Continues the stream from `rest` instead of the source.
    pub(crate) fn divert(&mut self, rest: TupleIter) {
        self.diverted = Some(rest);
    }

    fn pull(&mut self) -> Option<Result<IndexTuple>> {
        if let Some(pending) = self.pending.take() {
            return Some(Ok(pending));
        }
        if self.exhausted {
            return None;
        }
        let next = self.source.next();
        if next.is_none() {
            self.exhausted = true;
        }
        next
    }
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("branch", &self.branch)
            .field("pending", &self.pending)
            .field("exhausted", &self.exhausted)
            .field("stream_done", &self.stream_done)
            .field("diverted", &self.diverted.is_some())
            .finish()
    }
}

/// Live iterator over a streamed branch.
pub(crate) struct StreamIter {
    head: Option<Tuple>,
    upstream: SharedUpstream,
}

impl StreamIter {
    pub(crate) fn new(head: Tuple, upstream: SharedUpstream) -> Self {
        Self {
            head: Some(head),
            upstream,
        }
    }
}

impl Iterator for StreamIter {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(head) = self.head.take() {
            return Some(Ok(head));
        }
        self.upstream.lock().next_streamed()
    }
}
