//! Spill notifications.

use std::fmt;

/// Why a list wrote a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpillReason {
    /// The buffered tuple count reached the threshold.
    TupleCount,
    /// The buffered byte estimate reached the threshold.
    ByteSize,
    /// A streamed branch was materialized so other branches could be served.
    Materialize,
}

impl fmt::Display for SpillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TupleCount => write!(f, "tuple count threshold"),
            Self::ByteSize => write!(f, "byte size threshold"),
            Self::Materialize => write!(f, "materialized stream"),
        }
    }
}

/// A segment is about to be written.
#[derive(Debug, Clone)]
pub struct WriteSpillEvent<'a> {
    /// Description of the list that spills, typically its grouping key.
    pub list: &'a str,
    /// Number of tuples going into the segment.
    pub tuples: usize,
    /// Estimated in-memory size of those tuples.
    pub estimated_bytes: usize,
    /// Number of segments the list will hold once this write succeeds.
    pub spill_count: usize,
    /// Why the segment was written.
    pub reason: SpillReason,
}

/// A segment is about to be read back.
#[derive(Debug, Clone)]
pub struct ReadSpillEvent<'a> {
    /// Description of the list being read.
    pub list: &'a str,
    /// Zero-based segment number.
    pub segment: usize,
    /// Number of tuples the segment holds.
    pub tuples: usize,
}

/// Receives spill notifications.
///
/// Failures are logged and otherwise ignored: a listener can never fail the
/// spill it observes.
pub trait SpillListener: Send + Sync {
    /// Called before a segment is written.
    ///
    /// # Errors
    ///
    /// Any error is logged and dropped by the caller.
    fn on_write_spill(&self, event: &WriteSpillEvent<'_>) -> anyhow::Result<()>;

    /// Called before a segment is read back.
    ///
    /// # Errors
    ///
    /// Any error is logged and dropped by the caller.
    fn on_read_spill(&self, event: &ReadSpillEvent<'_>) -> anyhow::Result<()>;
}

/// Listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSpillListener;

impl SpillListener for NoopSpillListener {
    fn on_write_spill(&self, _event: &WriteSpillEvent<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_read_spill(&self, _event: &ReadSpillEvent<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

pub(crate) fn notify_write(listener: Option<&dyn SpillListener>, event: &WriteSpillEvent<'_>) {
    if let Some(listener) = listener
        && let Err(err) = listener.on_write_spill(event)
    {
        tracing::warn!(list = event.list, error = %err, "spill write listener failed");
    }
}

pub(crate) fn notify_read(listener: Option<&dyn SpillListener>, event: &ReadSpillEvent<'_>) {
    if let Some(listener) = listener
        && let Err(err) = listener.on_read_spill(event)
    {
        tracing::warn!(list = event.list, error = %err, "spill read listener failed");
    }
}
