//! Spill counters.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;
use spillway_core::spill::{ReadSpillEvent, SpillListener, WriteSpillEvent};

/// Counter group used for spill counters.
pub const SPILL_COUNTER_GROUP: &str = "spillway.spill";

/// Well-known spill counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpillCounter {
    /// Segments written.
    SpillsWritten,
    /// Segments read back.
    SpillsRead,
    /// Tuples written to segments.
    TuplesSpilled,
}

impl SpillCounter {
    /// Counter group.
    #[must_use]
    pub const fn group(self) -> &'static str {
        SPILL_COUNTER_GROUP
    }

    /// Counter name within its group.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SpillsWritten => "spills_written",
            Self::SpillsRead => "spills_read",
            Self::TuplesSpilled => "tuples_spilled",
        }
    }
}

impl fmt::Display for SpillCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group(), self.name())
    }
}

/// Thread-safe named counters, grouped by `(group, name)`.
#[derive(Debug, Default)]
pub struct Counters {
    values: RwLock<HashMap<(String, String), u64>>,
}

impl Counters {
    /// Creates an empty set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` to the counter `group`/`name`.
    pub fn increment(&self, group: &str, name: &str, amount: u64) {
        let mut values = self.values.write();
        *values
            .entry((group.to_string(), name.to_string()))
            .or_insert(0) += amount;
    }

    /// Adds `amount` to a well-known counter.
    pub fn increment_counter(&self, counter: SpillCounter, amount: u64) {
        self.increment(counter.group(), counter.name(), amount);
    }

    /// Current value of `group`/`name`, zero if never incremented.
    #[must_use]
    pub fn get(&self, group: &str, name: &str) -> u64 {
        self.values
            .read()
            .get(&(group.to_string(), name.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Current value of a well-known counter.
    #[must_use]
    pub fn counter(&self, counter: SpillCounter) -> u64 {
        self.get(counter.group(), counter.name())
    }

    /// All counters, sorted by group and name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, String, u64)> {
        let mut all: Vec<_> = self
            .values
            .read()
            .iter()
            .map(|((group, name), value)| (group.clone(), name.clone(), *value))
            .collect();
        all.sort();
        all
    }
}

/// Spill listener that feeds [`Counters`] and logs spills.
pub struct CountingSpillListener {
    counters: Arc<Counters>,
    log_interval: usize,
}

impl CountingSpillListener {
    /// Counts into `counters`, logging every `log_interval`-th spill of a list
    /// at `info`.
    #[must_use]
    pub fn new(counters: Arc<Counters>, log_interval: usize) -> Self {
        Self {
            counters,
            log_interval: log_interval.max(1),
        }
    }
}

impl SpillListener for CountingSpillListener {
    fn on_write_spill(&self, event: &WriteSpillEvent<'_>) -> anyhow::Result<()> {
        tracing::debug!(
            list = event.list,
            tuples = event.tuples,
            spill = event.spill_count,
            "spilling tuples"
        );
        if event.spill_count.saturating_sub(1) % self.log_interval == 0 {
            tracing::info!(
                list = event.list,
                spill = event.spill_count,
                reason = %event.reason,
                "spill written"
            );
        }

        self.counters.increment_counter(SpillCounter::SpillsWritten, 1);
        self.counters
            .increment_counter(SpillCounter::TuplesSpilled, event.tuples as u64);
        Ok(())
    }

    fn on_read_spill(&self, event: &ReadSpillEvent<'_>) -> anyhow::Result<()> {
        tracing::debug!(list = event.list, segment = event.segment, "reading spilled tuples");
        self.counters.increment_counter(SpillCounter::SpillsRead, 1);
        Ok(())
    }
}

impl fmt::Debug for CountingSpillListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingSpillListener")
            .field("log_interval", &self.log_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spillway_core::spill::SpillReason;

    #[test]
    fn test_counters_accumulate() {
        let counters = Counters::new();
        counters.increment("g", "a", 2);
        counters.increment("g", "a", 3);
        counters.increment("g", "b", 1);

        assert_eq!(counters.get("g", "a"), 5);
        assert_eq!(counters.get("g", "missing"), 0);
        assert_eq!(
            counters.snapshot(),
            vec![
                ("g".to_string(), "a".to_string(), 5),
                ("g".to_string(), "b".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_listener_counts_events() {
        let counters = Arc::new(Counters::new());
        let listener = CountingSpillListener::new(Arc::clone(&counters), 10);

        for spill_count in 1..=3 {
            listener
                .on_write_spill(&WriteSpillEvent {
                    list: "['k']",
                    tuples: 100,
                    estimated_bytes: 4096,
                    spill_count,
                    reason: SpillReason::TupleCount,
                })
                .unwrap();
        }
        listener
            .on_read_spill(&ReadSpillEvent {
                list: "['k']",
                segment: 0,
                tuples: 100,
            })
            .unwrap();

        assert_eq!(counters.counter(SpillCounter::SpillsWritten), 3);
        assert_eq!(counters.counter(SpillCounter::TuplesSpilled), 300);
        assert_eq!(counters.counter(SpillCounter::SpillsRead), 1);
    }

    #[test]
    fn test_counter_display() {
        assert_eq!(
            SpillCounter::TuplesSpilled.to_string(),
            "spillway.spill.tuples_spilled"
        );
    }
}
