//! Spill-backed co-group gate.

use std::sync::Arc;

use spillway_common::types::{Fields, IndexTuple, Tuple};
use spillway_common::utils::error::{GateError, Result};

use super::{JoinGate, TupleStream, check_position, slot_layout};
use crate::spill::{DetachedStream, IndexTupleSource, SharedUpstream, SpillableTupleList, Upstream};

/// Every this many spills of one branch, the gate logs at `info`.
pub const DEFAULT_SPILL_LOG_INTERVAL: usize = 10;

/// Join gate holding one [`SpillableTupleList`] per branch.
///
/// With no self-joins and branch 0 arriving first, branch 0 is not copied:
/// the still-open upstream is installed as its source and read lazily. The
/// remaining branches are routed into their lists the first time one of them
/// is requested. If branch 0's stream is open at that point, its unread
/// values move to an overflow list the stream continues from.
///
/// Upstream must deliver each key's values contiguous by branch, branch 0
/// first. This is not verified.
///
/// A failed build poisons the gate; every later call returns
/// [`GateError::Poisoned`].
pub struct CoGroupGate {
    num_self_joins: usize,
    grouping_fields: Vec<Fields>,
    lists: Vec<SpillableTupleList>,
    slots: Vec<usize>,
    grouping: Option<Tuple>,
    upstream: Option<SharedUpstream>,
    log_interval: usize,
    poisoned: bool,
}

impl CoGroupGate {
    /// Creates a gate for `grouping_fields.len()` branches, building each
    /// branch list from `prototype`'s configuration.
    #[must_use]
    pub fn new(
        num_self_joins: usize,
        grouping_fields: Vec<Fields>,
        prototype: &SpillableTupleList,
    ) -> Self {
        let (slots, physical) = slot_layout(grouping_fields.len(), num_self_joins);
        let lists = (0..physical).map(|_| prototype.fork_empty()).collect();
        Self {
            num_self_joins,
            grouping_fields,
            lists,
            slots,
            grouping: None,
            upstream: None,
            log_interval: DEFAULT_SPILL_LOG_INTERVAL,
            poisoned: false,
        }
    }

    /// Sets how many spills of a branch pass between `info` logs.
    #[must_use]
    pub fn with_log_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval.max(1);
        self
    }

    /// Number of self-joins on branch 0.
    #[must_use]
    pub fn num_self_joins(&self) -> usize {
        self.num_self_joins
    }

    /// Returns `true` once a build has failed.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Number of spills of the list behind slot `pos` for the active key.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidPosition`] if `pos >= size()`.
    pub fn spill_count(&self, pos: usize) -> Result<usize> {
        check_position(pos, self.size())?;
        Ok(self.lists[self.slots[pos]].spill_count())
    }

    fn build(&mut self, mut values: IndexTupleSource) -> Result<()> {
        let Some(first) = values.next().transpose()? else {
            return Ok(());
        };

        if self.num_self_joins == 0 && first.index() == 0 {
            let upstream = Upstream::shared(values, 0);
            self.lists[0].set_iterator(first, Arc::clone(&upstream));
            self.upstream = Some(upstream);
            return Ok(());
        }

        self.route(first)?;
        for item in values {
            self.route(item?)?;
        }
        Ok(())
    }

    fn route(&mut self, pair: IndexTuple) -> Result<()> {
        let (pos, tuple) = pair.into_parts();
        check_position(pos, self.size())?;
        self.add(pos, tuple)
    }

    fn add(&mut self, pos: usize, tuple: Tuple) -> Result<()> {
        let list = &mut self.lists[self.slots[pos]];
        if !list.add(tuple)? {
            return Ok(());
        }

        let spills = list.spill_count();
        if (spills - 1) % self.log_interval == 0 {
            let group = self
                .grouping_fields
                .get(pos)
                .map_or_else(|| format!("#{pos}"), Fields::print_verbose);
            let grouping = self.grouping.as_ref().map(Tuple::print).unwrap_or_default();
            tracing::info!(group = %group, grouping = %grouping, spills, "spilled group");
        }
        Ok(())
    }

    /// Routes whatever the branch-0 stream has not consumed.
    fn settle(&mut self) -> Result<()> {
        let Some(upstream) = self.upstream.take() else {
            return Ok(());
        };
        let rest = upstream.lock().take_rest();

        match self.lists[0].detach_stream() {
            Some(DetachedStream::Unopened { head }) => {
                self.add(0, head)?;
                for item in rest {
                    self.route(item?)?;
                }
            }
            Some(DetachedStream::Open) | None => {
                let mut overflow = self.lists[0].fork_empty();
                for item in rest {
                    let pair = item?;
                    if pair.index() == 0 {
                        overflow.add(pair.into_tuple())?;
                    } else {
                        self.route(pair)?;
                    }
                }
                if !overflow.is_empty() {
                    tracing::debug!(
                        grouping = %overflow.description(),
                        tuples = overflow.len(),
                        "diverted open branch stream"
                    );
                }
                upstream.lock().divert(overflow.iter()?);
            }
        }
        Ok(())
    }

    fn guard(&self, pos: usize) -> Result<usize> {
        if self.poisoned {
            return Err(GateError::Poisoned.into());
        }
        check_position(pos, self.size())?;
        if self.grouping.is_none() {
            return Err(GateError::NoActiveKey.into());
        }
        Ok(self.slots[pos])
    }

    fn poison_on_err<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            self.poisoned = true;
            tracing::warn!(
                grouping = %self.grouping.as_ref().map(Tuple::print).unwrap_or_default(),
                error = %err,
                "co-group build failed, gate poisoned"
            );
        }
        result
    }
}

impl JoinGate for CoGroupGate {
    fn reset(&mut self, grouping: Tuple, values: IndexTupleSource) -> Result<()> {
        if self.poisoned {
            return Err(GateError::Poisoned.into());
        }
        self.upstream = None;
        for list in &mut self.lists {
            list.clear();
            list.set_grouping(&grouping);
        }
        self.grouping = Some(grouping);

        let result = self.build(values);
        self.poison_on_err(result)
    }

    fn size(&self) -> usize {
        self.slots.len()
    }

    fn iter(&mut self, pos: usize) -> Result<TupleStream> {
        let list = self.guard(pos)?;
        if list != 0 {
            let settled = self.settle();
            self.poison_on_err(settled)?;
        }
        let iter = self.lists[list].iter()?;
        Ok(Box::new(iter))
    }

    fn is_empty(&mut self, pos: usize) -> Result<bool> {
        let list = self.guard(pos)?;
        if list != 0 {
            let settled = self.settle();
            self.poison_on_err(settled)?;
        }
        Ok(self.lists[list].is_empty())
    }

    fn grouping(&self) -> Option<&Tuple> {
        self.grouping.as_ref()
    }
}

impl std::fmt::Debug for CoGroupGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoGroupGate")
            .field("size", &self.slots.len())
            .field("num_self_joins", &self.num_self_joins)
            .field("grouping", &self.grouping)
            .field("streaming", &self.upstream.is_some())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}
