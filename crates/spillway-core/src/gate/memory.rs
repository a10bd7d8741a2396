//! In-memory join gate.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use spillway_common::types::{Fields, IndexTuple, Tuple};
use spillway_common::utils::error::{GateError, Result};

use super::{JoinGate, TupleStream, check_position, slot_layout};
use crate::spill::IndexTupleSource;

/// Join gate that keeps every branch in memory.
///
/// Values can be fed two ways. [`accumulate`](Self::accumulate) files a pair
/// under the key its branch's key fields select, for joins that see all input
/// before emitting anything; [`reset`](JoinGate::reset) then activates one
/// key. `reset` also partitions the values it is given, which are appended
/// after any accumulated for the same key.
///
/// There is no threshold and no listener: use this gate only when memory
/// bounds the workload.
#[derive(Debug)]
pub struct MemoryJoinGate {
    key_fields: Vec<Fields>,
    slots: Vec<usize>,
    values: Vec<HashMap<Tuple, Vec<Tuple>>>,
    keys: HashSet<Tuple>,
    key_order: Vec<Tuple>,
    grouping: Option<Tuple>,
    active: Vec<Arc<Vec<Tuple>>>,
}

impl MemoryJoinGate {
    /// Creates a gate for `key_fields.len()` branches.
    #[must_use]
    pub fn new(num_self_joins: usize, key_fields: Vec<Fields>) -> Self {
        let (slots, physical) = slot_layout(key_fields.len(), num_self_joins);
        Self {
            key_fields,
            slots,
            values: (0..physical).map(|_| HashMap::new()).collect(),
            keys: HashSet::new(),
            key_order: Vec::new(),
            grouping: None,
            active: Vec::new(),
        }
    }

    /// Files `pair` under the key selected from its tuple.
    ///
    /// # Errors
    ///
    /// Fails if the branch is outside the gate or the key fields do not fit
    /// the tuple.
    pub fn accumulate(&mut self, pair: IndexTuple) -> Result<()> {
        let (pos, tuple) = pair.into_parts();
        check_position(pos, self.slots.len())?;
        let list = self.slots[pos];

        let key = match self.key_fields.get(list) {
            Some(fields) => fields.select(&tuple)?,
            None => tuple.clone(),
        };
        if self.keys.insert(key.clone()) {
            self.key_order.push(key.clone());
        }
        self.values[list].entry(key).or_default().push(tuple);
        Ok(())
    }

    /// Distinct accumulated keys in first-seen order.
    pub fn keys(&self) -> impl Iterator<Item = &Tuple> {
        self.key_order.iter()
    }

    /// Number of distinct accumulated keys.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Drops all accumulated values and the active key.
    pub fn clear(&mut self) {
        for values in &mut self.values {
            values.clear();
        }
        self.keys.clear();
        self.key_order.clear();
        self.grouping = None;
        self.active.clear();
    }

    fn active_slot(&self, pos: usize) -> Result<&Arc<Vec<Tuple>>> {
        check_position(pos, self.slots.len())?;
        if self.grouping.is_none() {
            return Err(GateError::NoActiveKey.into());
        }
        Ok(&self.active[self.slots[pos]])
    }
}

impl JoinGate for MemoryJoinGate {
    fn reset(&mut self, grouping: Tuple, values: IndexTupleSource) -> Result<()> {
        self.grouping = None;
        let mut current: Vec<Vec<Tuple>> = self
            .values
            .iter()
            .map(|by_key| by_key.get(&grouping).cloned().unwrap_or_default())
            .collect();

        for item in values {
            let (pos, tuple) = item?.into_parts();
            check_position(pos, self.slots.len())?;
            current[self.slots[pos]].push(tuple);
        }

        self.active = current.into_iter().map(Arc::new).collect();
        self.grouping = Some(grouping);
        Ok(())
    }

    fn size(&self) -> usize {
        self.slots.len()
    }

    fn iter(&mut self, pos: usize) -> Result<TupleStream> {
        let values = Arc::clone(self.active_slot(pos)?);
        Ok(Box::new(SharedValues { values, next: 0 }))
    }

    fn is_empty(&mut self, pos: usize) -> Result<bool> {
        Ok(self.active_slot(pos)?.is_empty())
    }

    fn grouping(&self) -> Option<&Tuple> {
        self.grouping.as_ref()
    }
}

struct SharedValues {
    values: Arc<Vec<Tuple>>,
    next: usize,
}

impl Iterator for SharedValues {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        let tuple = self.values.get(self.next)?.clone();
        self.next += 1;
        Some(Ok(tuple))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.values.len() - self.next;
        (remaining, Some(remaining))
    }
}
