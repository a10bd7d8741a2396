//! Join gates: per-key partitioning of branch-tagged values.
//!
//! For every distinct key the grouping layer hands a gate the key and the
//! key's `(branch, tuple)` pairs. The gate partitions them into one
//! collection per branch; the join operator downstream then asks for
//! per-branch traversals and emptiness checks to build its output.
//!
//! Two implementations share the [`JoinGate`] capability:
//!
//! - [`CoGroupGate`] - one [`SpillableTupleList`](crate::spill::SpillableTupleList)
//!   per branch, with a streaming fast path for branch 0
//! - [`MemoryJoinGate`] - plain in-memory collections keyed by join key
//!
//! With `num_self_joins = S`, slots `0..=S` alias one physical collection, so
//! every slot replays identical rows.

mod cogroup;
mod memory;

pub use cogroup::{CoGroupGate, DEFAULT_SPILL_LOG_INTERVAL};
pub use memory::MemoryJoinGate;

use spillway_common::types::Tuple;
use spillway_common::utils::error::{GateError, Result};

use crate::spill::IndexTupleSource;

/// A traversal of one branch for the active key.
pub type TupleStream = Box<dyn Iterator<Item = Result<Tuple>> + Send>;

/// Partitions one key's values into per-branch collections.
///
/// `reset` is the only state transition: it discards the previous key and
/// builds the next. Between resets `iter` and `is_empty` may be called any
/// number of times, in any order.
pub trait JoinGate: Send {
    /// Discards the previous key's state and partitions `values` for
    /// `grouping`.
    ///
    /// # Errors
    ///
    /// Returns upstream failures, branch indexes outside the gate, and spill
    /// failures. A failed build leaves the gate unusable.
    fn reset(&mut self, grouping: Tuple, values: IndexTupleSource) -> Result<()>;

    /// Number of branch slots.
    fn size(&self) -> usize;

    /// Returns a traversal of branch `pos` for the active key.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidPosition`] if `pos >= size()`.
    fn iter(&mut self, pos: usize) -> Result<TupleStream>;

    /// Returns `true` if no value for the active key arrived on branch `pos`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::InvalidPosition`] if `pos >= size()`.
    fn is_empty(&mut self, pos: usize) -> Result<bool>;

    /// The active key, if any.
    fn grouping(&self) -> Option<&Tuple>;
}

/// Slot to physical collection mapping with self-join aliasing.
///
/// Slots `1..=num_self_joins` share collection 0; every other slot has its
/// own collection.
pub(crate) fn slot_layout(num_pipes: usize, num_self_joins: usize) -> (Vec<usize>, usize) {
    let physical = num_pipes.max(1);
    let size = num_pipes.max(num_self_joins + 1);
    let slots = (0..size)
        .map(|pos| if pos <= num_self_joins { 0 } else { pos })
        .collect();
    (slots, physical)
}

pub(crate) fn check_position(pos: usize, size: usize) -> std::result::Result<(), GateError> {
    if pos < size {
        Ok(())
    } else {
        Err(GateError::InvalidPosition { pos, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_layout_without_self_joins() {
        let (slots, physical) = slot_layout(3, 0);
        assert_eq!(slots, vec![0, 1, 2]);
        assert_eq!(physical, 3);
    }

    #[test]
    fn test_slot_layout_aliases_self_joins() {
        let (slots, physical) = slot_layout(1, 2);
        assert_eq!(slots, vec![0, 0, 0]);
        assert_eq!(physical, 1);
    }

    #[test]
    fn test_check_position() {
        assert!(check_position(1, 2).is_ok());
        assert!(matches!(
            check_position(2, 2),
            Err(GateError::InvalidPosition { pos: 2, size: 2 })
        ));
    }
}
