//! Ungrouped merge of branch streams.

use std::collections::VecDeque;

use spillway_common::types::Tuple;
use spillway_common::utils::error::{GateError, Result};
use spillway_core::gate::{JoinGate, TupleStream};

/// Concatenates branch streams of identical arity, branch by branch.
///
/// The arity of the first tuple sets the arity of the merge; a tuple of any
/// other arity ends the stream with [`GateError::ArityMismatch`].
pub struct MergeStream {
    branches: VecDeque<(usize, TupleStream)>,
    arity: Option<usize>,
    done: bool,
}

impl MergeStream {
    /// Merges `branches` in order.
    #[must_use]
    pub fn new(branches: Vec<TupleStream>) -> Self {
        Self {
            branches: branches.into_iter().enumerate().collect(),
            arity: None,
            done: false,
        }
    }

    /// Merges every branch of `gate` for its active key.
    ///
    /// # Errors
    ///
    /// Returns the gate's error if a branch cannot be traversed.
    pub fn from_gate(gate: &mut dyn JoinGate) -> Result<Self> {
        let branches = (0..gate.size())
            .map(|pos| gate.iter(pos))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(branches))
    }

    fn check_arity(&mut self, branch: usize, tuple: &Tuple) -> Result<()> {
        match self.arity {
            None => {
                self.arity = Some(tuple.len());
                Ok(())
            }
            Some(expected) if expected == tuple.len() => Ok(()),
            Some(expected) => Err(GateError::ArityMismatch {
                branch,
                expected,
                found: tuple.len(),
            }
            .into()),
        }
    }
}

impl Iterator for MergeStream {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some((branch, stream)) = self.branches.front_mut() else {
                self.done = true;
                break;
            };
            let branch = *branch;
            match stream.next() {
                Some(Ok(tuple)) => {
                    if let Err(err) = self.check_arity(branch, &tuple) {
                        self.done = true;
                        return Some(Err(err));
                    }
                    return Some(Ok(tuple));
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.branches.pop_front();
                }
            }
        }
        None
    }
}
