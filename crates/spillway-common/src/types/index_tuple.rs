//! Branch-tagged tuples.

use std::fmt;

use super::Tuple;

/// A value tuple tagged with the branch it belongs to.
///
/// This is the unit the grouping layer hands to a join gate: for each key it
/// yields a run of `IndexTuple`s, contiguous by branch.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct IndexTuple {
    index: usize,
    tuple: Tuple,
}

impl IndexTuple {
    /// Creates a tagged tuple.
    #[must_use]
    pub fn new(index: usize, tuple: Tuple) -> Self {
        Self { index, tuple }
    }

    /// Returns the branch index.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the value tuple.
    #[must_use]
    pub fn tuple(&self) -> &Tuple {
        &self.tuple
    }

    /// Consumes the pair, returning the value tuple.
    #[must_use]
    pub fn into_tuple(self) -> Tuple {
        self.tuple
    }

    /// Consumes the pair, returning `(index, tuple)`.
    #[must_use]
    pub fn into_parts(self) -> (usize, Tuple) {
        (self.index, self.tuple)
    }
}

impl fmt::Debug for IndexTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:?}", self.index, self.tuple)
    }
}

impl From<(usize, Tuple)> for IndexTuple {
    fn from((index, tuple): (usize, Tuple)) -> Self {
        Self::new(index, tuple)
    }
}
