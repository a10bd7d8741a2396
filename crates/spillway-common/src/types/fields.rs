//! Field selectors.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use super::Tuple;
use crate::utils::error::{Error, Result};

/// Selects tuple positions that make up a key (or payload) for one branch.
///
/// Positions are always present; names are optional and only used when
/// rendering the selector in log messages.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Fields {
    /// Selected positions, in key order.
    positions: SmallVec<[usize; 4]>,
    /// Optional names, parallel to `positions`.
    names: Option<SmallVec<[Arc<str>; 4]>>,
}

impl Fields {
    /// Creates an unnamed selector over the given positions.
    pub fn positions(positions: impl IntoIterator<Item = usize>) -> Self {
        Self {
            positions: positions.into_iter().collect(),
            names: None,
        }
    }

    /// Creates a named selector from `(name, position)` pairs.
    pub fn named<S: Into<Arc<str>>>(fields: impl IntoIterator<Item = (S, usize)>) -> Self {
        let mut positions = SmallVec::new();
        let mut names = SmallVec::new();
        for (name, pos) in fields {
            names.push(name.into());
            positions.push(pos);
        }
        Self {
            positions,
            names: Some(names),
        }
    }

    /// Returns the number of selected fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if no field is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns the selected positions.
    #[must_use]
    pub fn as_positions(&self) -> &[usize] {
        &self.positions
    }

    /// Projects the selected positions out of `tuple`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldOutOfRange`] if a position exceeds the tuple's arity.
    pub fn select(&self, tuple: &Tuple) -> Result<Tuple> {
        self.positions
            .iter()
            .map(|&pos| {
                tuple.get(pos).cloned().ok_or(Error::FieldOutOfRange {
                    pos,
                    arity: tuple.len(),
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Tuple::new)
    }

    /// Renders names (when present) and positions, e.g. `['id', 'name' | 0, 2]`.
    #[must_use]
    pub fn print_verbose(&self) -> String {
        let positions = join(self.positions.iter());
        match &self.names {
            Some(names) => {
                let names = join(names.iter().map(|n| format!("'{n}'")));
                format!("[{names} | {positions}]")
            }
            None => format!("[{positions}]"),
        }
    }
}

fn join<T: fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Debug for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fields{}", self.print_verbose())
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.names {
            Some(names) => write!(f, "[{}]", join(names.iter().map(|n| format!("'{n}'")))),
            None => write!(f, "[{}]", join(self.positions.iter())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple;
    use crate::types::Value;

    #[test]
    fn test_select() {
        let fields = Fields::positions([2, 0]);
        let key = fields.select(&tuple!["a", "b", "c"]).unwrap();
        assert_eq!(key, tuple!["c", "a"]);
    }

    #[test]
    fn test_select_out_of_range() {
        let fields = Fields::positions([5]);
        let err = fields.select(&tuple!["a"]).unwrap_err();
        assert!(matches!(err, Error::FieldOutOfRange { pos: 5, arity: 1 }));
    }

    #[test]
    fn test_print() {
        let fields = Fields::named([("id", 0), ("name", 2)]);
        assert_eq!(fields.print_verbose(), "['id', 'name' | 0, 2]");
        assert_eq!(fields.to_string(), "['id', 'name']");
        assert_eq!(Fields::positions([1]).print_verbose(), "[1]");
    }

    proptest::proptest! {
        #[test]
        fn test_select_projects_in_order(
            values in proptest::collection::vec(proptest::num::i64::ANY, 1..12),
            picks in proptest::collection::vec(proptest::num::usize::ANY, 0..6),
        ) {
            let tuple: Tuple = values.iter().copied().map(Value::from).collect();
            let positions: Vec<usize> = picks.iter().map(|p| p % values.len()).collect();
            let key = Fields::positions(positions.iter().copied()).select(&tuple).unwrap();

            proptest::prop_assert_eq!(key.len(), positions.len());
            for (i, &pos) in positions.iter().enumerate() {
                proptest::prop_assert_eq!(key.get(i), tuple.get(pos));
            }
        }
    }
}
