//! Ordered, fixed-arity value sequences.

use std::fmt;
use std::sync::Arc;

use super::Value;

/// An ordered sequence of [`Value`]s.
///
/// Tuples are immutable once built and cheap to clone, so the same row can be
/// replayed by several join branches without copying. They compare and hash
/// by value and serve both as payload and as grouping key.
///
/// # Examples
///
/// ```
/// use spillway_common::tuple;
/// use spillway_common::types::Value;
///
/// let t = tuple!["a", 1i64, tuple!["inner"]];
/// assert_eq!(t.len(), 3);
/// assert_eq!(t.get(0), Some(&Value::from("a")));
/// assert_eq!(t.print(), "['a', 1, ['inner']]");
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Tuple(Arc<[Value]>);

impl Tuple {
    /// Creates a tuple from owned values.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values.into())
    }

    /// Creates a tuple with no elements.
    #[must_use]
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    /// Creates a tuple of `len` nulls.
    #[must_use]
    pub fn nulls(len: usize) -> Self {
        Self::new(vec![Value::Null; len])
    }

    /// Returns the number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the tuple has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the element at `pos`.
    #[must_use]
    pub fn get(&self, pos: usize) -> Option<&Value> {
        self.0.get(pos)
    }

    /// Returns the element at `pos` as an integer.
    #[must_use]
    pub fn get_int64(&self, pos: usize) -> Option<i64> {
        self.get(pos).and_then(Value::as_int64)
    }

    /// Returns the element at `pos` as a string slice.
    #[must_use]
    pub fn get_str(&self, pos: usize) -> Option<&str> {
        self.get(pos).and_then(Value::as_str)
    }

    /// Returns the elements as a slice.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Iterates over the elements.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    /// Returns a new tuple with `other`'s elements appended.
    #[must_use]
    pub fn append(&self, other: &Tuple) -> Tuple {
        self.iter().chain(other.iter()).cloned().collect()
    }

    /// Rough in-memory footprint in bytes.
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.iter().map(Value::estimated_size).sum::<usize>()
    }

    /// Renders the tuple for log messages, e.g. `['a', 1]`.
    #[must_use]
    pub fn print(&self) -> String {
        self.to_string()
    }
}

impl Default for Tuple {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl<'a> IntoIterator for &'a Tuple {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

/// Builds a [`Tuple`] from values convertible into [`Value`].
#[macro_export]
macro_rules! tuple {
    ($($value:expr),* $(,)?) => {
        $crate::types::Tuple::new(vec![$($crate::types::Value::from($value)),*])
    };
}
