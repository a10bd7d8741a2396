//! User-defined tuple elements.
//!
//! Anything that is not a built-in [`Value`](super::Value) variant travels
//! through tuples as an [`ObjectValue`]: a shared, type-erased handle that
//! still compares and hashes by value and can be downcast back to its concrete
//! type. The codec dispatches on [`Object::type_name`].

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A type-erased tuple element.
///
/// Implemented automatically for every [`ObjectType`]; implement it by hand
/// only when the type name has to be computed at runtime.
pub trait Object: Any + Send + Sync + fmt::Debug {
    /// Stable name used for serializer lookup and token registration.
    fn type_name(&self) -> &str;

    /// Upcast for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Value equality against another object of any type.
    fn dyn_eq(&self, other: &dyn Object) -> bool;

    /// Feeds this value into a hasher.
    fn dyn_hash(&self, state: &mut dyn Hasher);

    /// Rough in-memory footprint in bytes, used for size-based spill thresholds.
    fn estimated_size(&self) -> usize {
        16
    }
}

/// A concrete element type with a fixed name.
///
/// ```
/// use spillway_common::types::{ObjectType, ObjectValue};
///
/// #[derive(Debug, PartialEq, Eq, Hash)]
/// struct Flag(bool);
///
/// impl ObjectType for Flag {
///     const TYPE_NAME: &'static str = "Flag";
/// }
///
/// let value = ObjectValue::new(Flag(true));
/// assert_eq!(value.type_name(), "Flag");
/// assert_eq!(value.downcast_ref::<Flag>(), Some(&Flag(true)));
/// ```
pub trait ObjectType: Any + Send + Sync + fmt::Debug + Eq + Hash {
    /// Stable type name.
    const TYPE_NAME: &'static str;
}

impl<T: ObjectType> Object for T {
    fn type_name(&self) -> &str {
        T::TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Object) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|o| o == self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state);
    }

    fn estimated_size(&self) -> usize {
        std::mem::size_of::<T>()
    }
}

/// Shared handle to an [`Object`], cheap to clone.
#[derive(Clone)]
pub struct ObjectValue(Arc<dyn Object>);

impl ObjectValue {
    /// Wraps a value.
    pub fn new<T: Object>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wraps an already shared value.
    #[must_use]
    pub fn from_arc(value: Arc<dyn Object>) -> Self {
        Self(value)
    }

    /// Returns the type name of the wrapped value.
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.0.type_name()
    }

    /// Returns the wrapped value as `T`, if it is one.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    /// Returns the wrapped trait object.
    #[must_use]
    pub fn as_object(&self) -> &dyn Object {
        &*self.0
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.dyn_eq(&*other.0)
    }
}

impl Eq for ObjectValue {}

impl Hash for ObjectValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.type_name().hash(state);
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}
