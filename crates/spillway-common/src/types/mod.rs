//! Core type definitions for Spillway.
//!
//! This module contains the data model that flows through the execution core:
//! - Values ([`Value`], [`ObjectValue`])
//! - Tuples ([`Tuple`], [`IndexTuple`])
//! - Field selectors ([`Fields`])

mod fields;
mod index_tuple;
mod object;
mod tuple;
mod value;

pub use fields::Fields;
pub use index_tuple::IndexTuple;
pub use object::{Object, ObjectType, ObjectValue};
pub use tuple::Tuple;
pub use value::Value;
