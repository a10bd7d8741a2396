//! # spillway-common
//!
//! Foundation layer for Spillway: tuple types, field selectors and errors.
//!
//! This crate provides the data model shared by every other Spillway crate.
//! It has no internal dependencies and should be kept minimal.
//!
//! ## Modules
//!
//! - [`types`] - Core type definitions (Value, Tuple, Fields, IndexTuple)
//! - [`utils`] - Utility functions and helpers (errors)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod types;
pub mod utils;

// Re-export commonly used types at crate root
pub use types::{Fields, IndexTuple, Object, ObjectType, ObjectValue, Tuple, Value};
pub use utils::error::{Error, Result};
