//! Common utilities used throughout Spillway.
//!
//! - [`error`] - Error types like [`Error`] and [`CodecError`](error::CodecError)

pub mod error;

pub use error::{Error, Result};
