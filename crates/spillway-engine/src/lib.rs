//! # spillway-engine
//!
//! Per-execution wiring for Spillway.
//!
//! An execution builds one [`FlowProcess`] from a [`Config`] and a
//! serialization builder, then asks it for spillable lists and join gates.
//! Every list it creates reports spills to the execution's [`Counters`].
//!
//! ## Modules
//!
//! - [`config`] - Execution configuration and property parsing
//! - [`flow`] - The [`FlowProcess`] context and its factories
//! - [`merge`] - [`MergeStream`], the ungrouped concatenation of branches
//! - [`metrics`] - Spill counters and the counting listener

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod flow;
pub mod merge;
pub mod metrics;

pub use config::Config;
pub use flow::FlowProcess;
pub use merge::MergeStream;
pub use metrics::{Counters, CountingSpillListener, SpillCounter};

// Re-export the lower layers
pub use spillway_common::{Error, Result};
pub use spillway_core::gate::{CoGroupGate, JoinGate, MemoryJoinGate};
