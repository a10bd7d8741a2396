//! Per-execution context.

use std::sync::Arc;

use spillway_common::types::Fields;
use spillway_common::utils::error::Result;
use spillway_core::codec::{Serialization, SerializationBuilder, TupleCodec};
use spillway_core::gate::{CoGroupGate, MemoryJoinGate};
use spillway_core::spill::{
    FileSpillStorage, MemorySpillStorage, SpillListener, SpillStorage, SpillableTupleList,
};

use crate::config::Config;
use crate::metrics::{Counters, CountingSpillListener, SpillCounter};

/// Everything one execution shares: configuration, the frozen serialization
/// registry, spill storage and counters.
///
/// # Examples
///
/// ```
/// use spillway_common::{Fields, tuple};
/// use spillway_core::codec::Serialization;
/// use spillway_core::gate::JoinGate;
/// use spillway_core::spill::source_from_pairs;
/// use spillway_engine::{Config, FlowProcess};
///
/// let flow = FlowProcess::new(Config::in_memory(), Serialization::builder()).unwrap();
/// let mut gate = flow.cogroup_gate(0, vec![Fields::positions([0]), Fields::positions([0])]);
///
/// let input = vec![(0, tuple!["K", 1i64]), (1, tuple!["K", 2i64])];
/// gate.reset(tuple!["K"], source_from_pairs(input)).unwrap();
/// assert!(!gate.is_empty(1).unwrap());
/// ```
pub struct FlowProcess {
    config: Config,
    serialization: Arc<Serialization>,
    storage: Arc<dyn SpillStorage>,
    counters: Arc<Counters>,
    listener: Arc<dyn SpillListener>,
}

impl FlowProcess {
    /// Freezes `serialization` with the configured tokens and opens spill
    /// storage.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the registrations conflict, or an I/O error if
    /// the spill directory cannot be created.
    pub fn new(config: Config, serialization: SerializationBuilder) -> Result<Self> {
        let serialization = config
            .serialization_tokens
            .iter()
            .fold(serialization, |builder, (token, name)| {
                builder.token(*token, name.clone())
            })
            .build()?;

        let storage: Arc<dyn SpillStorage> = if config.memory_spill {
            Arc::new(MemorySpillStorage::new())
        } else if let Some(dir) = &config.spill_dir {
            Arc::new(FileSpillStorage::new(dir)?)
        } else {
            Arc::new(FileSpillStorage::in_temp_dir())
        };

        let counters = Arc::new(Counters::new());
        let listener = Arc::new(CountingSpillListener::new(
            Arc::clone(&counters),
            config.spill_log_interval,
        ));

        tracing::debug!(
            threshold = ?config.spill_threshold,
            storage = ?storage,
            tokens = serialization.tokens().len(),
            "flow process ready"
        );

        Ok(Self {
            config,
            serialization: Arc::new(serialization),
            storage,
            counters,
            listener,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the frozen serialization registry.
    #[must_use]
    pub fn serialization(&self) -> &Arc<Serialization> {
        &self.serialization
    }

    /// Returns the spill storage.
    #[must_use]
    pub fn storage(&self) -> &Arc<dyn SpillStorage> {
        &self.storage
    }

    /// Returns a codec over this execution's registry.
    #[must_use]
    pub fn codec(&self) -> TupleCodec {
        TupleCodec::new(Arc::clone(&self.serialization))
    }

    /// Creates an empty list wired to this execution's threshold, storage
    /// and counters.
    #[must_use]
    pub fn create_spillable_list(&self) -> SpillableTupleList {
        SpillableTupleList::new(
            self.config.spill_threshold,
            self.codec(),
            Arc::clone(&self.storage),
        )
        .with_listener(Arc::clone(&self.listener))
    }

    /// Creates a spill-backed gate for `grouping_fields.len()` branches.
    #[must_use]
    pub fn cogroup_gate(&self, num_self_joins: usize, grouping_fields: Vec<Fields>) -> CoGroupGate {
        CoGroupGate::new(num_self_joins, grouping_fields, &self.create_spillable_list())
            .with_log_interval(self.config.spill_log_interval)
    }

    /// Creates an in-memory gate for `key_fields.len()` branches.
    #[must_use]
    pub fn memory_gate(&self, num_self_joins: usize, key_fields: Vec<Fields>) -> MemoryJoinGate {
        MemoryJoinGate::new(num_self_joins, key_fields)
    }

    /// Adds `amount` to a spill counter.
    pub fn increment(&self, counter: SpillCounter, amount: u64) {
        self.counters.increment_counter(counter, amount);
    }

    /// Returns the counters.
    #[must_use]
    pub fn counters(&self) -> &Arc<Counters> {
        &self.counters
    }
}

impl std::fmt::Debug for FlowProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowProcess")
            .field("config", &self.config)
            .field("serialization", &self.serialization)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
