//! Execution configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use spillway_common::utils::error::{Error, Result};
use spillway_core::codec::TokenRegistry;
use spillway_core::gate::DEFAULT_SPILL_LOG_INTERVAL;
use spillway_core::spill::SpillThreshold;

/// Property holding the tuple-count spill threshold.
pub const SPILL_THRESHOLD_PROPERTY: &str = "spillway.cogroup.spill.threshold";
/// Property holding the byte-size spill threshold.
pub const SPILL_BYTES_PROPERTY: &str = "spillway.cogroup.spill.bytes";
/// Property holding the spill directory.
pub const SPILL_DIR_PROPERTY: &str = "spillway.spill.dir";
/// Property holding the `token=TypeName,...` list.
pub const SERIALIZATION_TOKENS_PROPERTY: &str = "spillway.serialization.tokens";
/// Property holding the spill log interval.
pub const SPILL_LOG_INTERVAL_PROPERTY: &str = "spillway.spill.log.interval";

/// Configuration for one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// When branch lists spill.
    pub spill_threshold: SpillThreshold,

    /// Directory for spill files (None for the system temp directory).
    pub spill_dir: Option<PathBuf>,

    /// Keep spilled segments in memory instead of files.
    pub memory_spill: bool,

    /// Type tokens registered for this execution.
    pub serialization_tokens: Vec<(u32, String)>,

    /// Spills of one branch between `info` logs.
    pub spill_log_interval: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spill_threshold: SpillThreshold::default(),
            spill_dir: None,
            memory_spill: false,
            serialization_tokens: Vec::new(),
            spill_log_interval: DEFAULT_SPILL_LOG_INTERVAL,
        }
    }
}

impl Config {
    /// Configuration that keeps spilled segments in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            memory_spill: true,
            ..Default::default()
        }
    }

    /// Configuration that spills to files under `dir`.
    #[must_use]
    pub fn with_spill_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(dir.into());
        self.memory_spill = false;
        self
    }

    /// Sets the spill threshold.
    #[must_use]
    pub fn with_spill_threshold(mut self, threshold: SpillThreshold) -> Self {
        self.spill_threshold = threshold;
        self
    }

    /// Registers `type_name` under `token`.
    #[must_use]
    pub fn with_token(mut self, token: u32, type_name: impl Into<String>) -> Self {
        self.serialization_tokens.push((token, type_name.into()));
        self
    }

    /// Sets how many spills of a branch pass between `info` logs.
    #[must_use]
    pub fn with_spill_log_interval(mut self, interval: usize) -> Self {
        self.spill_log_interval = interval;
        self
    }

    /// Builds a configuration from string properties.
    ///
    /// Unknown keys are ignored so the full property set of a job can be
    /// passed in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unparsable values, or when both a tuple
    /// and a byte threshold are given.
    ///
    /// # Examples
    ///
    /// ```
    /// use spillway_engine::Config;
    /// use spillway_core::spill::SpillThreshold;
    ///
    /// let config = Config::from_properties([
    ///     ("spillway.cogroup.spill.threshold", "500"),
    ///     ("spillway.serialization.tokens", "1000=BooleanFlag,10001=Text"),
    /// ])
    /// .unwrap();
    ///
    /// assert_eq!(config.spill_threshold, SpillThreshold::Tuples(500));
    /// assert_eq!(config.serialization_tokens.len(), 2);
    /// ```
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        let mut tuples = None;
        let mut bytes = None;

        for (key, value) in properties {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                SPILL_THRESHOLD_PROPERTY => tuples = Some(parse_usize(key, value)?),
                SPILL_BYTES_PROPERTY => bytes = Some(parse_usize(key, value)?),
                SPILL_DIR_PROPERTY => config.spill_dir = Some(PathBuf::from(value)),
                SERIALIZATION_TOKENS_PROPERTY => {
                    let tokens = TokenRegistry::parse(value)
                        .map_err(|e| Error::Config(format!("{key}: {e}")))?;
                    config.serialization_tokens.extend(
                        tokens.iter().map(|(token, name)| (token, name.to_string())),
                    );
                }
                SPILL_LOG_INTERVAL_PROPERTY => {
                    config.spill_log_interval = parse_usize(key, value)?;
                }
                _ => {}
            }
        }

        config.spill_threshold = match (tuples, bytes) {
            (Some(_), Some(_)) => {
                return Err(Error::Config(format!(
                    "{SPILL_THRESHOLD_PROPERTY} and {SPILL_BYTES_PROPERTY} are mutually exclusive"
                )));
            }
            (Some(n), None) => SpillThreshold::Tuples(n),
            (None, Some(n)) => SpillThreshold::Bytes(n),
            (None, None) => SpillThreshold::default(),
        };
        Ok(config)
    }
}

fn parse_usize(key: &str, value: &str) -> Result<usize> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("{key}: expected a non-negative integer, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.spill_threshold, SpillThreshold::Tuples(10_000));
        assert_eq!(config.spill_log_interval, 10);
        assert!(!config.memory_spill);
        assert!(Config::in_memory().memory_spill);
    }

    #[test]
    fn test_builders() {
        let config = Config::in_memory()
            .with_spill_threshold(SpillThreshold::Bytes(4096))
            .with_token(1000, "BooleanFlag")
            .with_spill_dir("/var/tmp/spill");
        assert_eq!(config.spill_threshold, SpillThreshold::Bytes(4096));
        assert_eq!(config.serialization_tokens, vec![(1000, "BooleanFlag".to_string())]);
        assert!(!config.memory_spill);
    }

    #[test]
    fn test_from_properties() {
        let config = Config::from_properties([
            ("spillway.cogroup.spill.bytes", " 65536 "),
            ("spillway.spill.dir", "/tmp/x"),
            ("spillway.spill.log.interval", "5"),
            ("mapred.job.name", "ignored"),
        ])
        .unwrap();
        assert_eq!(config.spill_threshold, SpillThreshold::Bytes(65536));
        assert_eq!(config.spill_dir, Some(PathBuf::from("/tmp/x")));
        assert_eq!(config.spill_log_interval, 5);
    }

    #[test]
    fn test_from_properties_rejects_bad_values() {
        let bad = [
            vec![("spillway.cogroup.spill.threshold", "lots")],
            vec![("spillway.serialization.tokens", "1000")],
            vec![
                ("spillway.cogroup.spill.threshold", "10"),
                ("spillway.cogroup.spill.bytes", "10"),
            ],
        ];
        for props in bad {
            assert!(matches!(Config::from_properties(props), Err(Error::Config(_))));
        }
    }
}
