//! Configuration for aostore
//!
//! Centralized configuration with sensible defaults. An engine can be
//! configured either through [`ConfigBuilder`] or from the flat key/value
//! option form via [`Config::from_options`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AoError, Result};

/// Main configuration for an aostore engine instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Keep every map purely in memory. Suppresses the id-recovery scan and
    /// directory creation even when `storage_name` is set.
    pub in_memory: bool,

    /// Base directory holding one artifact per persisted map:
    ///   {storage_name}/
    ///     ├── orders-5.db
    ///     └── items-3.db
    pub storage_name: Option<PathBuf>,

    /// What to do with an artifact whose id suffix does not parse
    pub recovery_policy: RecoveryPolicy,

    // -------------------------------------------------------------------------
    // Background Configuration
    // -------------------------------------------------------------------------
    /// Wait between two scheduler ticks
    pub background_interval: Duration,

    /// Percentage above which a read- or write-dominant adaptive map switches mode
    pub adaptive_threshold: u32,

    /// Worker threads in the engine's own merge pool (0 = available parallelism)
    pub merge_workers: usize,

    // -------------------------------------------------------------------------
    // Pass-through Options
    // -------------------------------------------------------------------------
    /// Unrecognized options, copied into every map's configuration
    pub options: HashMap<String, String>,
}

/// Policy for artifacts with a malformed id suffix during startup recovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryPolicy {
    /// Fail engine startup on the first malformed name
    #[default]
    Abort,

    /// Log and ignore the malformed artifact
    Skip,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            in_memory: false,
            storage_name: None,
            recovery_policy: RecoveryPolicy::Abort,
            background_interval: Duration::from_millis(1000),
            adaptive_threshold: 50,
            merge_workers: 0,
            options: HashMap::new(),
        }
    }
}

impl Config {
    const IN_MEMORY: &'static str = "inMemory";
    const STORAGE_NAME: &'static str = "storageName";
    const BACKGROUND_INTERVAL: &'static str = "backgroundInterval";
    const ADAPTIVE_THRESHOLD: &'static str = "adaptiveThreshold";
    const MERGE_WORKERS: &'static str = "mergeWorkers";
    const RECOVERY_POLICY: &'static str = "recoveryPolicy";

    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Build a config from the flat key/value option form.
    ///
    /// The presence of `inMemory` turns on in-memory mode regardless of its
    /// value. Keys that aren't recognized end up in [`Config::options`].
    pub fn from_options<I, K, V>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut config = Config::default();

        for (key, value) in options {
            let key = key.into();
            let value = value.into();

            match key.as_str() {
                Self::IN_MEMORY => config.in_memory = true,
                Self::STORAGE_NAME => config.storage_name = Some(PathBuf::from(value)),
                Self::BACKGROUND_INTERVAL => {
                    let ms = parse_number::<u64>(&key, &value)?;
                    config.background_interval = Duration::from_millis(ms);
                }
                Self::ADAPTIVE_THRESHOLD => {
                    config.adaptive_threshold = parse_number(&key, &value)?;
                }
                Self::MERGE_WORKERS => config.merge_workers = parse_number(&key, &value)?,
                Self::RECOVERY_POLICY => {
                    config.recovery_policy = match value.to_ascii_lowercase().as_str() {
                        "abort" => RecoveryPolicy::Abort,
                        "skip" => RecoveryPolicy::Skip,
                        other => {
                            return Err(AoError::Config(format!(
                                "unknown recovery policy {other:?} (expected abort or skip)"
                            )))
                        }
                    };
                }
                _ => {
                    config.options.insert(key, value);
                }
            }
        }

        Ok(config)
    }

    /// Directory maps persist into, if this engine persists at all
    pub fn storage_dir(&self) -> Option<&PathBuf> {
        if self.in_memory {
            None
        } else {
            self.storage_name.as_ref()
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AoError::Config(format!("option {key}={value:?}: {e}")))
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Keep all maps in memory (no recovery scan, no artifacts)
    pub fn in_memory(mut self, in_memory: bool) -> Self {
        self.config.in_memory = in_memory;
        self
    }

    /// Set the storage directory
    pub fn storage_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_name = Some(path.into());
        self
    }

    /// Set the policy for malformed artifact names
    pub fn recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.config.recovery_policy = policy;
        self
    }

    /// Set the wait between scheduler ticks
    pub fn background_interval(mut self, interval: Duration) -> Self {
        self.config.background_interval = interval;
        self
    }

    /// Set the adaptive switch threshold (percent)
    pub fn adaptive_threshold(mut self, percent: u32) -> Self {
        self.config.adaptive_threshold = percent;
        self
    }

    /// Set the number of merge worker threads
    pub fn merge_workers(mut self, count: usize) -> Self {
        self.config.merge_workers = count;
        self
    }

    /// Add a pass-through option handed to every map builder
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.options.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
