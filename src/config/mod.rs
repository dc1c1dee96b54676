//! Configuration management
//!
//! This module holds the construction-time settings of a worker: its
//! diagnostic name, the bounded wait used by `stop`/`stop_immediate`, and an
//! optional queue capacity. Settings can be built in code or loaded from a
//! TOML file with a `[worker]` table.

mod toml_parser;
mod validation;

pub use toml_parser::TomlConfig;
pub use validation::{validate_queue_capacity, validate_thread_timeout, validate_worker_name};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default worker name used in thread names and log lines
pub const DEFAULT_WORKER_NAME: &str = "APIWorker";

/// Default time callers wait for the worker thread to terminate
pub const DEFAULT_THREAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Worker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Human-readable name for diagnostics
    #[serde(default = "default_name")]
    pub name: String,

    /// How long `stop`/`stop_immediate` wait for the thread, in milliseconds
    #[serde(default = "default_thread_timeout_ms")]
    pub thread_timeout_ms: u64,

    /// Maximum number of queued entries; unbounded when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
}

impl WorkerConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self {
            name: default_name(),
            thread_timeout_ms: default_thread_timeout_ms(),
            queue_capacity: None,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let toml_config = TomlConfig::from_file(path)?;
        let config: WorkerConfig = toml_config.into();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse(toml: &str) -> Result<Self> {
        let config: WorkerConfig = TomlConfig::parse(toml)?.into();
        config.validate()?;
        Ok(config)
    }

    /// Set the worker name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the bounded shutdown wait
    pub fn with_thread_timeout(mut self, timeout: Duration) -> Self {
        self.thread_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// Bound the queue to `capacity` entries
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Bounded shutdown wait as a `Duration`
    pub fn thread_timeout(&self) -> Duration {
        Duration::from_millis(self.thread_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_worker_name(&self.name)?;
        validate_thread_timeout(self.thread_timeout())?;
        if let Some(capacity) = self.queue_capacity {
            validate_queue_capacity(capacity)?;
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_name() -> String {
    DEFAULT_WORKER_NAME.to_string()
}

fn default_thread_timeout_ms() -> u64 {
    DEFAULT_THREAD_TIMEOUT.as_millis() as u64
}
