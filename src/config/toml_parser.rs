//! TOML configuration file parser
//!
//! The file carries a single `[worker]` table; every key is optional.

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// TOML configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Worker settings
    #[serde(default)]
    pub worker: TomlWorkerConfig,
}

/// TOML worker table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlWorkerConfig {
    /// Worker name
    pub name: Option<String>,

    /// Shutdown wait in milliseconds
    pub thread_timeout_ms: Option<u64>,

    /// Queue capacity
    pub queue_capacity: Option<usize>,
}

impl TomlConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            WorkerError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml)
            .map_err(|e| WorkerError::Config(format!("Failed to parse TOML config: {}", e)))
    }
}

impl From<TomlConfig> for WorkerConfig {
    fn from(toml: TomlConfig) -> Self {
        let defaults = WorkerConfig::default();
        let worker = toml.worker;

        WorkerConfig {
            name: worker.name.unwrap_or(defaults.name),
            thread_timeout_ms: worker
                .thread_timeout_ms
                .unwrap_or(defaults.thread_timeout_ms),
            queue_capacity: worker.queue_capacity,
        }
    }
}
