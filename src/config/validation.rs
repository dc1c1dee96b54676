//! Configuration validation functions

use crate::error::{Result, WorkerError};
use std::time::Duration;

/// Longest accepted worker name
pub const MAX_NAME_LEN: usize = 64;

/// Upper bound for the shutdown wait
pub const MAX_THREAD_TIMEOUT: Duration = Duration::from_secs(3600);

/// Validate worker name (alphanumeric, '_' and '-', max 64 chars)
pub fn validate_worker_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(WorkerError::Config(
            "Worker name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(WorkerError::Config(format!(
            "Worker name '{}' exceeds maximum length of {} characters",
            name, MAX_NAME_LEN
        )));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(WorkerError::Config(format!(
            "Worker name '{}' contains invalid characters (only alphanumeric, '_', and '-' allowed)",
            name
        )));
    }

    Ok(())
}

/// Validate the shutdown wait (1 ms to 1 hour)
pub fn validate_thread_timeout(timeout: Duration) -> Result<()> {
    if timeout < Duration::from_millis(1) || timeout > MAX_THREAD_TIMEOUT {
        return Err(WorkerError::Config(format!(
            "Thread timeout {:?} is out of valid range (1ms-{:?})",
            timeout, MAX_THREAD_TIMEOUT
        )));
    }
    Ok(())
}

/// Validate queue capacity
pub fn validate_queue_capacity(capacity: usize) -> Result<()> {
    if capacity == 0 {
        return Err(WorkerError::Config(
            "Queue capacity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
