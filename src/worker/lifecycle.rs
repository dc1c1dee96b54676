//! Worker lifecycle state and the shutdown rendezvous

use crate::error::{Result, WorkerError};
use serde::{Deserialize, Serialize};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Worker lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Constructed, thread not spawned yet
    NotStarted,
    /// Thread is pulling from the queue
    Running,
    /// A stop command has been dequeued
    Stopping,
    /// Thread has exited; terminal
    Stopped,
}

impl WorkerState {
    /// Check if the worker thread is pulling entries
    pub fn is_running(&self) -> bool {
        matches!(self, WorkerState::Running)
    }

    /// Check if the worker can be started
    pub fn can_start(&self) -> bool {
        matches!(self, WorkerState::NotStarted)
    }

    /// Check if the worker reached its terminal state
    pub fn is_stopped(&self) -> bool {
        matches!(self, WorkerState::Stopped)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::NotStarted => write!(f, "not_started"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Stopping => write!(f, "stopping"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Lifecycle flag plus the condition variable stop callers wait on
pub(crate) struct Lifecycle {
    state: Mutex<WorkerState>,
    changed: Condvar,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState::NotStarted),
            changed: Condvar::new(),
        }
    }

    // Nothing panics while holding this lock, so a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> WorkerState {
        *self.lock()
    }

    /// NotStarted -> Running
    pub(crate) fn begin(&self) -> Result<()> {
        let mut state = self.lock();
        if !state.can_start() {
            return Err(WorkerError::InvalidState(format!(
                "Cannot start worker in state: {}",
                *state
            )));
        }
        *state = WorkerState::Running;
        Ok(())
    }

    /// Undo `begin` when the thread could not be spawned
    pub(crate) fn abort_start(&self) {
        let mut state = self.lock();
        if state.is_running() {
            *state = WorkerState::NotStarted;
        }
    }

    /// Running -> Stopping
    pub(crate) fn begin_stopping(&self) {
        let mut state = self.lock();
        if state.is_running() {
            *state = WorkerState::Stopping;
        }
    }

    /// Any -> Stopped, waking every waiter
    pub(crate) fn finish(&self) {
        *self.lock() = WorkerState::Stopped;
        self.changed.notify_all();
    }

    /// Wait up to `timeout` for the worker to reach `Stopped`
    pub(crate) fn wait_stopped(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (state, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |state| !state.is_stopped())
            .unwrap_or_else(PoisonError::into_inner);
        state.is_stopped()
    }
}
