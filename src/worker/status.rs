//! Status snapshots and the sink they are reported to

use crate::error::Result;
use crate::worker::WorkerState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Diagnostic snapshot emitted on `REPORT_STATUS`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Worker name
    pub worker: String,
    /// Lifecycle state
    pub state: WorkerState,
    /// Whether the worker thread is alive
    pub alive: bool,
    /// Entries waiting in the queue
    pub queue_depth: usize,
    /// Requests processed successfully
    pub processed: u64,
    /// Requests whose processing failed or panicked
    pub failed: u64,
    /// Entries dropped unprocessed (cleared or abandoned)
    pub discarded: u64,
}

impl StatusReport {
    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Receiver of status snapshots
#[cfg_attr(test, mockall::automock)]
pub trait StatusSink: Send + Sync {
    /// Record one snapshot
    fn report(&self, status: &StatusReport);
}

/// Sink writing snapshots to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn report(&self, status: &StatusReport) {
        info!(
            "Worker '{}' status: state={}, alive={}, queue_depth={}, processed={}, failed={}, discarded={}",
            status.worker,
            status.state,
            status.alive,
            status.queue_depth,
            status.processed,
            status.failed,
            status.discarded
        );
    }
}

/// Request counters kept by the worker thread
#[derive(Debug, Default)]
pub(crate) struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl WorkerStats {
    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, count: usize) {
        self.discarded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub(crate) fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}
