//! api-worker: background worker for outbound API calls
//!
//! This library serializes outbound API requests and out-of-band control
//! commands through one priority-ordered queue, consumed by a single
//! background thread.
//!
//! # Architecture
//!
//! Producer threads [`send`](worker::ApiWorker::send) requests or control
//! commands; the worker thread dequeues them by priority (FIFO among equal
//! priorities) and either processes the request or executes the command.
//! Control commands can clear pending work, report status, or stop the worker
//! gracefully or immediately.
//!
//! # Modules
//!
//! - `config`: Worker configuration (TOML) and validation
//! - `queue`: Priorities, control commands and the shared priority queue
//! - `request`: The request capability consumed by the worker
//! - `worker`: The background worker, its lifecycle and status reporting
//! - `error`: Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod queue;
pub mod request;
pub mod worker;

// Re-export commonly used types
pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use queue::{ControlCommand, Prioritized, Priority, QueueItem, TaskQueue};
pub use request::{CallRequest, Request, RequestError, ResponseHandle};
pub use worker::{ApiWorker, StatusReport, StatusSink, TracingSink, WorkerState};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
