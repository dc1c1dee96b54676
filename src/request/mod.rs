//! Request items consumed by the worker
//!
//! A request is an opaque unit of work produced outside the worker. The
//! worker only reads its priority, calls [`Request::process`] once, and hands
//! any failure back through [`Request::on_error`]; it never looks at the
//! payload.

mod call;

pub use call::{CallRequest, ResponseHandle};

use crate::queue::Priority;
use thiserror::Error;

/// Failure of a single request, isolated from the worker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The call itself reported a failure
    #[error("Request failed: {0}")]
    Failed(String),

    /// The request panicked while being processed
    #[error("Request panicked: {0}")]
    Panicked(String),

    /// The request was dropped unprocessed (queue cleared or worker stopped)
    #[error("Request discarded before processing")]
    Discarded,
}

/// Unit of work the worker can process
pub trait Request: Send {
    /// Name used in diagnostics
    fn name(&self) -> &str {
        "request"
    }

    /// Priority class of the request
    fn priority(&self) -> Priority {
        Priority::Medium
    }

    /// Perform the call
    fn process(&mut self) -> Result<(), RequestError>;

    /// Receive the failure of `process` (including panics)
    fn on_error(&mut self, error: RequestError) {
        let _ = error;
    }
}
