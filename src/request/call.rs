//! Closure-backed request with a one-shot response channel
//!
//! `send` on the worker returns as soon as the entry is queued, so a caller
//! that needs the outcome keeps the [`ResponseHandle`] returned alongside the
//! request and waits on it.

use crate::queue::Priority;
use crate::request::{Request, RequestError};
use tokio::sync::oneshot;

type Call<T> = Box<dyn FnOnce() -> Result<T, RequestError> + Send>;
type Reply<T> = oneshot::Sender<Result<T, RequestError>>;

/// Request running a closure and publishing its result
pub struct CallRequest<T> {
    name: String,
    priority: Priority,
    call: Option<Call<T>>,
    reply: Option<Reply<T>>,
}

impl<T: Send + 'static> CallRequest<T> {
    /// Create a request and the handle its result is delivered to
    pub fn new<F>(name: impl Into<String>, call: F) -> (Self, ResponseHandle<T>)
    where
        F: FnOnce() -> Result<T, RequestError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let request = Self {
            name: name.into(),
            priority: Priority::default(),
            call: Some(Box::new(call)),
            reply: Some(tx),
        };
        (request, ResponseHandle { rx })
    }

    /// Set the priority class
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    fn reply(&mut self, result: Result<T, RequestError>) {
        if let Some(tx) = self.reply.take() {
            // The caller may have dropped its handle; nobody is left to tell.
            let _ = tx.send(result);
        }
    }
}

impl<T: Send + 'static> Request for CallRequest<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn process(&mut self) -> Result<(), RequestError> {
        let call = self
            .call
            .take()
            .ok_or_else(|| RequestError::Failed(format!("'{}' was already processed", self.name)))?;

        let value = call()?;
        self.reply(Ok(value));
        Ok(())
    }

    fn on_error(&mut self, error: RequestError) {
        self.reply(Err(error));
    }
}

impl<T> std::fmt::Debug for CallRequest<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallRequest")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("pending", &self.call.is_some())
            .finish()
    }
}

/// Receiving end of a [`CallRequest`]
///
/// A request dropped without being processed resolves to
/// [`RequestError::Discarded`].
#[derive(Debug)]
pub struct ResponseHandle<T> {
    rx: oneshot::Receiver<Result<T, RequestError>>,
}

impl<T> ResponseHandle<T> {
    /// Block the current thread until the request has an outcome.
    ///
    /// Must not be called from inside an async runtime; use [`Self::recv`]
    /// there.
    pub fn wait(self) -> Result<T, RequestError> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(RequestError::Discarded))
    }

    /// Wait for the outcome asynchronously
    pub async fn recv(self) -> Result<T, RequestError> {
        self.rx.await.unwrap_or(Err(RequestError::Discarded))
    }

    /// Take the outcome if it is already available
    pub fn try_take(&mut self) -> Option<Result<T, RequestError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(RequestError::Discarded)),
        }
    }
}
