//! Background API worker
//!
//! [`ApiWorker`] owns one background thread that pulls entries from a shared
//! [`TaskQueue`] in priority order. Requests are processed one at a time;
//! control commands clear the queue, report status, or stop the worker.
//!
//! # Shutdown
//!
//! - [`ApiWorker::stop`] enqueues `STOP` at the lowest request priority, so
//!   everything already queued is processed before the thread exits. Once
//!   `STOP` is dequeued the queue closes; entries sent after it are dropped.
//! - [`ApiWorker::stop_immediate`] enqueues `STOP_IMMEDIATE`, which is dequeued
//!   next whatever the queue depth. A request already being processed is
//!   allowed to finish; nothing queued behind it is processed.
//!
//! Both block for at most the configured thread timeout.

mod lifecycle;
mod status;

pub use lifecycle::WorkerState;
pub use status::{StatusReport, StatusSink, TracingSink};

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::queue::{ControlCommand, Entry, QueueItem, TaskQueue};
use crate::request::{Request, RequestError};
use lifecycle::Lifecycle;
use status::WorkerStats;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Whether the monitor loop keeps pulling entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// State shared with the worker thread
struct Shared {
    name: String,
    queue: Arc<TaskQueue>,
    lifecycle: Lifecycle,
    stats: WorkerStats,
    sink: Arc<dyn StatusSink>,
}

/// Background worker serializing requests and control commands
pub struct ApiWorker {
    shared: Arc<Shared>,
    config: WorkerConfig,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ApiWorker {
    /// Bind a worker to a (possibly pre-populated) queue without starting it
    pub fn new(queue: Arc<TaskQueue>, config: WorkerConfig) -> Self {
        Self::with_sink(queue, config, Arc::new(TracingSink))
    }

    /// Bind a worker to a queue, reporting status to `sink`
    pub fn with_sink(
        queue: Arc<TaskQueue>,
        config: WorkerConfig,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: config.name.clone(),
                queue,
                lifecycle: Lifecycle::new(),
                stats: WorkerStats::default(),
                sink,
            }),
            config,
            thread: Mutex::new(None),
        }
    }

    /// Validate `config` and create a worker with its own queue
    pub fn from_config(config: WorkerConfig) -> Result<Self> {
        config.validate()?;
        let queue = Arc::new(TaskQueue::with_capacity(config.queue_capacity));
        Ok(Self::new(queue, config))
    }

    /// Worker name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Worker configuration
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Queue the worker pulls from
    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.shared.queue
    }

    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        self.shared.lifecycle.state()
    }

    /// Snapshot of the worker as seen from the caller
    pub fn status(&self) -> StatusReport {
        self.shared.snapshot(self.is_alive())
    }

    /// Spawn the background thread.
    ///
    /// Fails with [`WorkerError::InvalidState`] if the worker was already
    /// started; a stopped worker cannot be restarted.
    pub fn start(&self) -> Result<()> {
        self.config.validate()?;
        self.shared.lifecycle.begin()?;

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(self.shared.name.clone())
            .spawn(move || shared.run());

        match spawned {
            Ok(handle) => {
                *self.thread_slot() = Some(handle);
                info!("Worker '{}' started", self.name());
                Ok(())
            }
            Err(e) => {
                self.shared.lifecycle.abort_start();
                error!("Failed to spawn worker '{}': {}", self.name(), e);
                Err(WorkerError::Io(e))
            }
        }
    }

    /// Enqueue a command or request and return its sequence number.
    ///
    /// Returns as soon as the entry is queued. Fails with
    /// [`WorkerError::Stopped`] once the worker has stopped.
    pub fn send(&self, item: impl Into<QueueItem>) -> Result<u64> {
        if self.state().is_stopped() {
            return Err(WorkerError::Stopped);
        }

        let item = item.into();
        if let QueueItem::Command(cmd) = &item {
            debug!("Worker '{}' received command {}", self.name(), cmd);
        }
        self.shared.queue.push(item)
    }

    /// Enqueue a request
    pub fn send_request<R: Request + 'static>(&self, request: R) -> Result<u64> {
        self.send(QueueItem::request(request))
    }

    /// Check if the background thread exists and has not terminated
    pub fn is_alive(&self) -> bool {
        self.thread_slot()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop after processing everything already queued.
    ///
    /// Returns [`WorkerError::Timeout`] if the thread is still running when
    /// the thread timeout elapses; `is_alive` can be checked again later.
    /// Calling it on a worker that is not running does nothing.
    pub fn stop(&self) -> Result<()> {
        self.perform_stop(ControlCommand::Stop)
    }

    /// Stop without processing queued entries
    pub fn stop_immediate(&self) -> Result<()> {
        self.perform_stop(ControlCommand::StopImmediate)
    }

    fn perform_stop(&self, command: ControlCommand) -> Result<()> {
        if !self.is_alive() {
            debug!("Worker '{}' is not running; {} ignored", self.name(), command);
            self.reap();
            return Ok(());
        }

        match self.shared.queue.push(command) {
            Ok(_) => {}
            // Another caller already shut the queue; wait for the same exit.
            Err(WorkerError::Stopped) => {}
            Err(e) => return Err(e),
        }

        // Waiting on ourselves would only ever time out.
        if self.on_worker_thread() {
            return Ok(());
        }

        let timeout = self.config.thread_timeout();
        if !self.shared.lifecycle.wait_stopped(timeout) {
            warn!(
                "Worker '{}' did not stop within {:?} after {}",
                self.name(),
                timeout,
                command
            );
            return Err(WorkerError::Timeout(format!(
                "worker '{}' still running {:?} after {}",
                self.name(),
                timeout,
                command
            )));
        }

        self.reap();
        info!("Worker '{}' stopped ({})", self.name(), command);
        Ok(())
    }

    fn thread_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.thread.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_worker_thread(&self) -> bool {
        self.thread_slot()
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }

    /// Join the thread once it has exited (or is about to)
    fn reap(&self) {
        let mut slot = self.thread_slot();
        let exiting = slot.as_ref().is_some_and(|handle| {
            handle.is_finished() || self.shared.lifecycle.state().is_stopped()
        });
        if !exiting {
            return;
        }

        if let Some(handle) = slot.take() {
            if handle.join().is_err() {
                error!("Worker '{}' thread panicked", self.name());
            }
        }
    }
}

impl Drop for ApiWorker {
    fn drop(&mut self) {
        // Detach: queued work still flushes in the background.
        if self.is_alive() {
            if let Err(e) = self.shared.queue.push(ControlCommand::Stop) {
                debug!("Worker '{}' dropped while shutting down: {}", self.name(), e);
            }
        }
    }
}

impl std::fmt::Debug for ApiWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiWorker")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("queue", &self.shared.queue)
            .finish()
    }
}

/// Marks the lifecycle stopped when the worker thread exits, however it exits
struct ExitGuard<'a>(&'a Shared);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.lifecycle.finish();
        info!("Worker '{}' thread exited", self.0.name);
    }
}

impl Shared {
    fn run(&self) {
        let _exit = ExitGuard(self);
        debug!("Worker '{}' monitor loop running", self.name);

        if let Err(e) = self.monitor() {
            error!("Worker '{}' terminated: {}", self.name, e);
        }
    }

    fn monitor(&self) -> Result<()> {
        while let Some(entry) = self.queue.pop()? {
            let sequence = entry.sequence();
            match entry.into_item() {
                QueueItem::Request(request) => self.dispatch_request(request),
                QueueItem::Command(command) => {
                    if self.execute(command, sequence)? == Flow::Exit {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Run a control command dequeued with the given sequence number
    fn execute(&self, command: ControlCommand, sequence: u64) -> Result<Flow> {
        match command {
            ControlCommand::Nop => {
                debug!("Worker '{}' NOP", self.name);
                Ok(Flow::Continue)
            }
            ControlCommand::ClearQueue => {
                let removed = self.queue.clear()?;
                self.stats.record_discarded(removed.len());
                info!("Worker '{}' cleared {} queued entries", self.name, removed.len());
                Ok(Flow::Continue)
            }
            ControlCommand::ReportStatus => {
                self.report_status();
                Ok(Flow::Continue)
            }
            ControlCommand::Stop => {
                self.lifecycle.begin_stopping();
                info!("Worker '{}' draining queue before stop", self.name);
                self.drain(sequence)?;
                Ok(Flow::Exit)
            }
            ControlCommand::StopImmediate => {
                self.lifecycle.begin_stopping();
                self.abandon()?;
                Ok(Flow::Exit)
            }
        }
    }

    /// Close the queue, process what was enqueued ahead of the stop command
    /// and drop whatever was sent after it.
    fn drain(&self, stop_sequence: u64) -> Result<()> {
        let (ahead, behind): (Vec<Entry>, Vec<Entry>) = self
            .queue
            .close()?
            .into_iter()
            .partition(|entry| entry.sequence() < stop_sequence);

        // Extra stop commands from concurrent callers are not lost work.
        let mut discarded = behind.iter().filter(|entry| !entry.item().is_stop_cmd()).count();
        let total = ahead.len();
        for (index, entry) in ahead.into_iter().enumerate() {
            if self.drain_entry(entry)? == Flow::Exit {
                discarded += total - index - 1;
                break;
            }
        }

        if discarded > 0 {
            warn!(
                "Worker '{}' discarded {} entries while stopping",
                self.name, discarded
            );
        }
        self.stats.record_discarded(discarded);
        Ok(())
    }

    fn drain_entry(&self, entry: Entry) -> Result<Flow> {
        let sequence = entry.sequence();
        match entry.into_item() {
            QueueItem::Request(request) => {
                self.dispatch_request(request);
                Ok(Flow::Continue)
            }
            QueueItem::Command(ControlCommand::Stop) => Ok(Flow::Continue),
            QueueItem::Command(command) => self.execute(command, sequence),
        }
    }

    /// Close the queue and drop whatever is left
    fn abandon(&self) -> Result<()> {
        let remaining = self.queue.close()?;
        if !remaining.is_empty() {
            warn!(
                "Worker '{}' abandoned {} queued entries",
                self.name,
                remaining.len()
            );
        }
        self.stats.record_discarded(remaining.len());
        Ok(())
    }

    fn dispatch_request(&self, mut request: Box<dyn Request>) {
        match panic::catch_unwind(AssertUnwindSafe(|| request.process())) {
            Ok(Ok(())) => {
                self.stats.record_processed();
                debug!("Request '{}' processed", request.name());
            }
            Ok(Err(e)) => self.fail_request(request, e),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.fail_request(request, RequestError::Panicked(message));
            }
        }
    }

    fn fail_request(&self, mut request: Box<dyn Request>, error: RequestError) {
        self.stats.record_failed();
        warn!("Request '{}' failed: {}", request.name(), error);

        if panic::catch_unwind(AssertUnwindSafe(|| request.on_error(error))).is_err() {
            warn!("Error handler of request '{}' panicked", request.name());
        }
    }

    fn report_status(&self) {
        let status = self.snapshot(true);
        if panic::catch_unwind(AssertUnwindSafe(|| self.sink.report(&status))).is_err() {
            warn!("Status sink of worker '{}' panicked", self.name);
        }
    }

    fn snapshot(&self, alive: bool) -> StatusReport {
        StatusReport {
            worker: self.name.clone(),
            state: self.lifecycle.state(),
            alive,
            queue_depth: self.queue.len(),
            processed: self.stats.processed(),
            failed: self.stats.failed(),
            discarded: self.stats.discarded(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::status::MockStatusSink;
    use super::*;
    use crate::queue::Priority;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Recorded {
        failures: Arc<Mutex<Vec<RequestError>>>,
        outcome: fn() -> std::result::Result<(), RequestError>,
    }

    impl Request for Recorded {
        fn name(&self) -> &str {
            "recorded"
        }

        fn process(&mut self) -> std::result::Result<(), RequestError> {
            (self.outcome)()
        }

        fn on_error(&mut self, error: RequestError) {
            self.failures.lock().unwrap().push(error);
        }
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig::new()
            .with_name("test-worker")
            .with_thread_timeout(Duration::from_secs(5))
    }

    fn shared_with(sink: Arc<dyn StatusSink>) -> Shared {
        Shared {
            name: "unit".to_string(),
            queue: Arc::new(TaskQueue::new()),
            lifecycle: Lifecycle::new(),
            stats: WorkerStats::default(),
            sink,
        }
    }

    #[test]
    fn test_failed_request_reports_through_on_error() {
        let shared = shared_with(Arc::new(TracingSink));
        let failures = Arc::new(Mutex::new(Vec::new()));

        shared.dispatch_request(Box::new(Recorded {
            failures: failures.clone(),
            outcome: || Err(RequestError::Failed("500".to_string())),
        }));
        shared.dispatch_request(Box::new(Recorded {
            failures: failures.clone(),
            outcome: || Ok(()),
        }));

        assert_eq!(*failures.lock().unwrap(), vec![RequestError::Failed("500".to_string())]);
        assert_eq!(shared.stats.failed(), 1);
        assert_eq!(shared.stats.processed(), 1);
    }

    #[test]
    fn test_panicking_request_is_isolated() {
        let shared = shared_with(Arc::new(TracingSink));
        let failures = Arc::new(Mutex::new(Vec::new()));

        shared.dispatch_request(Box::new(Recorded {
            failures: failures.clone(),
            outcome: || panic!("connection reset"),
        }));

        assert_eq!(
            *failures.lock().unwrap(),
            vec![RequestError::Panicked("connection reset".to_string())]
        );
    }

    #[test]
    fn test_report_status_after_clear_has_zero_depth() {
        let mut sink = MockStatusSink::new();
        sink.expect_report()
            .withf(|status| status.queue_depth == 0 && status.discarded == 2 && status.alive)
            .times(1)
            .return_const(());

        let shared = shared_with(Arc::new(sink));
        shared.queue.push(ControlCommand::Nop).unwrap();
        shared.queue.push(ControlCommand::ReportStatus).unwrap();

        assert_eq!(shared.execute(ControlCommand::ClearQueue, 0).unwrap(), Flow::Continue);
        assert_eq!(shared.execute(ControlCommand::ReportStatus, 1).unwrap(), Flow::Continue);
    }

    #[test]
    fn test_panicking_sink_is_not_fatal() {
        struct Unavailable;
        impl StatusSink for Unavailable {
            fn report(&self, _status: &StatusReport) {
                panic!("sink unavailable");
            }
        }

        let shared = shared_with(Arc::new(Unavailable));
        assert_eq!(shared.execute(ControlCommand::ReportStatus, 0).unwrap(), Flow::Continue);
    }

    #[test]
    fn test_stop_immediate_inside_drain_abandons_rest() {
        let shared = shared_with(Arc::new(TracingSink));
        shared.lifecycle.begin().unwrap();

        let processed = Arc::new(AtomicUsize::new(0));
        struct Counted(Arc<AtomicUsize>);
        impl Request for Counted {
            fn priority(&self) -> Priority {
                Priority::Low
            }
            fn process(&mut self) -> std::result::Result<(), RequestError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        shared.queue.push(ControlCommand::StopImmediate).unwrap();
        shared.queue.push(QueueItem::request(Counted(processed.clone()))).unwrap();
        shared.queue.push(QueueItem::request(Counted(processed.clone()))).unwrap();

        assert_eq!(shared.execute(ControlCommand::Stop, 3).unwrap(), Flow::Exit);
        assert_eq!(processed.load(Ordering::SeqCst), 0);
        assert_eq!(shared.stats.discarded(), 2);
        assert!(shared.queue.is_closed());
        assert_eq!(shared.lifecycle.state(), WorkerState::Stopping);
    }

    #[test]
    fn test_stop_drops_entries_sent_after_it() {
        let shared = shared_with(Arc::new(TracingSink));
        shared.lifecycle.begin().unwrap();
        let failures = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..3 {
            shared
                .queue
                .push(QueueItem::request(Recorded {
                    failures: failures.clone(),
                    outcome: || Ok(()),
                }))
                .unwrap();
        }
        shared.queue.push(ControlCommand::Stop).unwrap();

        // Stopping at sequence 1 keeps entry 0 and drops the rest.
        assert_eq!(shared.execute(ControlCommand::Stop, 1).unwrap(), Flow::Exit);
        assert_eq!(shared.stats.processed(), 1);
        assert_eq!(shared.stats.discarded(), 2);
        assert!(shared.queue.is_closed());
        assert!(shared.queue.is_empty());
    }

    #[test]
    fn test_start_twice_fails() {
        let worker = ApiWorker::from_config(test_config()).unwrap();
        worker.start().unwrap();
        assert!(matches!(worker.start(), Err(WorkerError::InvalidState(_))));
        worker.stop().unwrap();
        assert!(matches!(worker.start(), Err(WorkerError::InvalidState(_))));
    }

    #[test]
    fn test_invalid_config_refuses_to_start() {
        let worker = ApiWorker::new(
            Arc::new(TaskQueue::new()),
            WorkerConfig::new().with_name("bad name"),
        );
        assert!(matches!(worker.start(), Err(WorkerError::Config(_))));
        assert_eq!(worker.state(), WorkerState::NotStarted);
    }

    #[test]
    fn test_corrupted_queue_kills_worker_visibly() {
        let worker = ApiWorker::from_config(test_config()).unwrap();
        worker.queue().poison();
        worker.start().unwrap();

        assert!(worker.shared.lifecycle.wait_stopped(Duration::from_secs(5)));
        for _ in 0..100 {
            if !worker.is_alive() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!worker.is_alive());
        assert!(matches!(worker.send(ControlCommand::Nop), Err(WorkerError::Stopped)));
        assert!(worker.stop().is_ok());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
