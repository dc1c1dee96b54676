//! Shared priority queue
//!
//! One queue holds control commands and requests side by side. Entries are
//! dequeued by ascending priority value, then by the sequence number assigned
//! when they were enqueued, so equal priorities keep FIFO order.
//!
//! The queue can be bounded. The bound applies to requests only: control
//! commands are always accepted so a full queue can still be stopped or
//! cleared.

mod command;
mod entry;
mod priority;

pub use command::ControlCommand;
pub use entry::{Entry, QueueItem};
pub use priority::{Prioritized, Priority};

use crate::error::{Result, WorkerError};
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tracing::debug;

struct QueueState {
    heap: BinaryHeap<Entry>,
    next_sequence: u64,
    closed: bool,
}

/// Thread-safe priority queue shared between producers and the worker
pub struct TaskQueue {
    state: Mutex<QueueState>,
    /// Signalled when an entry arrives or the queue closes
    available: Condvar,
    /// Signalled when room frees up or the queue closes
    space: Condvar,
    capacity: Option<usize>,
}

impl TaskQueue {
    /// Create an unbounded queue
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a queue holding at most `capacity` requests
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    /// Create a queue with an optional request bound
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_sequence: 0,
                closed: false,
            }),
            available: Condvar::new(),
            space: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>> {
        self.state.lock().map_err(corrupted)
    }

    /// Enqueue an item and return its sequence number.
    ///
    /// Blocks while a bounded queue is full of requests. Fails with
    /// [`WorkerError::Stopped`] once the queue is closed.
    pub fn push(&self, item: impl Into<QueueItem>) -> Result<u64> {
        let item = item.into();
        let priority = item.priority();
        let is_request = item.as_command().is_none();

        let mut state = self.lock()?;
        if let (Some(capacity), true) = (self.capacity, is_request) {
            while !state.closed && state.heap.len() >= capacity {
                state = self.space.wait(state).map_err(corrupted)?;
            }
        }

        if state.closed {
            return Err(WorkerError::Stopped);
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.heap.push(Entry::with_priority(priority, sequence, item));
        drop(state);

        self.available.notify_one();
        Ok(sequence)
    }

    /// Block until an entry is available and dequeue it.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub fn pop(&self) -> Result<Option<Entry>> {
        let mut state = self.lock()?;
        while state.heap.is_empty() && !state.closed {
            state = self.available.wait(state).map_err(corrupted)?;
        }

        let entry = state.heap.pop();
        drop(state);

        if entry.is_some() {
            self.space.notify_one();
        }
        Ok(entry)
    }

    /// Dequeue the next entry without blocking
    pub fn try_pop(&self) -> Result<Option<Entry>> {
        let entry = self.lock()?.heap.pop();
        if entry.is_some() {
            self.space.notify_one();
        }
        Ok(entry)
    }

    /// Remove every queued entry, commands and requests alike.
    ///
    /// Removed entries are returned in dequeue order so the caller drops them
    /// outside the lock.
    pub fn clear(&self) -> Result<Vec<Entry>> {
        let mut removed = std::mem::take(&mut self.lock()?.heap).into_sorted_vec();
        removed.reverse();

        self.space.notify_all();
        debug!("Cleared {} queued entries", removed.len());
        Ok(removed)
    }

    /// Refuse further entries and hand back whatever is still queued, in
    /// dequeue order.
    pub fn close(&self) -> Result<Vec<Entry>> {
        let mut state = self.lock()?;
        state.closed = true;
        let mut remaining = std::mem::take(&mut state.heap).into_sorted_vec();
        drop(state);

        remaining.reverse();
        self.available.notify_all();
        self.space.notify_all();
        Ok(remaining)
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.heap.len())
            .unwrap_or_default()
    }

    /// Check if nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the queue refuses new entries
    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|state| state.closed).unwrap_or(true)
    }

    /// Request bound, if any
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    #[cfg(test)]
    pub(crate) fn poison(&self) {
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = self.state.lock();
            panic!("poisoning queue lock");
        }));
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .field("capacity", &self.capacity)
            .finish()
    }
}

fn corrupted<T>(_: PoisonError<T>) -> WorkerError {
    WorkerError::QueueCorrupted("queue lock poisoned by a panicking thread".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Request, RequestError};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    struct Named(&'static str, Priority);

    impl Request for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn priority(&self) -> Priority {
            self.1
        }

        fn process(&mut self) -> std::result::Result<(), RequestError> {
            Ok(())
        }
    }

    fn label(entry: &Entry) -> String {
        match entry.item() {
            QueueItem::Command(cmd) => cmd.to_string(),
            QueueItem::Request(request) => request.name().to_string(),
        }
    }

    fn drain(queue: &TaskQueue) -> Vec<String> {
        let mut labels = Vec::new();
        while let Some(entry) = queue.try_pop().unwrap() {
            labels.push(label(&entry));
        }
        labels
    }

    #[test]
    fn test_priority_then_fifo() {
        let queue = TaskQueue::new();
        queue.push(QueueItem::request(Named("log-1", Priority::Low))).unwrap();
        queue.push(QueueItem::request(Named("item-1", Priority::Medium))).unwrap();
        queue.push(ControlCommand::Stop).unwrap();
        queue.push(QueueItem::request(Named("item-2", Priority::Medium))).unwrap();
        queue.push(QueueItem::request(Named("launch", Priority::High))).unwrap();

        assert_eq!(queue.len(), 5);
        assert_eq!(drain(&queue), vec!["launch", "item-1", "item-2", "log-1", "STOP"]);
    }

    #[test]
    fn test_stop_immediate_jumps_the_queue() {
        let queue = TaskQueue::new();
        for name in ["a", "b", "c"] {
            queue.push(QueueItem::request(Named(name, Priority::High))).unwrap();
        }
        queue.push(ControlCommand::StopImmediate).unwrap();

        let next = queue.try_pop().unwrap().unwrap();
        assert_eq!(next.item().as_command(), Some(ControlCommand::StopImmediate));
    }

    #[test]
    fn test_sequences_are_never_reused() {
        let queue = TaskQueue::new();
        let first = queue.push(ControlCommand::Nop).unwrap();
        queue.try_pop().unwrap();
        let second = queue.push(ControlCommand::Nop).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_clear_removes_commands_and_requests() {
        let queue = TaskQueue::new();
        queue.push(QueueItem::request(Named("item", Priority::Medium))).unwrap();
        queue.push(ControlCommand::ReportStatus).unwrap();
        queue.push(ControlCommand::Stop).unwrap();

        let removed = queue.clear().unwrap();
        let labels: Vec<_> = removed.iter().map(label).collect();
        assert_eq!(labels, vec!["item", "REPORT_STATUS", "STOP"]);
        assert!(queue.is_empty());

        // Sequences keep counting after a clear.
        assert_eq!(queue.push(ControlCommand::Nop).unwrap(), 3);
    }

    #[test]
    fn test_close_rejects_and_returns_remaining() {
        let queue = TaskQueue::new();
        queue.push(QueueItem::request(Named("low", Priority::Low))).unwrap();
        queue.push(QueueItem::request(Named("high", Priority::High))).unwrap();

        let remaining = queue.close().unwrap();
        let labels: Vec<_> = remaining.iter().map(label).collect();
        assert_eq!(labels, vec!["high", "low"]);

        assert!(queue.is_closed());
        assert!(matches!(queue.push(ControlCommand::Nop), Err(WorkerError::Stopped)));
        assert!(queue.pop().unwrap().is_none());
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(TaskQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.push(ControlCommand::Nop).unwrap();
            })
        };

        let entry = queue.pop().unwrap().unwrap();
        assert_eq!(entry.item().as_command(), Some(ControlCommand::Nop));
        producer.join().unwrap();
    }

    #[test]
    fn test_bounded_push_waits_for_space() {
        let queue = Arc::new(TaskQueue::bounded(1));
        queue.push(QueueItem::request(Named("first", Priority::Medium))).unwrap();

        // Commands bypass the bound.
        queue.push(ControlCommand::Nop).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                queue
                    .push(QueueItem::request(Named("second", Priority::Medium)))
                    .unwrap()
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        // Popping the request and the command frees room for the producer.
        queue.try_pop().unwrap();
        queue.try_pop().unwrap();
        producer.join().unwrap();
        assert_eq!(drain(&queue), vec!["second"]);
    }

    #[test]
    fn test_close_releases_blocked_producer() {
        let queue = Arc::new(TaskQueue::bounded(1));
        queue.push(QueueItem::request(Named("first", Priority::Medium))).unwrap();

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || queue.push(QueueItem::request(Named("late", Priority::Medium))))
        };

        thread::sleep(Duration::from_millis(50));
        queue.close().unwrap();
        assert!(matches!(producer.join().unwrap(), Err(WorkerError::Stopped)));
    }

    #[test]
    fn test_poisoned_queue_reports_corruption() {
        let queue = TaskQueue::new();
        queue.poison();
        assert!(matches!(queue.pop(), Err(WorkerError::QueueCorrupted(_))));
        assert!(matches!(queue.push(ControlCommand::Nop), Err(WorkerError::QueueCorrupted(_))));
        assert_eq!(queue.len(), 0);
    }
}
