//! Queue items and ordered queue entries

use crate::queue::command::ControlCommand;
use crate::queue::priority::{Prioritized, Priority};
use crate::request::Request;
use std::cmp::Ordering;

/// Payload of a queue entry: a control command or a request
pub enum QueueItem {
    /// Control command
    Command(ControlCommand),
    /// Opaque request
    Request(Box<dyn Request>),
}

impl QueueItem {
    /// Wrap a request
    pub fn request<R: Request + 'static>(request: R) -> Self {
        QueueItem::Request(Box::new(request))
    }

    /// The command carried by this item, if any
    pub fn as_command(&self) -> Option<ControlCommand> {
        match self {
            QueueItem::Command(cmd) => Some(*cmd),
            QueueItem::Request(_) => None,
        }
    }

    /// Check if the item is `STOP` or `STOP_IMMEDIATE`
    pub fn is_stop_cmd(&self) -> bool {
        self.as_command().is_some_and(|cmd| cmd.is_stop_cmd())
    }
}

impl Prioritized for QueueItem {
    fn priority(&self) -> Priority {
        match self {
            QueueItem::Command(cmd) => cmd.priority(),
            QueueItem::Request(request) => request.priority().for_request(),
        }
    }
}

impl From<ControlCommand> for QueueItem {
    fn from(cmd: ControlCommand) -> Self {
        QueueItem::Command(cmd)
    }
}

impl From<Box<dyn Request>> for QueueItem {
    fn from(request: Box<dyn Request>) -> Self {
        QueueItem::Request(request)
    }
}

impl std::fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueItem::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            QueueItem::Request(request) => f.debug_tuple("Request").field(&request.name()).finish(),
        }
    }
}

/// Queue entry ordered by (priority, sequence)
#[derive(Debug)]
pub struct Entry {
    priority: Priority,
    sequence: u64,
    item: QueueItem,
}

impl Entry {
    #[cfg(test)]
    pub(crate) fn new(sequence: u64, item: QueueItem) -> Self {
        Self::with_priority(item.priority(), sequence, item)
    }

    pub(super) fn with_priority(priority: Priority, sequence: u64, item: QueueItem) -> Self {
        Self {
            priority,
            sequence,
            item,
        }
    }

    /// Priority the entry was enqueued with
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Enqueue sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Borrow the payload
    pub fn item(&self) -> &QueueItem {
        &self.item
    }

    /// Take the payload
    pub fn into_item(self) -> QueueItem {
        self.item
    }

    fn key(&self) -> (Priority, u64) {
        (self.priority, self.sequence)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap pops the greatest element, so the most urgent key compares greatest.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}
