//! Priority classes shared by commands and requests

use serde::{Deserialize, Serialize};

/// Priority class of a queue entry (lower value is dequeued sooner)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Reserved for `STOP_IMMEDIATE`
    Immediate = 0,
    /// Urgent requests
    High = 1,
    /// Default request class
    #[default]
    Medium = 2,
    /// Bulk requests (log batches) and ordinary control commands
    Low = 3,
}

impl Priority {
    /// Numeric value used as the ordering key
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Priority a request is enqueued with.
    ///
    /// `Immediate` is reserved for control traffic, so a request asking for it
    /// is demoted to `High`.
    pub fn for_request(self) -> Self {
        self.max(Priority::High)
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Immediate => write!(f, "immediate"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Anything that can be ordered inside the worker queue
pub trait Prioritized {
    /// Priority used as the queue ordering key
    fn priority(&self) -> Priority;

    /// True when `self` is dequeued strictly before `other`, whatever its kind
    fn outranks(&self, other: &dyn Prioritized) -> bool {
        self.priority() < other.priority()
    }
}

impl Prioritized for Priority {
    fn priority(&self) -> Priority {
        *self
    }
}
