//! Control commands processed by the worker alongside requests

use crate::queue::priority::{Prioritized, Priority};
use serde::{Deserialize, Serialize};

/// Out-of-band signal managing queue state and worker lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCommand {
    /// Discard every queued entry without processing it
    ClearQueue,
    /// No effect; wakes a blocked queue wait
    Nop,
    /// Emit a status snapshot to the status sink
    ReportStatus,
    /// Finish entries enqueued ahead of it, then terminate
    Stop,
    /// Terminate at once, abandoning queued entries
    StopImmediate,
}

impl ControlCommand {
    /// Every command, in declaration order
    pub const ALL: [ControlCommand; 5] = [
        ControlCommand::ClearQueue,
        ControlCommand::Nop,
        ControlCommand::ReportStatus,
        ControlCommand::Stop,
        ControlCommand::StopImmediate,
    ];

    /// Check if the command terminates the worker
    pub fn is_stop_cmd(&self) -> bool {
        matches!(self, ControlCommand::Stop | ControlCommand::StopImmediate)
    }

    /// Fixed priority of the command
    pub fn priority(&self) -> Priority {
        match self {
            ControlCommand::StopImmediate => Priority::Immediate,
            _ => Priority::Low,
        }
    }
}

impl Prioritized for ControlCommand {
    fn priority(&self) -> Priority {
        ControlCommand::priority(self)
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlCommand::ClearQueue => write!(f, "CLEAR_QUEUE"),
            ControlCommand::Nop => write!(f, "NOP"),
            ControlCommand::ReportStatus => write!(f, "REPORT_STATUS"),
            ControlCommand::Stop => write!(f, "STOP"),
            ControlCommand::StopImmediate => write!(f, "STOP_IMMEDIATE"),
        }
    }
}
