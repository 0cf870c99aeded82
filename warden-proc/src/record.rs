//! Process records and lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed process.
///
/// `(pid, first_seen)` is unique over the life of the service; a recycled
/// pid produces a fresh record. Attributes the substrate could not read
/// (e.g. an unreadable exe link) are empty, never omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    /// Executable name (the kernel's short name on Linux).
    pub name: String,
    /// Absolute path of the executable, when readable.
    pub path: String,
    /// Full command line, arguments separated by spaces.
    pub cmdline: String,
    pub first_seen: DateTime<Utc>,
}

/// Lifecycle transition observed between two polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessEventKind {
    Started,
    Stopped,
}

/// Event published to inventory subscribers.
///
/// For `Stopped`, `record` is the last-seen record of the vanished pid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub kind: ProcessEventKind,
    pub record: ProcessRecord,
    pub timestamp: DateTime<Utc>,
}

impl ProcessEvent {
    #[must_use]
    pub fn new(kind: ProcessEventKind, record: ProcessRecord) -> Self {
        Self {
            kind,
            record,
            timestamp: Utc::now(),
        }
    }
}
