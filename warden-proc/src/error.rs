//! Error types for the process inventory.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    /// No such pid in the current snapshot (or on the host).
    #[error("no process with pid {0}")]
    NotFound(u32),

    /// `start` was called on an inventory that is already polling.
    #[error("inventory is already running")]
    AlreadyRunning,

    /// The pid is protected: critical name or pid ≤ 100.
    #[error("refusing to terminate protected process {pid} ({name})")]
    RefusedCritical { pid: u32, name: String },

    /// The caller lacks the privilege to signal the process.
    #[error("insufficient privilege to signal pid {0}")]
    PrivilegeRequired(u32),

    /// Substrate I/O failure.
    #[error("process enumeration failed: {0}")]
    Io(#[from] std::io::Error),
}
