//! Process inventory for the warden service: periodic enumeration of local
//! processes, lifecycle events for subscribers, and guarded termination.

pub mod critical;
pub mod error;
pub mod inventory;
pub mod record;

mod platform;

pub use critical::is_protected;
pub use error::InventoryError;
pub use inventory::{InventoryConfig, ProcessInventory};
pub use record::{ProcessEvent, ProcessEventKind, ProcessRecord};
