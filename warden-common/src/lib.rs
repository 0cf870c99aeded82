pub mod audit;
pub mod decision;
pub mod logging;

pub use decision::{Action, Decision, ProcessContext};
pub use tracing;

/// Broadcast value used to coordinate shutdown across every component.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
