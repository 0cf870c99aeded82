//! The warden daemon: wiring for the DNS engine, rule store, process
//! inventory, audit pipeline and control socket.

pub mod control_handler;
pub mod controller;

pub use control_handler::WardenControlHandler;
pub use controller::Warden;
