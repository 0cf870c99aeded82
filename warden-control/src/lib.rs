//! Control protocol for managing a running warden instance.
//!
//! An IPC mechanism over a Unix domain socket used to manage rules, inspect
//! processes, and read engine statistics. The protocol is length-prefixed
//! bincode with a version field; a thin HTTP layer elsewhere can map the
//! same operations to REST endpoints.

pub mod auth;
pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use auth::ControlAuthConfig;
pub use client::ControlClient;
pub use error::{ControlError, Result};
pub use protocol::{
    PROTOCOL_VERSION, ProcessCommand, Request, RequestCommand, Response, ResponsePayload,
    RuleCommand, SystemCommand,
};
pub use server::{CommandHandler, ControlServer};

/// Default path for the control socket
pub const DEFAULT_CONTROL_SOCKET: &str = "/run/warden.sock";
