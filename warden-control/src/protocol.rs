//! Control protocol types and serialization

use serde::{Deserialize, Serialize};
use warden_common::Decision;
use warden_dns::StatsSnapshot;
use warden_filter::Rule;
use warden_proc::ProcessRecord;

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

/// Request sent to the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Protocol version
    pub version: u32,
    /// Bearer token, required when the server has auth enabled
    #[serde(default)]
    pub token: Option<String>,
    /// The actual command to execute
    pub command: RequestCommand,
}

/// Request command types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RequestCommand {
    /// Rule management commands
    Rules(RuleCommand),
    /// Process inventory commands
    Process(ProcessCommand),
    /// System management commands
    System(SystemCommand),
}

/// Rule management commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RuleCommand {
    /// List the current rule snapshot
    List,
    /// Insert or replace a rule by id (idempotent)
    Upsert(Box<Rule>),
    /// Remove a rule by id; a missing id is not an error
    Delete {
        /// Rule identifier to remove
        id: String,
    },
    /// Remove every rule
    Clear,
    /// Evaluate a query against the current rules without sending a packet
    Check {
        /// Query name to evaluate
        query: String,
        /// Optional process scope: pid
        pid: Option<u32>,
        /// Optional process scope: executable name
        process_name: Option<String>,
    },
}

/// Process inventory commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProcessCommand {
    /// List the current inventory snapshot
    List,
    /// Terminate a process; refused for critical targets
    Terminate {
        /// Target pid
        pid: u32,
        /// Request orderly shutdown and wait before forcing
        graceful: bool,
    },
}

/// System management commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemCommand {
    /// Health check / ping
    Ping,
    /// Get system status
    Status,
    /// Get engine counters
    Stats,
}

/// Response from the control server (versioned wrapper)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version
    pub version: u32,
    /// The actual response payload
    pub payload: ResponsePayload,
}

/// Response payload types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Command succeeded
    Ok,
    /// Command succeeded with data
    Data(Box<ResponseData>),
    /// Command failed with error message
    Error(String),
}

/// Response data types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResponseData {
    /// Rule snapshot in evaluation order
    Rules(Vec<Rule>),
    /// Process inventory snapshot
    Processes(Vec<ProcessRecord>),
    /// Engine counters plus cache and inventory gauges
    Stats(StatsReport),
    /// Result of a dry-run evaluation
    Decision(Decision),
    /// System status information
    Status(SystemStatus),
    /// Simple string message
    Message(String),
}

/// Engine counters plus the cache and inventory gauges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsReport {
    /// DNS engine counters
    pub engine: StatsSnapshot,
    /// Current decision-cache entry count
    pub cache_entries: usize,
    /// Current process inventory size
    pub process_count: usize,
}

/// System status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Server version
    pub version: String,
    /// Uptime in seconds
    pub uptime_secs: u64,
    /// Number of configured rules
    pub rule_count: usize,
    /// Number of observed processes
    pub process_count: usize,
    /// Current decision-cache entry count
    pub cache_entries: usize,
}

impl Request {
    /// Create a new request with the current protocol version
    #[must_use]
    pub const fn new(command: RequestCommand) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            token: None,
            command,
        }
    }

    /// Attach a bearer token
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Check if the request version is compatible with the current version
    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

impl Response {
    /// Create an error response
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Error(message.into()),
        }
    }

    /// Create a success response with no data
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Ok,
        }
    }

    /// Create a response with data
    #[must_use]
    pub fn data(data: ResponseData) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload: ResponsePayload::Data(Box::new(data)),
        }
    }

    /// Check if the response indicates success (not an error)
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self.payload, ResponsePayload::Error(_))
    }

    /// Check if the response version is compatible with the current version
    #[must_use]
    pub const fn is_version_compatible(&self) -> bool {
        self.version == PROTOCOL_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_bincode() {
        let request = Request::new(RequestCommand::System(SystemCommand::Ping)).with_token("tok");
        let bytes = bincode::serde::encode_to_vec(&request, bincode::config::legacy()).unwrap();
        let (decoded, _): (Request, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::legacy()).unwrap();

        assert_eq!(decoded.version, PROTOCOL_VERSION);
        assert_eq!(decoded.token.as_deref(), Some("tok"));
        assert!(matches!(
            decoded.command,
            RequestCommand::System(SystemCommand::Ping)
        ));
    }

    #[test]
    fn error_responses_are_not_success() {
        assert!(Response::ok().is_success());
        assert!(!Response::error("nope").is_success());
    }
}
