//! Error types for the DNS engine and redirector.

use std::io;

use thiserror::Error;

/// Errors surfaced by the DNS engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A listener could not bind. Fatal at startup; the engine never starts
    /// partially.
    #[error("failed to bind {listener} listener on {address}: {source}")]
    Bind {
        listener: &'static str,
        address: std::net::SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The packet did not parse as a DNS message, or carried no question.
    #[error("malformed DNS message: {0}")]
    Malformed(String),

    /// Every configured upstream failed for one query.
    #[error("all upstreams failed for {query}")]
    UpstreamExhausted { query: String },

    /// Message synthesis failed to encode.
    #[error("failed to encode DNS message: {0}")]
    Encode(#[from] hickory_proto::ProtoError),

    /// Socket I/O failure outside bind.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors surfaced by the NAT redirector.
#[derive(Debug, Error)]
pub enum RedirectError {
    /// Installing packet-filter rules needs root.
    #[error("redirect rules require root privileges")]
    PrivilegeRequired,

    /// The packet-filter tool rejected a rule.
    #[error("packet filter command failed ({context}): {detail}")]
    CommandFailed {
        context: &'static str,
        detail: String,
    },

    /// The packet-filter tool could not be spawned at all.
    #[error(transparent)]
    Io(#[from] io::Error),
}
