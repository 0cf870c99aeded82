//! Error types for rule management.

use thiserror::Error;

/// Errors surfaced by the rule store.
#[derive(Debug, Error)]
pub enum RuleError {
    /// The rule is structurally invalid (empty identifier or pattern).
    #[error("invalid rule: {0}")]
    InvalidRule(&'static str),

    /// The pattern does not compile for its match mode.
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// No rule with that identifier exists.
    #[error("no rule with id {0:?}")]
    NotFound(String),

    /// The persistence backend rejected a load or store.
    #[error("rule backend error: {0}")]
    Backend(String),
}
