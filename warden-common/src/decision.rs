//! The decision model shared by the evaluator, the cache, and the audit
//! pipeline.
//!
//! A [`Decision`] is immutable once created: the evaluator produces it, the
//! cache stores it, and the audit sink receives a copy. Nothing downstream
//! mutates one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the service does with a matched query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Forward the query to the upstream resolvers.
    Allow,
    /// Answer with the sinkhole address.
    Block,
    /// Forward, but record the match.
    Log,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => f.write_str("allow"),
            Self::Block => f.write_str("block"),
            Self::Log => f.write_str("log"),
        }
    }
}

/// The process a query was attributed to, when known.
///
/// Name comparisons are case-insensitive everywhere this is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessContext {
    pub pid: u32,
    pub name: String,
}

impl ProcessContext {
    #[must_use]
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

/// The outcome of evaluating one query against the rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// Identifier of the rule that matched, absent on fallthrough.
    pub rule_id: Option<String>,
    pub reason: String,
    /// The canonicalized query this decision was made for.
    pub query: String,
    /// Snapshot of the process scope the query was evaluated under.
    pub process: Option<ProcessContext>,
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    /// Decision produced when a rule matched.
    #[must_use]
    pub fn matched(
        query: impl Into<String>,
        action: Action,
        rule_id: impl Into<String>,
        process: Option<ProcessContext>,
    ) -> Self {
        let rule_id = rule_id.into();
        Self {
            action,
            reason: format!("matched rule {rule_id}"),
            rule_id: Some(rule_id),
            query: query.into(),
            process,
            timestamp: Utc::now(),
        }
    }

    /// Decision produced when no rule matched.
    #[must_use]
    pub fn fallthrough(query: impl Into<String>, process: Option<ProcessContext>) -> Self {
        Self {
            action: Action::Allow,
            rule_id: None,
            reason: "no matching rules".to_string(),
            query: query.into(),
            process,
            timestamp: Utc::now(),
        }
    }

    /// Replace the reason, keeping everything else.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    #[must_use]
    pub const fn is_block(&self) -> bool {
        matches!(self.action, Action::Block)
    }
}
