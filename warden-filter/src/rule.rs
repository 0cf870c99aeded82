//! Rule model and its compiled representation.
//!
//! A [`Rule`] is the serialized form that crosses the management plane and
//! the persistence backend. On insertion it is lowered into a
//! [`CompiledRule`], whose matcher is built exactly once so the hot path
//! never re-parses a pattern.

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use warden_common::{Action, ProcessContext};

use crate::{domain, error::RuleError};

/// How a rule's pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchMode {
    /// Case-insensitive equality with the canonical query.
    Exact,
    /// Glob where `*` and `?` are translated to regex metacharacters and the
    /// pattern is anchored at both ends.
    Wildcard,
    /// A regular expression, matched unanchored; the author anchors.
    Regex,
    /// The pattern names a domain; the query matches if it equals the
    /// pattern or is a subdomain of it.
    Domain,
}

/// A single allow/deny rule as configured by the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Stable identifier, unique within the store.
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub action: Action,
    pub pattern: String,
    pub match_mode: MatchMode,
    /// Restrict the rule to queries attributed to this pid.
    #[serde(default)]
    pub pid: Option<u32>,
    /// Restrict the rule to queries attributed to this executable name,
    /// case-insensitive.
    #[serde(default)]
    pub process_name: Option<String>,
    /// Higher priority wins; ties break on insertion order.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

const fn default_enabled() -> bool {
    true
}

impl Rule {
    /// Minimal rule with everything defaulted but the matching essentials.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        action: Action,
        pattern: impl Into<String>,
        match_mode: MatchMode,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: String::new(),
            action,
            pattern: pattern.into(),
            match_mode,
            pid: None,
            process_name: None,
            priority: 0,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_scope(mut self, pid: Option<u32>, process_name: Option<&str>) -> Self {
        self.pid = pid;
        self.process_name = process_name.map(ToOwned::to_owned);
        self
    }

    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether the rule carries any process scope at all.
    #[must_use]
    pub const fn is_scoped(&self) -> bool {
        self.pid.is_some() || self.process_name.is_some()
    }
}

/// Matcher lowered from a `(pattern, match_mode)` pair at insertion time.
#[derive(Debug)]
enum Matcher {
    Exact(String),
    Domain(String),
    Pattern(Regex),
}

/// A rule plus its precompiled matcher.
#[derive(Debug)]
pub struct CompiledRule {
    rule: Rule,
    matcher: Matcher,
}

impl CompiledRule {
    /// Validate and lower a rule. Fails with [`RuleError::InvalidRule`] on an
    /// empty id or pattern, and [`RuleError::InvalidPattern`] when a regex or
    /// wildcard pattern does not compile.
    pub fn compile(rule: Rule) -> Result<Self, RuleError> {
        if rule.id.trim().is_empty() {
            return Err(RuleError::InvalidRule("rule id must not be empty"));
        }
        if rule.pattern.trim().is_empty() {
            return Err(RuleError::InvalidRule("rule pattern must not be empty"));
        }

        let matcher = match rule.match_mode {
            MatchMode::Exact => Matcher::Exact(rule.pattern.to_ascii_lowercase()),
            MatchMode::Domain => Matcher::Domain(domain::canonicalize(&rule.pattern)),
            MatchMode::Wildcard => Matcher::Pattern(compile_wildcard(&rule.pattern)?),
            MatchMode::Regex => Matcher::Pattern(compile_regex(&rule.pattern)?),
        };

        Ok(Self { rule, matcher })
    }

    #[must_use]
    pub const fn rule(&self) -> &Rule {
        &self.rule
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    #[must_use]
    pub const fn action(&self) -> Action {
        self.rule.action
    }

    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.rule.priority
    }

    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.rule.enabled
    }

    /// Whether the canonical query matches this rule's pattern.
    #[must_use]
    pub fn matches_query(&self, canonical: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(pattern) => canonical == pattern,
            Matcher::Domain(pattern) => domain::domain_matches(canonical, pattern),
            Matcher::Pattern(regex) => regex.is_match(canonical),
        }
    }

    /// Whether the query's process scope satisfies this rule's scope.
    ///
    /// An unscoped rule matches everything. A scoped rule requires a context
    /// and, for each of pid and name that the rule sets, an exact match (the
    /// name comparison is case-insensitive).
    #[must_use]
    pub fn matches_scope(&self, context: Option<&ProcessContext>) -> bool {
        if !self.rule.is_scoped() {
            return true;
        }

        let Some(context) = context else {
            return false;
        };

        if self.rule.pid.is_some_and(|pid| pid != context.pid) {
            return false;
        }

        !self
            .rule
            .process_name
            .as_deref()
            .is_some_and(|name| !name.eq_ignore_ascii_case(&context.name))
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, RuleError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Translate a glob into an anchored regex: `*` becomes `.*`, `?` becomes
/// `.`, everything else is escaped literally.
fn compile_wildcard(pattern: &str) -> Result<Regex, RuleError> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');

    compile_regex(&translated)
}
