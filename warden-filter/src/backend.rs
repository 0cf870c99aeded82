//! Persistence boundary for the rule store.
//!
//! The store itself is authoritative and in-memory; a backend only seeds it
//! at startup and receives the full rule list after each mutation. Production
//! deployments inject an SQLite-backed implementation; tests and the default
//! wiring use [`MemoryBackend`].

use parking_lot::Mutex;

use crate::{error::RuleError, rule::Rule};

/// Injected storage for rules.
pub trait RuleBackend: Send + Sync {
    /// Load the persisted rule list, in insertion order.
    fn load(&self) -> Result<Vec<Rule>, RuleError>;

    /// Replace the persisted rule list with `rules`.
    fn persist(&self, rules: &[Rule]) -> Result<(), RuleError>;
}

/// Backend that keeps rules in memory only.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rules: Mutex<Vec<Rule>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend, e.g. from a configuration file.
    #[must_use]
    pub fn seeded(rules: Vec<Rule>) -> Self {
        Self {
            rules: Mutex::new(rules),
        }
    }
}

impl RuleBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<Rule>, RuleError> {
        Ok(self.rules.lock().clone())
    }

    fn persist(&self, rules: &[Rule]) -> Result<(), RuleError> {
        *self.rules.lock() = rules.to_vec();
        Ok(())
    }
}
