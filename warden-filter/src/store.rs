//! The authoritative in-memory rule set.
//!
//! Readers take snapshots; writers are exclusive. Every successful mutation
//! invalidates the attached decision cache in full and pushes the new rule
//! list to the persistence backend. Snapshot ordering is deterministic:
//! priority descending, insertion order ascending on ties.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::{
    backend::RuleBackend,
    cache::DecisionCache,
    error::RuleError,
    rule::{CompiledRule, Rule},
};

struct Stored {
    compiled: Arc<CompiledRule>,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    rules: ahash::AHashMap<String, Stored>,
    next_seq: u64,
}

/// Reader/writer-safe rule store with cache invalidation on mutation.
pub struct RuleStore {
    inner: RwLock<Inner>,
    cache: Option<Arc<DecisionCache>>,
    backend: Option<Box<dyn RuleBackend>>,
}

impl RuleStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            cache: None,
            backend: None,
        }
    }

    /// Attach the decision cache invalidated by mutations.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<DecisionCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Attach a persistence backend and seed the store from it.
    ///
    /// Rules that fail to compile (e.g. a regex persisted by an older,
    /// laxer build) are skipped with a warning rather than poisoning
    /// startup.
    #[must_use]
    pub fn with_backend(mut self, backend: Box<dyn RuleBackend>) -> Self {
        match backend.load() {
            Ok(rules) => {
                let mut inner = self.inner.write();
                for rule in rules {
                    let id = rule.id.clone();
                    match CompiledRule::compile(rule) {
                        Ok(compiled) => {
                            let seq = inner.next_seq;
                            inner.next_seq += 1;
                            inner.rules.insert(
                                id,
                                Stored {
                                    compiled: Arc::new(compiled),
                                    seq,
                                },
                            );
                        }
                        Err(err) => warn!(rule = %id, %err, "skipping persisted rule"),
                    }
                }
            }
            Err(err) => warn!(%err, "failed to load persisted rules"),
        }

        self.backend = Some(backend);
        self
    }

    /// Insert or replace a rule by identifier.
    ///
    /// Replacement keeps the original insertion order so snapshot ordering
    /// stays stable. Validation happens before anything is touched, so a
    /// failed upsert leaves the store and cache untouched.
    pub fn upsert(&self, rule: Rule) -> Result<(), RuleError> {
        let id = rule.id.clone();
        let compiled = Arc::new(CompiledRule::compile(rule)?);

        {
            let mut guard = self.inner.write();
            let inner = &mut *guard;
            let seq = match inner.rules.get(&id) {
                Some(existing) => existing.seq,
                None => {
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    seq
                }
            };
            inner.rules.insert(id.clone(), Stored { compiled, seq });
        }

        debug!(rule = %id, "rule upserted");
        self.after_mutation();
        Ok(())
    }

    /// Remove a rule; absent identifiers are an error.
    pub fn remove(&self, id: &str) -> Result<(), RuleError> {
        let removed = self.inner.write().rules.remove(id).is_some();
        if !removed {
            return Err(RuleError::NotFound(id.to_string()));
        }

        debug!(rule = %id, "rule removed");
        self.after_mutation();
        Ok(())
    }

    /// Idempotent removal used by the management plane; returns whether a
    /// rule actually existed.
    pub fn delete(&self, id: &str) -> bool {
        match self.remove(id) {
            Ok(()) => true,
            Err(_) => false,
        }
    }

    /// Remove every rule.
    pub fn clear(&self) {
        self.inner.write().rules.clear();
        self.after_mutation();
    }

    /// Materialize the evaluation order: priority descending, ties broken by
    /// insertion order. The read lock is released before this returns.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<CompiledRule>> {
        let mut entries: Vec<(i32, u64, Arc<CompiledRule>)> = {
            let inner = self.inner.read();
            inner
                .rules
                .values()
                .map(|stored| {
                    (
                        stored.compiled.priority(),
                        stored.seq,
                        Arc::clone(&stored.compiled),
                    )
                })
                .collect()
        };

        entries.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        entries.into_iter().map(|(_, _, rule)| rule).collect()
    }

    /// Plain rule list in snapshot order, for the management plane and the
    /// persistence backend.
    #[must_use]
    pub fn rules(&self) -> Vec<Rule> {
        self.snapshot()
            .iter()
            .map(|compiled| compiled.rule().clone())
            .collect()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Rule> {
        self.inner
            .read()
            .rules
            .get(id)
            .map(|stored| stored.compiled.rule().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().rules.is_empty()
    }

    fn after_mutation(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }

        if let Some(backend) = &self.backend {
            if let Err(err) = backend.persist(&self.rules()) {
                warn!(%err, "failed to persist rules");
            }
        }
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}
