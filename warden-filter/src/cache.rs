//! Short-TTL decision cache.
//!
//! The cache is a latency optimization, not a correctness mechanism: entries
//! expire independently, overflow evicts an arbitrary entry, and any rule
//! mutation clears the whole map. All critical sections are O(1) map
//! operations aside from the periodic sweep.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::debug;

use warden_common::{Decision, ProcessContext, Signal};

/// How often the background sweeper evicts expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Decision cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum number of entries.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

const fn default_ttl_secs() -> u64 {
    300
}

const fn default_capacity() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            capacity: default_capacity(),
        }
    }
}

/// Canonical cache key for a query plus its process scope.
#[must_use]
pub fn fingerprint(canonical_query: &str, context: Option<&ProcessContext>) -> String {
    context.map_or_else(
        || canonical_query.to_string(),
        |ctx| {
            format!(
                "{canonical_query}|{}:{}",
                ctx.pid,
                ctx.name.to_ascii_lowercase()
            )
        },
    )
}

#[derive(Debug, Clone)]
struct CacheEntry {
    decision: Decision,
    inserted: Instant,
}

/// Bounded map from fingerprint to [`Decision`] with per-entry TTL.
#[derive(Debug)]
pub struct DecisionCache {
    entries: Mutex<AHashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl DecisionCache {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self::with(Duration::from_secs(config.ttl_secs), config.capacity)
    }

    /// Construct with explicit bounds; tests use this with millisecond TTLs.
    #[must_use]
    pub fn with(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(AHashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Return the cached decision iff the entry exists and is younger than
    /// the TTL. An expired entry is evicted on the way out.
    #[must_use]
    pub fn lookup(&self, fingerprint: &str) -> Option<Decision> {
        let mut entries = self.entries.lock();
        match entries.get(fingerprint) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => Some(entry.decision.clone()),
            Some(_) => {
                entries.remove(fingerprint);
                None
            }
            None => None,
        }
    }

    /// Insert a decision, evicting one arbitrary entry first if the map is at
    /// capacity and the key is new.
    pub fn store(&self, fingerprint: String, decision: Decision) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity && !entries.contains_key(&fingerprint) {
            if let Some(victim) = entries.keys().next().cloned() {
                entries.remove(&victim);
            }
        }

        entries.insert(
            fingerprint,
            CacheEntry {
                decision,
                inserted: Instant::now(),
            },
        );
    }

    pub fn invalidate_all(&self) {
        self.entries.lock().clear();
    }

    /// Drop every entry whose decision was made under a scope touching this
    /// pid or (case-insensitive) process name. Driven by process lifecycle
    /// events.
    pub fn invalidate_scope(&self, pid: u32, name: &str) {
        self.entries.lock().retain(|_, entry| {
            entry.decision.process.as_ref().is_none_or(|ctx| {
                ctx.pid != pid && !ctx.name.eq_ignore_ascii_case(name)
            })
        });
    }

    /// Remove every expired entry.
    pub fn sweep(&self) {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted.elapsed() < self.ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "cache sweep");
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Background task sweeping expired entries until shutdown.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a freshly started
            // service does not sweep an empty map.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => cache.sweep(),
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}
