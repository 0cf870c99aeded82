//! Engine counters.
//!
//! Plain atomics: the hot path bumps them lock-free, the management plane
//! reads a consistent-enough snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters owned by the engine.
#[derive(Debug, Default)]
pub struct EngineStats {
    queries: AtomicU64,
    blocked: AtomicU64,
    allowed: AtomicU64,
    upstream_lookups: AtomicU64,
    cache_hits: AtomicU64,
    errors: AtomicU64,
}

impl EngineStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allowed(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_lookup(&self) {
        self.upstream_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let queries = self.queries.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);

        StatsSnapshot {
            queries,
            blocked: self.blocked.load(Ordering::Relaxed),
            allowed: self.allowed.load(Ordering::Relaxed),
            upstream_lookups: self.upstream_lookups.load(Ordering::Relaxed),
            cache_hits,
            errors: self.errors.load(Ordering::Relaxed),
            cache_hit_ratio: if queries == 0 {
                0.0
            } else {
                cache_hits as f64 / queries as f64
            },
        }
    }
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub queries: u64,
    pub blocked: u64,
    pub allowed: u64,
    pub upstream_lookups: u64,
    pub cache_hits: u64,
    pub errors: u64,
    pub cache_hit_ratio: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let stats = EngineStats::new();
        stats.record_query();
        stats.record_query();
        stats.record_blocked();
        stats.record_cache_hit();
        stats.record_error();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.queries, 2);
        assert_eq!(snapshot.blocked, 1);
        assert_eq!(snapshot.allowed, 0);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.errors, 1);
    }

    #[test]
    fn hit_ratio_handles_zero_queries() {
        let stats = EngineStats::new();
        assert!((stats.snapshot().cache_hit_ratio - 0.0).abs() < f64::EPSILON);

        stats.record_query();
        stats.record_query();
        stats.record_cache_hit();
        assert!((stats.snapshot().cache_hit_ratio - 0.5).abs() < f64::EPSILON);
    }
}
