//! Policy evaluation for the warden service: the authoritative rule store,
//! the short-TTL decision cache, and the evaluator that turns a query plus an
//! optional process scope into a [`warden_common::Decision`].

pub mod backend;
pub mod cache;
pub mod domain;
pub mod error;
pub mod evaluator;
pub mod rule;
pub mod store;

pub use backend::{MemoryBackend, RuleBackend};
pub use cache::{CacheConfig, DecisionCache, fingerprint};
pub use domain::canonicalize;
pub use error::RuleError;
pub use evaluator::{Evaluator, evaluate};
pub use rule::{CompiledRule, MatchMode, Rule};
pub use store::RuleStore;
