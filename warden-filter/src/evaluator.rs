//! The decision evaluator.
//!
//! A pure function over a materialized rule snapshot: no locks are held
//! while matching, so a slow regex can never stall a writer. The snapshot
//! order is total, the first match wins, and the fallthrough is a plain
//! allow, so repeated evaluation of the same inputs is deterministic.

use std::sync::Arc;

use warden_common::{Decision, ProcessContext};

use crate::{rule::CompiledRule, store::RuleStore};

/// Evaluate a canonical domain against a rule snapshot.
///
/// Disabled rules never match; scoped rules require a satisfying context.
/// Returns the first match in snapshot order, or an allow fallthrough.
#[must_use]
pub fn evaluate(
    snapshot: &[Arc<CompiledRule>],
    canonical: &str,
    context: Option<&ProcessContext>,
) -> Decision {
    for rule in snapshot {
        if !rule.enabled() {
            continue;
        }
        if !rule.matches_scope(context) {
            continue;
        }
        if rule.matches_query(canonical) {
            return Decision::matched(canonical, rule.action(), rule.id(), context.cloned());
        }
    }

    Decision::fallthrough(canonical, context.cloned())
}

/// Convenience wrapper binding the evaluator to a store.
#[derive(Clone)]
pub struct Evaluator {
    store: Arc<RuleStore>,
}

impl Evaluator {
    #[must_use]
    pub const fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }

    /// Snapshot the store and evaluate. The canonical form of `query` is the
    /// caller's responsibility on the hot path; this helper canonicalizes
    /// defensively for management-plane callers.
    #[must_use]
    pub fn decide(&self, query: &str, context: Option<&ProcessContext>) -> Decision {
        let canonical = crate::domain::canonicalize(query);
        evaluate(&self.store.snapshot(), &canonical, context)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use warden_common::Action;

    use crate::rule::{MatchMode, Rule};

    use super::*;

    fn store_with(rules: Vec<Rule>) -> Arc<RuleStore> {
        let store = Arc::new(RuleStore::new());
        for rule in rules {
            store.upsert(rule).unwrap();
        }
        store
    }

    #[test]
    fn first_match_in_priority_order_wins() {
        let store = store_with(vec![
            Rule::new("low", Action::Block, "example.com", MatchMode::Domain).with_priority(10),
            Rule::new("high", Action::Allow, "safe.example.com", MatchMode::Domain)
                .with_priority(100),
        ]);

        let safe = evaluate(&store.snapshot(), "safe.example.com", None);
        assert_eq!(safe.action, Action::Allow);
        assert_eq!(safe.rule_id.as_deref(), Some("high"));

        let bad = evaluate(&store.snapshot(), "bad.example.com", None);
        assert_eq!(bad.action, Action::Block);
        assert_eq!(bad.rule_id.as_deref(), Some("low"));
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let store = store_with(vec![
            Rule::new("first", Action::Allow, "example.com", MatchMode::Domain).with_priority(50),
            Rule::new("second", Action::Block, "example.com", MatchMode::Domain).with_priority(50),
        ]);

        let decision = evaluate(&store.snapshot(), "example.com", None);
        assert_eq!(decision.rule_id.as_deref(), Some("first"));
    }

    #[test]
    fn disabled_rules_never_match() {
        let store = store_with(vec![
            Rule::new("off", Action::Block, "example.com", MatchMode::Domain)
                .with_priority(100)
                .disabled(),
            Rule::new("on", Action::Log, "example.com", MatchMode::Domain).with_priority(1),
        ]);

        let decision = evaluate(&store.snapshot(), "example.com", None);
        assert_eq!(decision.rule_id.as_deref(), Some("on"));
        assert_eq!(decision.action, Action::Log);
    }

    #[test]
    fn scoped_rule_is_skipped_without_matching_context() {
        let store = store_with(vec![
            Rule::new("scoped", Action::Block, "example.com", MatchMode::Domain)
                .with_priority(100)
                .with_scope(None, Some("game")),
        ]);

        let unscoped = evaluate(&store.snapshot(), "example.com", None);
        assert_eq!(unscoped.action, Action::Allow);
        assert_eq!(unscoped.rule_id, None);

        let scoped = evaluate(
            &store.snapshot(),
            "example.com",
            Some(&ProcessContext::new(1234, "Game")),
        );
        assert_eq!(scoped.action, Action::Block);
        assert_eq!(scoped.rule_id.as_deref(), Some("scoped"));
    }

    #[test]
    fn fallthrough_is_allow_with_no_rule_id() {
        let decision = evaluate(&[], "anything.test", None);
        assert_eq!(decision.action, Action::Allow);
        assert_eq!(decision.rule_id, None);
        assert_eq!(decision.reason, "no matching rules");
    }

    #[test]
    fn evaluation_is_deterministic() {
        let store = store_with(vec![
            Rule::new("a", Action::Block, "x.test", MatchMode::Domain).with_priority(5),
            Rule::new("b", Action::Allow, "x.test", MatchMode::Domain).with_priority(5),
            Rule::new("c", Action::Log, "*.test", MatchMode::Wildcard).with_priority(5),
        ]);

        let first = evaluate(&store.snapshot(), "x.test", None);
        let second = evaluate(&store.snapshot(), "x.test", None);
        assert_eq!(first.action, second.action);
        assert_eq!(first.rule_id, second.rule_id);
        assert_eq!(first.reason, second.reason);
    }

    #[test]
    fn regex_rule_semantics_end_to_end() {
        let store = store_with(vec![
            Rule::new(
                "r2",
                Action::Block,
                r"^ads[0-9]+\.evil\.net$",
                MatchMode::Regex,
            )
            .with_priority(50),
        ]);
        let snapshot = store.snapshot();

        assert_eq!(evaluate(&snapshot, "ads42.evil.net", None).action, Action::Block);
        assert_eq!(evaluate(&snapshot, "ads.evil.net", None).action, Action::Allow);
        assert_eq!(evaluate(&snapshot, "ads42xevil.net", None).action, Action::Allow);
    }

    #[test]
    fn decide_canonicalizes_for_management_callers() {
        let store = store_with(vec![
            Rule::new("r1", Action::Block, "example.com", MatchMode::Domain).with_priority(1),
        ]);
        let evaluator = Evaluator::new(store);

        let decision = evaluator.decide("ADS.Example.COM.", None);
        assert_eq!(decision.action, Action::Block);
        assert_eq!(decision.query, "ads.example.com");
    }
}
