//! The decision engine: rules are sorted `(priority desc, id asc)` and the
//! first match wins outright, with no most-restrictive-wins severity
//! reordering — the lowest id among the highest-priority matches always
//! decides the outcome.

use crate::rule::{Action, PolicyRule};
use gateway_core::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of evaluating the rule set against a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// The action the caller must enforce.
    pub action: Action,
    /// The id of the rule that matched, if any (`None` means default action).
    pub matched_rule_id: Option<String>,
    /// Human-readable reason: the rule's description, or its id, or a
    /// fail-closed default message.
    pub reason: String,
}

/// Deterministic, fail-closed policy engine (spec.md §4.1's "Guarantees":
/// pure evaluation over an in-memory rule snapshot, safe under concurrent
/// evaluation of distinct requests).
#[derive(Debug, Clone, Default)]
pub struct Engine {
    rules: Vec<PolicyRule>,
    /// Action taken when no rule matches. spec.md §4.1 step 5: initial
    /// value `BLOCK`, fail-closed.
    default_action: Action,
}

impl Engine {
    /// Build an engine over a rule snapshot, with the given default action.
    #[must_use]
    pub fn new(rules: Vec<PolicyRule>, default_action: Action) -> Self {
        Self { rules, default_action }
    }

    /// Build an engine with the fail-closed default (`BLOCK`).
    #[must_use]
    pub fn with_rules(rules: Vec<PolicyRule>) -> Self {
        Self::new(rules, Action::Block)
    }

    /// Evaluate the rule set against `ctx` (spec.md §4.1 steps 1-5).
    #[must_use]
    pub fn evaluate(&self, ctx: &Context) -> Decision {
        let doc = ctx.as_value();
        let mut candidates: Vec<&PolicyRule> = self
            .rules
            .iter()
            .filter(|r| r.enabled)
            .filter(|r| r.scope.matches(ctx.plugin.as_deref(), ctx.category.as_deref()))
            .collect();

        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

        for rule in candidates {
            if rule.condition.evaluate(&doc) {
                return Decision {
                    action: rule.action,
                    matched_rule_id: Some(rule.id.clone()),
                    reason: rule.description.clone().unwrap_or_else(|| rule.id.clone()),
                };
            }
        }

        Decision {
            action: self.default_action,
            matched_rule_id: None,
            reason: "no rule matched; default action applied".to_string(),
        }
    }
}

/// Convenience for callers that already have a raw JSON context document
/// rather than a [`Context`] (e.g. audit replay tooling).
#[must_use]
pub fn matches(rule: &PolicyRule, doc: &Value) -> bool {
    rule.condition.evaluate(doc)
}

impl Default for Action {
    fn default() -> Self {
        Action::Block
    }
}
