//! The policy decision engine: predicate AST, rule loading and ordering,
//! redaction, and the approval-request lifecycle, with a fail-closed
//! posture and a redact-then-rules pipeline. See [`engine`] for the
//! priority tie-break rule.

#![deny(unsafe_code)]

pub mod approval;
pub mod ast;
pub mod engine;
pub mod redact;
pub mod rule;
pub mod store;

pub use approval::{ApprovalRequest, ApprovalStatus, InvalidTransition};
pub use store::{
    create_pattern, create_rule, delete_pattern, delete_rule, get_pattern, get_rule, list_patterns, list_rules,
    update_pattern, update_rule,
};
pub use ast::Condition;
pub use engine::{Decision, Engine};
pub use redact::redact;
pub use rule::{Action, PolicyRule, RedactionPattern, Scope};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

/// Observer invoked for each decision the engine makes. Installed globally
/// via [`set_observer`]; intended for tests and in-process metrics.
pub trait PolicyObserver: Send + Sync {
    /// Called with the decision and the tool name that produced it.
    fn on_decision(&self, tool: &str, decision: &Decision);
}

static OBSERVER: OnceLock<RwLock<Option<Arc<dyn PolicyObserver>>>> = OnceLock::new();

/// Install or clear the process-wide policy observer.
pub fn set_observer(observer: Option<Arc<dyn PolicyObserver>>) {
    let cell = OBSERVER.get_or_init(|| RwLock::new(None));
    *cell.write().expect("observer lock poisoned") = observer;
}

/// Low-cardinality decision counters keyed by `{action}`.
#[derive(Default)]
pub struct PolicyMetrics {
    inner: Mutex<HashMap<String, u64>>,
}

impl PolicyMetrics {
    /// Current count for the given action string (e.g. `"BLOCK"`).
    pub fn decision_counter(&self, action: &str) -> u64 {
        self.inner.lock().expect("metrics lock poisoned").get(action).copied().unwrap_or(0)
    }

    fn inc(&self, action: &str) {
        let mut g = self.inner.lock().expect("metrics lock poisoned");
        *g.entry(action.to_string()).or_insert(0) += 1;
    }
}

static METRICS: OnceLock<PolicyMetrics> = OnceLock::new();

/// Access the global policy metrics registry.
pub fn policy_metrics() -> &'static PolicyMetrics {
    METRICS.get_or_init(PolicyMetrics::default)
}

/// Record a decision against the metrics registry and notify the observer,
/// if any. Called by `gateway-rpc`'s dispatch envelope after each
/// evaluation.
pub fn record_decision(tool: &str, decision: &Decision) {
    let action_str = format!("{:?}", decision.action).to_ascii_uppercase();
    policy_metrics().inc(&action_str);
    if let Some(lock) = OBSERVER.get() {
        if let Ok(r) = lock.read() {
            if let Some(obs) = r.as_ref() {
                obs.on_decision(tool, decision);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_decision_increments_metrics() {
        let decision =
            Decision { action: Action::Block, matched_rule_id: Some("r1".into()), reason: "x".into() };
        let before = policy_metrics().decision_counter("BLOCK");
        record_decision("delete_account", &decision);
        let after = policy_metrics().decision_counter("BLOCK");
        assert_eq!(after, before + 1);
    }

    #[test]
    fn observer_receives_decisions() {
        struct Capture(Mutex<Vec<String>>);
        impl PolicyObserver for Capture {
            fn on_decision(&self, tool: &str, _decision: &Decision) {
                self.0.lock().unwrap().push(tool.to_string());
            }
        }
        let capture = Arc::new(Capture(Mutex::new(Vec::new())));
        set_observer(Some(capture.clone()));
        let decision = Decision { action: Action::Allow, matched_rule_id: None, reason: "x".into() };
        record_decision("list_emails", &decision);
        assert_eq!(capture.0.lock().unwrap().as_slice(), ["list_emails"]);
        set_observer(None);
        let _ = json!({});
    }
}
