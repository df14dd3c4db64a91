//! `PolicyRule` and `RedactionPattern`, persisted through `gateway-store`
//! (spec.md §3). Grounded on `policy::Rule`/`policy::PolicyFile`, replacing
//! YAML-file loading with the durable KV store as the rule source of truth.

use crate::ast::Condition;
use serde::{Deserialize, Serialize};

/// Action a matched rule (or the default) prescribes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Pass through unchanged.
    Allow,
    /// Terminate with denial.
    Block,
    /// Deep-redact matching string leaves in args/result.
    Redact,
    /// File an `ApprovalRequest` and surface an actionable error.
    RequireApproval,
}

/// The scope a rule applies to: global, category-scoped, plugin-scoped, or
/// both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    /// Domain category, e.g. `"email"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Plugin (backend) id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
}

impl Scope {
    /// A rule whose scope is entirely unset applies globally.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.category.is_none() && self.plugin_id.is_none()
    }

    /// Whether this scope matches the given `(plugin_id, category)` pair:
    /// global, or the relevant field matches.
    #[must_use]
    pub fn matches(&self, plugin_id: Option<&str>, category: Option<&str>) -> bool {
        if self.is_global() {
            return true;
        }
        let category_ok = match self.category.as_deref() {
            None => true,
            Some(c) => Some(c) == category,
        };
        let plugin_ok = match self.plugin_id.as_deref() {
            None => true,
            Some(p) => Some(p) == plugin_id,
        };
        category_ok && plugin_ok
    }
}

/// A declarative policy rule (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Unique, lexicographically-orderable id; also the priority tiebreak.
    pub id: String,
    /// Where this rule applies.
    pub scope: Scope,
    /// Action to take when `condition` matches.
    pub action: Action,
    /// Predicate AST evaluated against the call context.
    pub condition: Condition,
    /// Human-readable description, used as the audit reason if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Higher values are evaluated first.
    pub priority: i64,
    /// Disabled rules are filtered out before evaluation.
    pub enabled: bool,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    /// ISO-8601 last-update timestamp.
    pub updated_at: String,
}

/// A regex-based redaction pattern (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionPattern {
    /// Unique id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Global-substitution regex pattern.
    pub regex: String,
    /// Replacement text; defaults to `"[REDACTED]"`.
    #[serde(default = "default_replacement")]
    pub replacement: String,
    /// Disabled patterns are skipped at redaction time.
    pub enabled: bool,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
}

fn default_replacement() -> String {
    "[REDACTED]".to_string()
}
