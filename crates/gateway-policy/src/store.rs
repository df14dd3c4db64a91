//! Durable CRUD for `PolicyRule` and `RedactionPattern` (spec.md §6's
//! `/api/policies` and `/api/redaction-patterns` management surface).
//! Grounded on `gateway_accounts::account`'s list/get/create/update/delete
//! shape over `gateway-store`, applied here to the two policy entity
//! trees instead of accounts.

use crate::rule::{Action, PolicyRule, RedactionPattern, Scope};
use gateway_core::{ids, GatewayError};
use gateway_store::{trees, Store};

/// List every policy rule, newest-created first is not guaranteed; callers
/// needing priority order should sort (the engine does its own sort at
/// evaluation time).
pub fn list_rules(store: &Store) -> Result<Vec<PolicyRule>, GatewayError> {
    let rows: Vec<(String, PolicyRule)> = store.iter_all(trees::RULES)?;
    Ok(rows.into_iter().map(|(_, r)| r).collect())
}

/// Fetch a single rule by id.
pub fn get_rule(store: &Store, id: &str) -> Result<Option<PolicyRule>, GatewayError> {
    store.get(trees::RULES, id)
}

/// Create a new rule. `priority` defaults to `0` and `enabled` to `true`
/// when not specified by the caller (the HTTP layer is expected to apply
/// its own request-shape defaults before calling this).
pub fn create_rule(
    store: &Store,
    scope: Scope,
    action: Action,
    condition: crate::ast::Condition,
    description: Option<String>,
    priority: i64,
    enabled: bool,
) -> Result<PolicyRule, GatewayError> {
    let now = ids::now_iso8601();
    let rule = PolicyRule {
        id: format!("rule_{}", ids::random_alnum(12)),
        scope,
        action,
        condition,
        description,
        priority,
        enabled,
        created_at: now.clone(),
        updated_at: now,
    };
    store.put(trees::RULES, &rule.id, &rule)?;
    Ok(rule)
}

/// Overwrite an existing rule's mutable fields, bumping `updated_at`.
/// `id` and `created_at` are preserved from the stored row.
pub fn update_rule(
    store: &Store,
    id: &str,
    scope: Scope,
    action: Action,
    condition: crate::ast::Condition,
    description: Option<String>,
    priority: i64,
    enabled: bool,
) -> Result<PolicyRule, GatewayError> {
    let existing: PolicyRule =
        store.get(trees::RULES, id)?.ok_or_else(|| GatewayError::Policy(format!("rule {id} not found")))?;
    let rule = PolicyRule {
        id: existing.id,
        scope,
        action,
        condition,
        description,
        priority,
        enabled,
        created_at: existing.created_at,
        updated_at: ids::now_iso8601(),
    };
    store.put(trees::RULES, id, &rule)?;
    Ok(rule)
}

/// Delete a rule by id. A no-op if the id is unknown.
pub fn delete_rule(store: &Store, id: &str) -> Result<(), GatewayError> {
    store.delete(trees::RULES, id)
}

/// List every redaction pattern.
pub fn list_patterns(store: &Store) -> Result<Vec<RedactionPattern>, GatewayError> {
    let rows: Vec<(String, RedactionPattern)> = store.iter_all(trees::REDACTION_PATTERNS)?;
    Ok(rows.into_iter().map(|(_, p)| p).collect())
}

/// Fetch a single redaction pattern by id.
pub fn get_pattern(store: &Store, id: &str) -> Result<Option<RedactionPattern>, GatewayError> {
    store.get(trees::REDACTION_PATTERNS, id)
}

/// Create a new redaction pattern.
pub fn create_pattern(
    store: &Store,
    name: String,
    regex: String,
    replacement: String,
    enabled: bool,
) -> Result<RedactionPattern, GatewayError> {
    let pattern = RedactionPattern {
        id: format!("pattern_{}", ids::random_alnum(12)),
        name,
        regex,
        replacement,
        enabled,
        created_at: ids::now_iso8601(),
    };
    store.put(trees::REDACTION_PATTERNS, &pattern.id, &pattern)?;
    Ok(pattern)
}

/// Overwrite an existing redaction pattern's mutable fields. `id` and
/// `created_at` are preserved.
pub fn update_pattern(
    store: &Store,
    id: &str,
    name: String,
    regex: String,
    replacement: String,
    enabled: bool,
) -> Result<RedactionPattern, GatewayError> {
    let existing: RedactionPattern = store
        .get(trees::REDACTION_PATTERNS, id)?
        .ok_or_else(|| GatewayError::Policy(format!("redaction pattern {id} not found")))?;
    let pattern = RedactionPattern { id: existing.id, name, regex, replacement, enabled, created_at: existing.created_at };
    store.put(trees::REDACTION_PATTERNS, id, &pattern)?;
    Ok(pattern)
}

/// Delete a redaction pattern by id. A no-op if the id is unknown.
pub fn delete_pattern(store: &Store, id: &str) -> Result<(), GatewayError> {
    store.delete(trees::REDACTION_PATTERNS, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Condition;
    use serde_json::json;

    #[test]
    fn rule_crud_round_trip() {
        let store = Store::open_temporary().unwrap();
        let rule = create_rule(&store, Scope::default(), Action::Block, Condition::Lit(json!(true)), None, 10, true).unwrap();
        assert_eq!(list_rules(&store).unwrap().len(), 1);

        let updated = update_rule(&store, &rule.id, Scope::default(), Action::Allow, Condition::Lit(json!(false)), Some("desc".into()), 20, false).unwrap();
        assert_eq!(updated.action, Action::Allow);
        assert_eq!(updated.priority, 20);
        assert!(!updated.enabled);
        assert_eq!(updated.created_at, rule.created_at);

        delete_rule(&store, &rule.id).unwrap();
        assert!(get_rule(&store, &rule.id).unwrap().is_none());
    }

    #[test]
    fn pattern_crud_round_trip() {
        let store = Store::open_temporary().unwrap();
        let pattern = create_pattern(&store, "ssn".into(), r"\d{3}-\d{2}-\d{4}".into(), "[REDACTED]".into(), true).unwrap();
        assert_eq!(list_patterns(&store).unwrap().len(), 1);

        let updated = update_pattern(&store, &pattern.id, "ssn-v2".into(), r"\d{9}".into(), "[HIDDEN]".into(), false).unwrap();
        assert_eq!(updated.name, "ssn-v2");
        assert!(!updated.enabled);

        delete_pattern(&store, &pattern.id).unwrap();
        assert!(get_pattern(&store, &pattern.id).unwrap().is_none());
    }

    #[test]
    fn update_unknown_rule_errors() {
        let store = Store::open_temporary().unwrap();
        let result = update_rule(&store, "nope", Scope::default(), Action::Allow, Condition::Lit(json!(true)), None, 0, true);
        assert!(result.is_err());
    }
}
