//! Append-only audit log (spec.md §4.7/§8 "Audit totality"). Grounded on
//! `event_log::JsonlEventLog`'s `append`/`read_range` shape and its
//! monotonic `EventId` key, re-targeted from a JSONL file onto
//! `gateway-store` so that `query`'s filters serve off a sorted scan
//! instead of a full-file parse.
//!
//! Keys are `"<13-digit zero-padded ms timestamp>_<10-digit zero-padded
//! sequence>"`; sled keeps each tree's keys in lexicographic order, so
//! iterating the `audits` tree already yields chronological order and
//! `cleanup`'s retention cutoff is a prefix comparison, not a full scan
//! with per-row timestamp parsing.

#![deny(unsafe_code)]

use gateway_core::{ids, GatewayError};
use gateway_store::{trees, Store};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Outcome of a completed `tools/call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The tool ran to completion without error.
    Success,
    /// Policy blocked or deferred the call.
    Denied,
    /// The tool, or the dispatch envelope, raised an error.
    Error,
}

/// The policy outcome attached to an audit entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionSummary {
    /// The action the policy engine prescribed (`"ALLOW"`, `"BLOCK"`, ...).
    pub action: String,
    /// The rule that matched, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Dotted paths redacted in args and/or result, unioned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redacted_fields: Vec<String>,
    /// Human-readable reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A single append-only audit record (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Store key / public id.
    pub id: String,
    /// ISO-8601 UTC timestamp.
    pub timestamp: String,
    /// Agent name, required (never defaulted; spec.md §9).
    pub agent_name: String,
    /// Agent version, if supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    /// Plugin the call targeted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
    /// Tool name invoked.
    pub tool_name: String,
    /// Caller-supplied arguments (post-redaction if `REDACT` applied).
    pub input_args: Value,
    /// The policy decision for this call.
    pub decision: DecisionSummary,
    /// Final outcome.
    pub status: Status,
    /// Error message, if `status == Error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Wall-clock execution time in milliseconds.
    pub execution_time_ms: u64,
    /// Short, non-sensitive summary of what happened (e.g. record count).
    pub data_summary: String,
    /// Free-form metadata (e.g. `accountCount`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A new entry before it's assigned an id/key; produced by the dispatch
/// envelope and handed to [`append`].
#[derive(Debug, Clone)]
pub struct NewEntry {
    /// See [`AuditEntry::agent_name`].
    pub agent_name: String,
    /// See [`AuditEntry::agent_version`].
    pub agent_version: Option<String>,
    /// See [`AuditEntry::plugin_id`].
    pub plugin_id: Option<String>,
    /// See [`AuditEntry::tool_name`].
    pub tool_name: String,
    /// See [`AuditEntry::input_args`].
    pub input_args: Value,
    /// See [`AuditEntry::decision`].
    pub decision: DecisionSummary,
    /// See [`AuditEntry::status`].
    pub status: Status,
    /// See [`AuditEntry::error_message`].
    pub error_message: Option<String>,
    /// See [`AuditEntry::execution_time_ms`].
    pub execution_time_ms: u64,
    /// See [`AuditEntry::data_summary`].
    pub data_summary: String,
    /// See [`AuditEntry::metadata`].
    pub metadata: Option<Value>,
}

/// Filters accepted by [`query`], [`count`], and [`get_stats`]. All fields
/// are optional; an unset field matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    /// Restrict to this plugin id.
    pub plugin_id: Option<String>,
    /// Restrict to this tool name.
    pub tool_name: Option<String>,
    /// Restrict to this status.
    pub status: Option<Status>,
    /// Restrict to this agent name.
    pub agent_name: Option<String>,
    /// Inclusive lower bound, milliseconds since epoch.
    pub since_ms: Option<u64>,
    /// Exclusive upper bound, milliseconds since epoch.
    pub until_ms: Option<u64>,
    /// Cap on the number of results `query` returns (most recent first).
    pub limit: Option<usize>,
}

impl Filters {
    fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(p) = &self.plugin_id {
            if entry.plugin_id.as_deref() != Some(p.as_str()) {
                return false;
            }
        }
        if let Some(t) = &self.tool_name {
            if &entry.tool_name != t {
                return false;
            }
        }
        if let Some(s) = self.status {
            if entry.status != s {
                return false;
            }
        }
        if let Some(a) = &self.agent_name {
            if &entry.agent_name != a {
                return false;
            }
        }
        true
    }
}

fn key_for(seq: u64, timestamp_ms: u64) -> String {
    format!("{timestamp_ms:013}_{seq:010}")
}

/// Append a new audit entry, assigning it a chronologically-sortable key.
/// Per spec.md §8's "Audit totality" property, this is called exactly once
/// per completed `tools/call`, including the error path.
pub fn append(store: &Store, new_entry: NewEntry) -> Result<AuditEntry, GatewayError> {
    let seq = ids::next_audit_id();
    let timestamp_ms = ids::now_ms();
    let id = key_for(seq, timestamp_ms);
    let entry = AuditEntry {
        id: id.clone(),
        timestamp: ids::now_iso8601(),
        agent_name: new_entry.agent_name,
        agent_version: new_entry.agent_version,
        plugin_id: new_entry.plugin_id,
        tool_name: new_entry.tool_name,
        input_args: new_entry.input_args,
        decision: new_entry.decision,
        status: new_entry.status,
        error_message: new_entry.error_message,
        execution_time_ms: new_entry.execution_time_ms,
        data_summary: new_entry.data_summary,
        metadata: new_entry.metadata,
    };
    store.put(trees::AUDITS, &id, &entry)?;
    Ok(entry)
}

fn all_in_range(store: &Store, since_ms: Option<u64>, until_ms: Option<u64>) -> Result<Vec<AuditEntry>, GatewayError> {
    let rows: Vec<(String, AuditEntry)> = store.iter_all(trees::AUDITS)?;
    Ok(rows
        .into_iter()
        .map(|(_, e)| e)
        .filter(|e| {
            let ts = e.id.split('_').next().and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
            at_or_after(since_ms, ts) && strictly_before(until_ms, ts)
        })
        .collect())
}

fn at_or_after(bound: Option<u64>, ts: u64) -> bool {
    bound.map_or(true, |since| ts >= since)
}

fn strictly_before(bound: Option<u64>, ts: u64) -> bool {
    bound.map_or(true, |until| ts < until)
}

/// Return entries matching `filters`, most-recent-first, capped at
/// `filters.limit` if set.
pub fn query(store: &Store, filters: &Filters) -> Result<Vec<AuditEntry>, GatewayError> {
    let mut rows = all_in_range(store, filters.since_ms, filters.until_ms)?;
    rows.retain(|e| filters.matches(e));
    rows.reverse();
    if let Some(limit) = filters.limit {
        rows.truncate(limit);
    }
    Ok(rows)
}

/// Count entries matching `filters` (ignores `limit`).
pub fn count(store: &Store, filters: &Filters) -> Result<usize, GatewayError> {
    let rows = all_in_range(store, filters.since_ms, filters.until_ms)?;
    Ok(rows.iter().filter(|e| filters.matches(e)).count())
}

/// Fetch a single entry by its id.
pub fn get_by_id(store: &Store, id: &str) -> Result<Option<AuditEntry>, GatewayError> {
    store.get(trees::AUDITS, id)
}

/// Aggregate counts over a window, by action/status/plugin/agent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    /// Total entries in the window.
    pub total: usize,
    /// Counts keyed by decision action.
    pub by_action: HashMap<String, usize>,
    /// Counts keyed by status.
    pub by_status: HashMap<String, usize>,
    /// Counts keyed by plugin id.
    pub by_plugin: HashMap<String, usize>,
    /// Counts keyed by agent name.
    pub by_agent: HashMap<String, usize>,
}

/// Compute [`Stats`] over `[since_ms, until_ms)`.
pub fn get_stats(store: &Store, since_ms: Option<u64>, until_ms: Option<u64>) -> Result<Stats, GatewayError> {
    let rows = all_in_range(store, since_ms, until_ms)?;
    let mut stats = Stats { total: rows.len(), ..Default::default() };
    for e in &rows {
        *stats.by_action.entry(e.decision.action.clone()).or_insert(0) += 1;
        *stats.by_status.entry(format!("{:?}", e.status)).or_insert(0) += 1;
        if let Some(p) = &e.plugin_id {
            *stats.by_plugin.entry(p.clone()).or_insert(0) += 1;
        }
        *stats.by_agent.entry(e.agent_name.clone()).or_insert(0) += 1;
    }
    Ok(stats)
}

/// Delete every entry older than `retention_days`. Returns the number of
/// entries removed.
pub fn cleanup(store: &Store, retention_days: u64) -> Result<usize, GatewayError> {
    let cutoff_ms = ids::now_ms().saturating_sub(retention_days * 24 * 60 * 60 * 1000);
    let rows: Vec<(String, AuditEntry)> = store.iter_all(trees::AUDITS)?;
    let mut removed = 0;
    for (key, entry) in rows {
        let ts = entry.id.split('_').next().and_then(|s| s.parse::<u64>().ok()).unwrap_or(0);
        if ts <= cutoff_ms {
            store.delete(trees::AUDITS, &key)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(tool: &str, status: Status) -> NewEntry {
        NewEntry {
            agent_name: "test-agent".into(),
            agent_version: None,
            plugin_id: Some("gmail".into()),
            tool_name: tool.into(),
            input_args: json!({}),
            decision: DecisionSummary { action: "ALLOW".into(), ..Default::default() },
            status,
            error_message: None,
            execution_time_ms: 12,
            data_summary: "ok".into(),
            metadata: None,
        }
    }

    #[test]
    fn append_then_get_by_id() {
        let store = Store::open_temporary().unwrap();
        let e = append(&store, entry("list_emails", Status::Success)).unwrap();
        let got = get_by_id(&store, &e.id).unwrap();
        assert_eq!(got.map(|g| g.id), Some(e.id));
    }

    #[test]
    fn query_filters_by_status_and_tool() {
        let store = Store::open_temporary().unwrap();
        append(&store, entry("list_emails", Status::Success)).unwrap();
        append(&store, entry("delete_account", Status::Denied)).unwrap();

        let denied = query(&store, &Filters { status: Some(Status::Denied), ..Default::default() }).unwrap();
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].tool_name, "delete_account");
    }

    #[test]
    fn query_is_most_recent_first_and_respects_limit() {
        let store = Store::open_temporary().unwrap();
        append(&store, entry("a", Status::Success)).unwrap();
        append(&store, entry("b", Status::Success)).unwrap();
        append(&store, entry("c", Status::Success)).unwrap();

        let got = query(&store, &Filters { limit: Some(2), ..Default::default() }).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].tool_name, "c");
        assert_eq!(got[1].tool_name, "b");
    }

    #[test]
    fn count_matches_query_length_without_limit() {
        let store = Store::open_temporary().unwrap();
        for _ in 0..5 {
            append(&store, entry("list_emails", Status::Success)).unwrap();
        }
        assert_eq!(count(&store, &Filters::default()).unwrap(), 5);
    }

    #[test]
    fn stats_aggregate_by_action_status_plugin_agent() {
        let store = Store::open_temporary().unwrap();
        append(&store, entry("list_emails", Status::Success)).unwrap();
        append(&store, entry("delete_account", Status::Denied)).unwrap();

        let stats = get_stats(&store, None, None).unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_plugin.get("gmail"), Some(&2));
        assert_eq!(stats.by_agent.get("test-agent"), Some(&2));
    }

    #[test]
    fn cleanup_removes_nothing_when_retention_is_long() {
        let store = Store::open_temporary().unwrap();
        append(&store, entry("list_emails", Status::Success)).unwrap();
        let removed = cleanup(&store, 365).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(count(&store, &Filters::default()).unwrap(), 1);
    }

    #[test]
    fn cleanup_removes_everything_when_retention_is_zero() {
        let store = Store::open_temporary().unwrap();
        append(&store, entry("list_emails", Status::Success)).unwrap();
        let removed = cleanup(&store, 0).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(count(&store, &Filters::default()).unwrap(), 0);
    }
}
