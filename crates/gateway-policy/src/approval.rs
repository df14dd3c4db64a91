//! `ApprovalRequest` persistence and its monotonic status transition
//! (spec.md §3/§8 scenario 3). Grounded on `gateway-store::put_if_absent`
//! for the initial insert and a plain `put` for the one-shot transition,
//! since approvals are never concurrently resolved twice in a meaningful
//! way (the second resolution attempt is rejected by the status check,
//! not by store-level CAS).

use gateway_core::{ids, GatewayError};
use gateway_store::Store;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const TREE: &str = gateway_store::trees::APPROVALS;

/// Status of an approval request. Transitions are monotonic:
/// `Pending -> Approved|Denied` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    /// Awaiting a dashboard decision.
    Pending,
    /// Approved, optionally with modified args.
    Approved,
    /// Denied.
    Denied,
}

/// A pending-or-resolved human approval (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique id, surfaced to the agent in the approval-required error.
    pub id: String,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    /// Plugin the original call targeted.
    pub plugin_id: Option<String>,
    /// Tool name of the original call.
    pub tool_name: String,
    /// Original caller-supplied args.
    pub args: Value,
    /// Id of the rule that required approval.
    pub rule_id: String,
    /// Current status.
    pub status: ApprovalStatus,
    /// Args the approver chose to allow through, if modified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_args: Option<Value>,
    /// ISO-8601 resolution timestamp, set once decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
}

/// Rejected because the request was not in `Pending` status.
#[derive(Debug, thiserror::Error)]
#[error("approval {id} is already resolved (status={status:?}); transitions are monotonic")]
pub struct InvalidTransition {
    /// The approval id the caller tried to resolve again.
    pub id: String,
    /// The status it was already in.
    pub status: ApprovalStatus,
}

/// File a new `pending` approval request and persist it.
pub fn file(
    store: &Store,
    plugin_id: Option<String>,
    tool_name: String,
    args: Value,
    rule_id: String,
) -> Result<ApprovalRequest, GatewayError> {
    let request = ApprovalRequest {
        id: format!("approval_{}", ids::random_alnum(16)),
        created_at: ids::now_iso8601(),
        plugin_id,
        tool_name,
        args,
        rule_id,
        status: ApprovalStatus::Pending,
        approved_args: None,
        resolved_at: None,
    };
    store.put(TREE, &request.id, &request)?;
    Ok(request)
}

/// Look up an approval by id.
pub fn get(store: &Store, id: &str) -> Result<Option<ApprovalRequest>, GatewayError> {
    store.get(TREE, id)
}

/// List every approval request, optionally restricted to `status`.
pub fn list(store: &Store, status: Option<ApprovalStatus>) -> Result<Vec<ApprovalRequest>, GatewayError> {
    let rows: Vec<(String, ApprovalRequest)> = store.iter_all(TREE)?;
    Ok(rows.into_iter().map(|(_, r)| r).filter(|r| status.map_or(true, |s| r.status == s)).collect())
}

/// Resolve a pending approval to `approved` or `denied`. Fails with
/// [`GatewayError::Policy`] wrapping [`InvalidTransition`] if the request
/// was not `Pending`.
pub fn resolve(
    store: &Store,
    id: &str,
    status: ApprovalStatus,
    approved_args: Option<Value>,
) -> Result<ApprovalRequest, GatewayError> {
    let mut request: ApprovalRequest = store
        .get(TREE, id)?
        .ok_or_else(|| GatewayError::Policy(format!("approval {id} not found")))?;

    if request.status != ApprovalStatus::Pending {
        return Err(GatewayError::Policy(
            InvalidTransition { id: id.to_string(), status: request.status }.to_string(),
        ));
    }

    request.status = status;
    request.approved_args = approved_args;
    request.resolved_at = Some(ids::now_iso8601());
    store.put(TREE, id, &request)?;
    Ok(request)
}
