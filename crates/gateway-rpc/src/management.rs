//! The HTTP management surface (spec.md §6): policies, redaction patterns,
//! approval requests, audit log queries, accounts, and the OAuth
//! start/callback/status/delete routes — everything the dashboard talks
//! to. Grounded on the `other_examples` mcp-gateway `handler.rs`'s
//! `check_admin_auth` constant-time bearer check and its
//! `Result<Json<T>, Response>`-per-handler shape, generalized from one
//! revocation endpoint to the full CRUD surface below.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router as AxumRouter};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;

use gateway_accounts::account as accounts;
use gateway_core::GatewayError;
use gateway_crypto::KeyProvider;
use gateway_policy::ast::Condition;
use gateway_policy::rule::{Action, Scope};
use gateway_policy::{approval, store as policy_store, ApprovalStatus};

use crate::state::AppState;

/// Build the management API's route table, to be merged alongside the RPC
/// transport under the same `axum::serve`. Takes the already-built state
/// (rather than assembling it lazily inside `with_state`) because the
/// admin-token guard needs a concrete value to compare against at
/// middleware-registration time, not just a type.
pub fn router<K>(state: Arc<AppState<K>>) -> AxumRouter<Arc<AppState<K>>>
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    let api = AxumRouter::new()
        .route("/api/policies", get(list_policies::<K>).post(create_policy::<K>))
        .route("/api/policies/:id", get(get_policy::<K>).put(update_policy::<K>).delete(delete_policy::<K>))
        .route("/api/redaction-patterns", get(list_patterns::<K>).post(create_pattern::<K>))
        .route(
            "/api/redaction-patterns/:id",
            get(get_pattern::<K>).put(update_pattern::<K>).delete(delete_pattern::<K>),
        )
        .route("/api/approval-requests", get(list_approvals::<K>))
        .route("/api/approval-requests/:id", get(get_approval::<K>))
        .route("/api/approval-requests/:id/approve", post(approve_approval::<K>))
        .route("/api/approval-requests/:id/deny", post(deny_approval::<K>))
        .route("/api/audit-logs", get(query_audit_logs::<K>))
        .route("/api/audit-logs/recent", get(recent_audit_logs::<K>))
        .route("/api/audit-logs/:id", get(get_audit_log::<K>))
        .route("/api/audit-stats", get(audit_stats::<K>))
        .route("/api/accounts", get(list_accounts::<K>).post(create_account::<K>))
        .route("/api/accounts/:id", get(get_account::<K>).put(update_account::<K>).delete(delete_account::<K>))
        .route("/api/accounts/:id/set-primary", post(set_primary_account::<K>))
        .route_layer(axum::middleware::from_fn_with_state(state, require_admin::<K>));

    AxumRouter::new()
        .route("/health", get(health::<K>))
        .merge(api)
        .route("/oauth/:provider/start", get(oauth_start::<K>))
        .route("/oauth/:provider/status", get(oauth_status::<K>))
        .route("/oauth/:provider", delete(oauth_disconnect::<K>))
        .route("/oauth/callback/:provider", get(oauth_callback::<K>))
        .route("/oauth/callback", get(oauth_callback_no_provider::<K>))
}

async fn require_admin<K>(
    State(state): State<Arc<AppState<K>>>,
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")));

    // An unset admin token (empty string) must never match anything,
    // including a presented empty bearer token — `ct_eq(b"", b"")` is
    // `true`, which would otherwise grant admin access to any caller
    // that sends `Authorization: Bearer ` once `ADMIN_TOKEN` is unset.
    let matches: bool = !state.admin_token.is_empty()
        && provided.map_or(false, |p| p.as_bytes().ct_eq(state.admin_token.as_bytes()).into());

    if matches {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [("WWW-Authenticate", "Bearer")],
            Json(json!({ "error": "unauthorized", "message": "invalid or missing admin token" })),
        )
            .into_response()
    }
}

fn status_for(e: &GatewayError) -> StatusCode {
    match e {
        GatewayError::Store(msg) if msg.contains("not found") => StatusCode::NOT_FOUND,
        GatewayError::Policy(msg) if msg.contains("not found") => StatusCode::NOT_FOUND,
        GatewayError::StoreConflict(_) => StatusCode::CONFLICT,
        GatewayError::Policy(_) | GatewayError::Protocol(_) => StatusCode::BAD_REQUEST,
        GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
        GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        GatewayError::Provider { .. } => StatusCode::BAD_GATEWAY,
        GatewayError::Store(_) | GatewayError::Crypto(_) | GatewayError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn err_response(e: GatewayError) -> Response {
    let status = status_for(&e);
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health<K>(State(state): State<Arc<AppState<K>>>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    let plugin_count = accounts::list_accounts(&state.store, None).map(|a| a.len()).unwrap_or(0);
    Json(json!({
        "status": "ok",
        "sessionCount": state.sessions.len(),
        "pluginCount": plugin_count,
        "toolCount": crate::tools::TOOL_NAMES.len(),
    }))
    .into_response()
}

// ── Policies ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PolicyRuleRequest {
    #[serde(default)]
    scope: Scope,
    action: Action,
    condition: Condition,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: i64,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

async fn list_policies<K>(State(state): State<Arc<AppState<K>>>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match policy_store::list_rules(&state.store) {
        Ok(rules) => Json(rules).into_response(),
        Err(e) => err_response(e),
    }
}

async fn get_policy<K>(State(state): State<Arc<AppState<K>>>, Path(id): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match policy_store::get_rule(&state.store, &id) {
        Ok(Some(rule)) => Json(rule).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": format!("rule {id} not found") }))).into_response(),
        Err(e) => err_response(e),
    }
}

async fn create_policy<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Json(req): Json<PolicyRuleRequest>,
) -> Response {
    match policy_store::create_rule(&state.store, req.scope, req.action, req.condition, req.description, req.priority, req.enabled) {
        Ok(rule) => (StatusCode::CREATED, Json(rule)).into_response(),
        Err(e) => err_response(e),
    }
}

async fn update_policy<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Path(id): Path<String>,
    Json(req): Json<PolicyRuleRequest>,
) -> Response {
    match policy_store::update_rule(&state.store, &id, req.scope, req.action, req.condition, req.description, req.priority, req.enabled) {
        Ok(rule) => Json(rule).into_response(),
        Err(e) => err_response(e),
    }
}

async fn delete_policy<K>(State(state): State<Arc<AppState<K>>>, Path(id): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match policy_store::delete_rule(&state.store, &id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => err_response(e),
    }
}

// ── Redaction patterns ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RedactionPatternRequest {
    name: String,
    regex: String,
    #[serde(default = "default_replacement")]
    replacement: String,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_replacement() -> String {
    "[REDACTED]".to_string()
}

async fn list_patterns<K>(State(state): State<Arc<AppState<K>>>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match policy_store::list_patterns(&state.store) {
        Ok(patterns) => Json(patterns).into_response(),
        Err(e) => err_response(e),
    }
}

async fn get_pattern<K>(State(state): State<Arc<AppState<K>>>, Path(id): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match policy_store::get_pattern(&state.store, &id) {
        Ok(Some(pattern)) => Json(pattern).into_response(),
        Ok(None) => {
            (StatusCode::NOT_FOUND, Json(json!({ "error": format!("redaction pattern {id} not found") }))).into_response()
        }
        Err(e) => err_response(e),
    }
}

async fn create_pattern<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Json(req): Json<RedactionPatternRequest>,
) -> Response {
    match policy_store::create_pattern(&state.store, req.name, req.regex, req.replacement, req.enabled) {
        Ok(pattern) => (StatusCode::CREATED, Json(pattern)).into_response(),
        Err(e) => err_response(e),
    }
}

async fn update_pattern<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Path(id): Path<String>,
    Json(req): Json<RedactionPatternRequest>,
) -> Response {
    match policy_store::update_pattern(&state.store, &id, req.name, req.regex, req.replacement, req.enabled) {
        Ok(pattern) => Json(pattern).into_response(),
        Err(e) => err_response(e),
    }
}

async fn delete_pattern<K>(State(state): State<Arc<AppState<K>>>, Path(id): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match policy_store::delete_pattern(&state.store, &id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => err_response(e),
    }
}

// ── Approval requests ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
struct ApprovalListQuery {
    status: Option<ApprovalStatus>,
}

#[derive(Debug, Deserialize, Default)]
struct ApproveRequest {
    #[serde(default)]
    approved_args: Option<serde_json::Value>,
}

async fn list_approvals<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Query(q): Query<ApprovalListQuery>,
) -> Response {
    match approval::list(&state.store, q.status) {
        Ok(requests) => Json(requests).into_response(),
        Err(e) => err_response(e),
    }
}

async fn get_approval<K>(State(state): State<Arc<AppState<K>>>, Path(id): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match approval::get(&state.store, &id) {
        Ok(Some(req)) => Json(req).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": format!("approval {id} not found") }))).into_response(),
        Err(e) => err_response(e),
    }
}

async fn approve_approval<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> Response {
    match approval::resolve(&state.store, &id, ApprovalStatus::Approved, req.approved_args) {
        Ok(resolved) => Json(resolved).into_response(),
        Err(e) => err_response(e),
    }
}

async fn deny_approval<K>(State(state): State<Arc<AppState<K>>>, Path(id): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match approval::resolve(&state.store, &id, ApprovalStatus::Denied, None) {
        Ok(resolved) => Json(resolved).into_response(),
        Err(e) => err_response(e),
    }
}

// ── Audit logs ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
struct AuditLogQuery {
    plugin_id: Option<String>,
    tool_name: Option<String>,
    status: Option<gateway_audit::Status>,
    agent_name: Option<String>,
    since_ms: Option<u64>,
    until_ms: Option<u64>,
    limit: Option<usize>,
}

impl From<AuditLogQuery> for gateway_audit::Filters {
    fn from(q: AuditLogQuery) -> Self {
        gateway_audit::Filters {
            plugin_id: q.plugin_id,
            tool_name: q.tool_name,
            status: q.status,
            agent_name: q.agent_name,
            since_ms: q.since_ms,
            until_ms: q.until_ms,
            limit: q.limit,
        }
    }
}

async fn query_audit_logs<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Query(q): Query<AuditLogQuery>,
) -> Response {
    match gateway_audit::query(&state.store, &q.into()) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => err_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    #[serde(default = "default_recent_limit")]
    limit: usize,
}

fn default_recent_limit() -> usize {
    20
}

async fn recent_audit_logs<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Query(q): Query<RecentQuery>,
) -> Response {
    let filters = gateway_audit::Filters { limit: Some(q.limit), ..Default::default() };
    match gateway_audit::query(&state.store, &filters) {
        Ok(entries) => Json(entries).into_response(),
        Err(e) => err_response(e),
    }
}

async fn get_audit_log<K>(State(state): State<Arc<AppState<K>>>, Path(id): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match gateway_audit::get_by_id(&state.store, &id) {
        Ok(Some(entry)) => Json(entry).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": format!("audit entry {id} not found") }))).into_response(),
        Err(e) => err_response(e),
    }
}

#[derive(Debug, Deserialize, Default)]
struct StatsQuery {
    since_ms: Option<u64>,
    until_ms: Option<u64>,
}

async fn audit_stats<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Query(q): Query<StatsQuery>,
) -> Response {
    match gateway_audit::get_stats(&state.store, q.since_ms, q.until_ms) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => err_response(e),
    }
}

// ── Accounts ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AccountListQuery {
    plugin_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateAccountRequest {
    plugin_id: String,
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UpdateAccountRequest {
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
}

async fn list_accounts<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Query(q): Query<AccountListQuery>,
) -> Response {
    match accounts::list_accounts(&state.store, q.plugin_id.as_deref()) {
        Ok(accounts) => Json(accounts).into_response(),
        Err(e) => err_response(e),
    }
}

async fn get_account<K>(State(state): State<Arc<AppState<K>>>, Path(id): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match accounts::get_account(&state.store, &id) {
        Ok(Some(account)) => Json(account).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": format!("account {id} not found") }))).into_response(),
        Err(e) => err_response(e),
    }
}

async fn create_account<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Json(req): Json<CreateAccountRequest>,
) -> Response {
    match accounts::create_account(&state.store, req.plugin_id, req.email, req.display_name, req.metadata) {
        Ok(account) => (StatusCode::CREATED, Json(account)).into_response(),
        Err(e) => err_response(e),
    }
}

async fn update_account<K: KeyProvider + Clone + Send + Sync + 'static>(
    State(state): State<Arc<AppState<K>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAccountRequest>,
) -> Response {
    match accounts::update_account(&state.store, &id, req.email, req.display_name, req.metadata) {
        Ok(account) => Json(account).into_response(),
        Err(e) => err_response(e),
    }
}

async fn delete_account<K>(State(state): State<Arc<AppState<K>>>, Path(id): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match accounts::delete_account(&state.store, &id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => err_response(e),
    }
}

async fn set_primary_account<K>(State(state): State<Arc<AppState<K>>>, Path(id): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match accounts::set_primary(&state.store, &id) {
        Ok(account) => Json(account).into_response(),
        Err(e) => err_response(e),
    }
}

// ── OAuth ───────────────────────────────────────────────────────────────

async fn oauth_start<K>(State(state): State<Arc<AppState<K>>>, Path(provider): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match state.oauth.start(&provider) {
        Ok(start) => Json(json!({ "authUrl": start.auth_url })).into_response(),
        Err(e) => err_response(e),
    }
}

async fn oauth_status<K>(State(state): State<Arc<AppState<K>>>, Path(provider): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match state.oauth.status(&provider) {
        Ok(connected) => Json(json!({ "connected": connected })).into_response(),
        Err(e) => err_response(e),
    }
}

async fn oauth_disconnect<K>(State(state): State<Arc<AppState<K>>>, Path(provider): Path<String>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match state.oauth.disconnect(&provider) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => err_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct OauthCallbackQuery {
    code: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct OauthCallbackQueryWithProvider {
    provider: String,
    code: String,
    state: String,
}

async fn oauth_callback<K>(
    State(state): State<Arc<AppState<K>>>,
    Path(provider): Path<String>,
    Query(q): Query<OauthCallbackQuery>,
) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    oauth_callback_landing(&state, &provider, &q.code, &q.state).await
}

async fn oauth_callback_no_provider<K>(
    State(state): State<Arc<AppState<K>>>,
    Query(q): Query<OauthCallbackQueryWithProvider>,
) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    oauth_callback_landing(&state, &q.provider, &q.code, &q.state).await
}

async fn oauth_callback_landing<K>(state: &AppState<K>, provider: &str, code: &str, state_param: &str) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    match state.oauth.callback(provider, code, state_param).await {
        Ok(result) => Html(format!(
            "<html><body><h1>Connected</h1><p>{} is now linked to {}.</p></body></html>",
            provider, result.account.email
        ))
        .into_response(),
        Err(e) => Html(format!("<html><body><h1>Connection failed</h1><p>{e}</p></body></html>")).into_response(),
    }
}
