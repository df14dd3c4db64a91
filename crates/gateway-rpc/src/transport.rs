//! The session-scoped JSON-RPC 2.0 transport (spec.md §4.5): one path,
//! `POST` for requests/notifications, `GET` for stream resumption, `DELETE`
//! for explicit teardown. Grounded on `pagi-xcurzens-gateway::main`'s
//! `Router::new().route(...).with_state(state)` wiring, generalized from a
//! fixed route table to the `Mcp-Session-Id`-keyed dispatch spec.md
//! describes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router as AxumRouter};
use serde_json::{json, Value};

use crate::dispatch::{dispatch_tool_call, DispatchContext};
use crate::protocol::{
    InitializeResult, RpcError, RpcRequest, RpcResponse, ServerInfo, ERR_INVALID_PARAMS, ERR_METHOD_NOT_FOUND,
    ERR_NO_SESSION,
};
use crate::state::AppState;
use crate::tools;
use gateway_crypto::KeyProvider;

/// Header the session id travels on, both directions.
pub const SESSION_HEADER: &str = "mcp-session-id";

const PROTOCOL_VERSION: &str = "2025-03-26";
const SERVER_NAME: &str = "trust-gateway";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the JSON-RPC transport's route table, to be merged into the full
/// app router and given a concrete `K` at `.with_state(...)` time.
pub fn router<K>() -> AxumRouter<Arc<AppState<K>>>
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    AxumRouter::new().route("/rpc", post(handle_post).get(handle_get).delete(handle_delete))
}

fn session_id_from(headers: &HeaderMap) -> Option<String> {
    headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn handle_post<K>(State(state): State<Arc<AppState<K>>>, headers: HeaderMap, Json(req): Json<RpcRequest>) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    let id = req.id.clone().unwrap_or(Value::Null);

    if req.method == "initialize" {
        return handle_initialize(&state, req);
    }

    let Some(session_id) = session_id_from(&headers) else {
        return json_rpc_error(id, ERR_NO_SESSION, "missing Mcp-Session-Id header");
    };
    let Some(session) = state.sessions.touch(&session_id) else {
        return json_rpc_error(id, ERR_NO_SESSION, "unknown or expired session");
    };

    match req.method.as_str() {
        "tools/list" => {
            let body = RpcResponse::success(id, tools::catalog_json());
            Json(body).into_response()
        }
        "tools/call" => {
            let params: crate::protocol::ToolCallParams = match serde_json::from_value(req.params) {
                Ok(p) => p,
                Err(e) => return json_rpc_error(id, ERR_INVALID_PARAMS, &format!("malformed tools/call params: {e}")),
            };
            let engine = match state.policy_engine() {
                Ok(e) => e,
                Err(e) => return json_rpc_error(id, crate::protocol::ERR_INTERNAL, &format!("failed to load policy: {e}")),
            };
            let ctx = DispatchContext {
                store: &state.store,
                router: &state.router,
                policy: &engine,
                agent: &session.agent,
                agent_version: session.agent_version.as_deref(),
            };
            let result = dispatch_tool_call(&ctx, &params.name, params.arguments).await;
            let value = serde_json::to_value(result).unwrap_or(Value::Null);
            Json(RpcResponse::success(id, value)).into_response()
        }
        other => json_rpc_error(id, ERR_METHOD_NOT_FOUND, &format!("unknown method: {other}")),
    }
}

fn handle_initialize<K>(state: &AppState<K>, req: RpcRequest) -> Response
where
    K: KeyProvider,
{
    let id = req.id.clone().unwrap_or(Value::Null);
    let params: crate::protocol::InitializeParams = match serde_json::from_value(req.params) {
        Ok(p) => p,
        Err(e) => return json_rpc_error(id, ERR_INVALID_PARAMS, &format!("initialize requires `agent`: {e}")),
    };

    let session_id = state.sessions.create(params.agent, params.agent_version);
    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION,
        server_info: ServerInfo { name: SERVER_NAME, version: SERVER_VERSION },
    };
    let value = serde_json::to_value(result).unwrap_or(Value::Null);

    let mut response = Json(RpcResponse::success(id, value)).into_response();
    if let Ok(header_value) = session_id.parse() {
        response.headers_mut().insert(HeaderName::from_static(SESSION_HEADER), header_value);
    }
    response
}

/// `GET /rpc`: stream resumption. This build has no long-lived SSE stream
/// to resume; it reports whether the session is still live so a client can
/// decide whether to re-`initialize`.
async fn handle_get<K>(State(state): State<Arc<AppState<K>>>, headers: HeaderMap) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    let Some(session_id) = session_id_from(&headers) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing Mcp-Session-Id header" }))).into_response();
    };
    match state.sessions.touch(&session_id) {
        Some(_) => (StatusCode::OK, Json(json!({ "status": "active" }))).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown or expired session" }))).into_response(),
    }
}

/// `DELETE /rpc`: explicit session teardown.
async fn handle_delete<K>(State(state): State<Arc<AppState<K>>>, headers: HeaderMap) -> Response
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    let Some(session_id) = session_id_from(&headers) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "missing Mcp-Session-Id header" }))).into_response();
    };
    if state.sessions.remove(&session_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown session" }))).into_response()
    }
}

fn json_rpc_error(id: Value, code: i64, message: &str) -> Response {
    Json(RpcResponse::failure(id, RpcError::new(code, message))).into_response()
}
