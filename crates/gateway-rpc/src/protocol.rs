//! JSON-RPC 2.0 wire shapes for the session transport (spec.md §4.5, §6).
//! Grounded on the `other_examples` mcp-gateway `handler.rs`'s
//! request/response struct conventions, adapted from RFC 8693 token
//! exchange to JSON-RPC 2.0 envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `-32000`: no valid session id on a non-`initialize` request.
pub const ERR_NO_SESSION: i64 = -32000;
/// `-32601`: unrecognized method or tool name.
pub const ERR_METHOD_NOT_FOUND: i64 = -32601;
/// `-32602`: malformed params.
pub const ERR_INVALID_PARAMS: i64 = -32602;
/// `-32603`: anything else that blew up inside the dispatch envelope.
pub const ERR_INTERNAL: i64 = -32603;

/// An inbound JSON-RPC 2.0 request or notification.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    /// Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }
}

/// A JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl RpcResponse {
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", result: Some(result), error: None, id }
    }

    #[must_use]
    pub fn failure(id: Value, error: RpcError) -> Self {
        Self { jsonrpc: "2.0", result: None, error: Some(error), id }
    }
}

/// `initialize` params: the client MUST supply `agent`. There is no
/// hard-coded default identity — every session is attributed to whatever
/// name the caller declares.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeParams {
    pub agent: String,
    #[serde(default, rename = "agentVersion")]
    pub agent_version: Option<String>,
}

/// `initialize` result.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: &'static str,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// Server identity returned from `initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// `tools/call` params (spec.md §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// One block of `tools/call` result content.
#[derive(Debug, Clone, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl ContentBlock {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { kind: "text", text: text.into() }
    }
}

/// `tools/call` result (spec.md §6).
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    #[must_use]
    pub fn ok(text: impl Into<String>) -> Self {
        Self { content: vec![ContentBlock::text(text)], is_error: false }
    }

    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self { content: vec![ContentBlock::text(text)], is_error: true }
    }
}

/// One entry of the static tool catalog returned by `tools/list`
/// (spec.md §6's "Tool catalog (universal)").
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}
