//! The policy-evaluation `Context` document (§4.1) and the `ToolCallEnvelope`
//! used by the RPC dispatch envelope (§4.5).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Context supplied per policy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Tool name being invoked, e.g. `"list_emails"`.
    pub tool: String,
    /// Plugin (backend) id the tool call targets, if resolvable up front.
    pub plugin: Option<String>,
    /// Agent name, required on session `initialize` (spec.md §9: never
    /// defaulted to a hard-coded value).
    pub agent: String,
    /// Agent version, optional.
    pub agent_version: Option<String>,
    /// Caller-supplied tool arguments.
    pub args: Value,
    /// Domain category (email, calendar, task, ...), if known.
    pub category: Option<String>,
}

impl Context {
    /// Resolve a dotted path (`a.b.c`) against this context, represented as a
    /// JSON document for the predicate evaluator.
    pub fn as_value(&self) -> Value {
        serde_json::json!({
            "tool": self.tool,
            "plugin": self.plugin,
            "agent": self.agent,
            "agentVersion": self.agent_version,
            "args": self.args,
            "category": self.category,
        })
    }
}

/// A single `tools/call` invocation as it enters the dispatch envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEnvelope {
    /// Tool name.
    pub name: String,
    /// Caller-supplied arguments.
    pub arguments: Value,
    /// Session-scoped agent identity (from `initialize`).
    pub agent: String,
    /// Optional agent version.
    pub agent_version: Option<String>,
}
