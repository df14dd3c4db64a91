//! The static, universal tool catalog (spec.md §6). Every provider domain
//! exposed by the router answers to the same four tool names; `category`
//! (used for policy scoping) is fixed to `"email"` since mail is the only
//! domain spec.md's tool catalog names explicitly.

use serde_json::{json, Value};

use crate::protocol::ToolDescriptor;

/// Domain/category this build of the catalog serves. spec.md's Non-goals
/// leave calendar/tasks tool names unspecified; the router itself is
/// domain-generic (see `gateway-router::PluginRegistry`), so adding a
/// second catalog is a matter of adding entries here, not touching the
/// dispatch envelope.
pub const EMAIL_CATEGORY: &str = "email";

/// Every tool name recognized by [`crate::dispatch::dispatch_tool_call`].
pub const TOOL_NAMES: &[&str] = &["list_emails", "read_email", "send_email", "search_emails"];

/// Whether `name` is a recognized tool (spec.md §4.5 step 2).
#[must_use]
pub fn is_known_tool(name: &str) -> bool {
    TOOL_NAMES.contains(&name)
}

/// Build the static `tools/list` catalog.
#[must_use]
pub fn catalog() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "list_emails",
            description: "List recent emails across every connected mail account, newest first.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "max_results": {"type": "integer", "default": 10},
                    "query": {"type": "string"},
                    "labels": {"type": "array", "items": {"type": "string"}},
                    "isRead": {"type": "boolean"}
                }
            }),
        },
        ToolDescriptor {
            name: "read_email",
            description: "Fetch a single email by its virtual id.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "email_id": {"type": "string"}
                },
                "required": ["email_id"]
            }),
        },
        ToolDescriptor {
            name: "send_email",
            description: "Send an email via a connected mail account.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "to": {"type": "array", "items": {"type": "string"}},
                    "subject": {"type": "string"},
                    "body": {"type": "string"},
                    "cc": {"type": "array", "items": {"type": "string"}},
                    "bcc": {"type": "array", "items": {"type": "string"}},
                    "htmlBody": {"type": "string"},
                    "replyTo": {"type": "string"},
                    "account_id": {"type": "string"}
                },
                "required": ["to", "subject", "body"]
            }),
        },
        ToolDescriptor {
            name: "search_emails",
            description: "Full-text/structured search across every connected mail account.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "max_results": {"type": "integer", "default": 20},
                    "from": {"type": "string"},
                    "to": {"type": "string"},
                    "subject": {"type": "string"},
                    "hasAttachment": {"type": "boolean"},
                    "dateFrom": {"type": "integer"},
                    "dateTo": {"type": "integer"}
                },
                "required": ["query"]
            }),
        },
    ]
}

/// Serialize the catalog as the `tools` array `tools/list` returns.
#[must_use]
pub fn catalog_json() -> Value {
    json!({ "tools": catalog() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_catalog_entry_is_a_known_tool() {
        for tool in catalog() {
            assert!(is_known_tool(tool.name));
        }
    }

    #[test]
    fn unknown_tool_is_rejected() {
        assert!(!is_known_tool("delete_everything"));
    }
}
