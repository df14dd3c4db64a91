//! Virtual-id translation (spec.md §4.4's "Translation"): the boundary
//! across which no real account id or provider-local entity id ever
//! crosses into agent-facing responses.

use crate::backend::{Attachment, NormalizedRecord};
use gateway_vid::VidManager;
use serde::{Deserialize, Serialize};

/// The agent-facing mirror of [`NormalizedRecord`]: `id` and `account_id`
/// are virtual ids, allocated on the fly if this is the first time this
/// real pair has been surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualRecord {
    /// Virtual id standing in for `(accountId, providerEntityId)`.
    pub id: String,
    /// Virtual id standing in for the real account id.
    pub account_id: String,
    /// Subject line.
    pub subject: String,
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub timestamp_ms: u64,
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub has_attachments: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

/// Replace `record`'s real ids with virtual ones, allocating fresh
/// mappings as needed.
pub fn to_virtual(vids: &VidManager, record: NormalizedRecord) -> Result<VirtualRecord, gateway_core::GatewayError> {
    let id = vids.alloc_email(&record.account_id, &record.id)?;
    let account_id = vids.alloc_account(&record.account_id)?;
    Ok(VirtualRecord {
        id,
        account_id,
        subject: record.subject,
        from: record.from,
        to: record.to,
        cc: record.cc,
        bcc: record.bcc,
        reply_to: record.reply_to,
        body: record.body,
        html_body: record.html_body,
        snippet: record.snippet,
        timestamp_ms: record.timestamp_ms,
        is_read: record.is_read,
        is_starred: record.is_starred,
        labels: record.labels,
        thread_id: record.thread_id,
        has_attachments: record.has_attachments,
        attachments: record.attachments,
    })
}
