//! The provider-backend capability boundary (spec.md §4.4's "Account
//! discovery" and §6's tool catalog). Grounded on `plugin_host`'s
//! capability-style trait around an external execution unit, generalized
//! here from a WASM sandbox boundary to a native provider-account
//! capability interface — spec.md's Non-goals exclude "the concrete shape
//! of individual provider operations", not the trait boundary itself.

use async_trait::async_trait;
use gateway_core::GatewayError;
use serde::{Deserialize, Serialize};

/// An attachment on a [`NormalizedRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    /// Provider-local attachment id.
    pub id: String,
    /// File name.
    pub filename: String,
    /// MIME type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Size in bytes, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Provider-agnostic email envelope (spec.md §3). This is the internal,
/// real-id-bearing shape; [`crate::translate::VirtualRecord`] is the
/// agent-facing variant with every real id swapped for its virtual form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Provider-local record id.
    pub id: String,
    /// The real account id this record belongs to.
    pub account_id: String,
    /// The backend/plugin id that produced this record.
    pub plugin_id: String,
    /// Subject line.
    pub subject: String,
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Cc addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<Vec<String>>,
    /// Bcc addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<Vec<String>>,
    /// Reply-to address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    /// Plain-text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// HTML body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    /// Short preview snippet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Milliseconds since epoch; the merge/sort key (spec.md §4.4).
    pub timestamp_ms: u64,
    /// Read state.
    pub is_read: bool,
    /// Starred/flagged state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,
    /// Provider labels/folders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    /// Conversation/thread id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Whether this record has attachments.
    pub has_attachments: bool,
    /// Attachment metadata, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

/// Filters accepted by [`ProviderBackend::list`].
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    /// Maximum records to return from this one account (pre-merge cap).
    pub max_results: usize,
    /// Free-text query, if the backend supports it.
    pub query: Option<String>,
    /// Restrict to these labels/folders.
    pub labels: Option<Vec<String>>,
    /// Restrict to read/unread state.
    pub is_read: Option<bool>,
}

/// Filters accepted by [`ProviderBackend::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    /// Free-text query.
    pub query: String,
    /// Maximum records to return from this one account (pre-merge cap).
    pub max_results: usize,
    /// Restrict to this sender.
    pub from: Option<String>,
    /// Restrict to this recipient.
    pub to: Option<String>,
    /// Restrict to this subject substring.
    pub subject: Option<String>,
    /// Restrict to records with/without attachments.
    pub has_attachment: Option<bool>,
    /// Inclusive lower bound, milliseconds since epoch.
    pub date_from_ms: Option<u64>,
    /// Exclusive upper bound, milliseconds since epoch.
    pub date_to_ms: Option<u64>,
}

/// A message to send via [`ProviderBackend::send`].
#[derive(Debug, Clone)]
pub struct SendParams {
    /// Recipient addresses. Required, non-empty.
    pub to: Vec<String>,
    /// Subject line. Required, non-empty.
    pub subject: String,
    /// Plain-text body. Required, non-empty.
    pub body: String,
    /// Cc addresses.
    pub cc: Option<Vec<String>>,
    /// Bcc addresses.
    pub bcc: Option<Vec<String>>,
    /// HTML body.
    pub html_body: Option<String>,
    /// Reply-to address.
    pub reply_to: Option<String>,
}

impl SendParams {
    /// Validate the required fields per spec.md §4.4's write contract.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.to.is_empty() {
            return Err(GatewayError::Protocol("send_email: `to` must be non-empty".into()));
        }
        if self.subject.trim().is_empty() {
            return Err(GatewayError::Protocol("send_email: `subject` is required".into()));
        }
        if self.body.trim().is_empty() {
            return Err(GatewayError::Protocol("send_email: `body` is required".into()));
        }
        Ok(())
    }
}

/// A live account: the stored [`gateway_accounts::Account`] composed with
/// its decrypted credential payload, as backends need it (spec.md §4.4:
/// "account ⊕ credentialData").
#[derive(Debug, Clone)]
pub struct LiveAccount {
    /// The real (non-virtual) account id.
    pub account_id: String,
    /// Backend/plugin id.
    pub plugin_id: String,
    /// Human-facing email address.
    pub email: String,
    /// Decrypted credential payload, backend-specific format.
    pub credential: Vec<u8>,
}

/// The uniform contract every concrete provider integration implements
/// (spec.md §4.4's "Provider Backends" row, §9's "swappable without
/// touching the router"). Concrete backends — real mail/calendar SDKs —
/// are external collaborators per spec.md §1; this crate ships only the
/// trait and in-memory mocks for tests.
#[async_trait]
pub trait ProviderBackend: Send + Sync {
    /// List records for one account, newest-affecting filters applied
    /// backend-side where supported.
    async fn list(&self, account: &LiveAccount, params: &ListParams) -> Result<Vec<NormalizedRecord>, GatewayError>;

    /// Fetch a single record by its provider-local id.
    async fn read(&self, account: &LiveAccount, provider_entity_id: &str) -> Result<NormalizedRecord, GatewayError>;

    /// Send a message, returning the provider's message id (opaque to the
    /// agent).
    async fn send(&self, account: &LiveAccount, message: &SendParams) -> Result<String, GatewayError>;

    /// Full-text/structured search for one account.
    async fn search(&self, account: &LiveAccount, params: &SearchParams) -> Result<Vec<NormalizedRecord>, GatewayError>;
}
