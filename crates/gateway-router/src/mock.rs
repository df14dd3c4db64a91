//! In-memory `ProviderBackend` mocks for exercising the router without a
//! real provider integration (spec.md §4's explicit non-goal: "the concrete
//! shape of individual provider operations" is out of scope, but the
//! fan-out/retry/rate-limit machinery still needs something to fan out to
//! in tests). Grounded on `plugin_host`'s in-memory test doubles for its
//! capability trait, generalized to [`ProviderBackend`].
//!
//! Only compiled under `cfg(test)` or the `test-util` feature, mirroring
//! `gateway-store::Store::open_temporary`'s gating.

use crate::backend::{LiveAccount, ListParams, NormalizedRecord, ProviderBackend, SearchParams, SendParams};
use async_trait::async_trait;
use gateway_core::GatewayError;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A backend that always serves a fixed, per-account set of records and
/// always succeeds. Useful for exercising fan-out merge/sort/cap behavior.
#[derive(Default)]
pub struct StaticMockBackend {
    records_by_account: RwLock<HashMap<String, Vec<NormalizedRecord>>>,
    sent: RwLock<Vec<(String, SendParams)>>,
}

impl StaticMockBackend {
    /// An empty backend; seed it with [`Self::seed`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the record set an account's `list`/`search`/`read` calls
    /// draw from.
    pub fn seed(&self, account_id: &str, records: Vec<NormalizedRecord>) {
        self.records_by_account.write().insert(account_id.to_string(), records);
    }

    /// Messages handed to [`ProviderBackend::send`] so far, `(account_id,
    /// params)`.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<(String, SendParams)> {
        self.sent.read().clone()
    }
}

#[async_trait]
impl ProviderBackend for StaticMockBackend {
    async fn list(&self, account: &LiveAccount, params: &ListParams) -> Result<Vec<NormalizedRecord>, GatewayError> {
        let mut records = self.records_by_account.read().get(&account.account_id).cloned().unwrap_or_default();
        if let Some(is_read) = params.is_read {
            records.retain(|r| r.is_read == is_read);
        }
        if params.max_results > 0 {
            records.truncate(params.max_results);
        }
        Ok(records)
    }

    async fn read(&self, account: &LiveAccount, provider_entity_id: &str) -> Result<NormalizedRecord, GatewayError> {
        self.records_by_account
            .read()
            .get(&account.account_id)
            .and_then(|records| records.iter().find(|r| r.id == provider_entity_id).cloned())
            .ok_or_else(|| GatewayError::Protocol(format!("no such record {provider_entity_id}")))
    }

    async fn send(&self, account: &LiveAccount, message: &SendParams) -> Result<String, GatewayError> {
        message.validate()?;
        self.sent.write().push((account.account_id.clone(), message.clone()));
        Ok(format!("mock-sent-{}", self.sent.read().len()))
    }

    async fn search(&self, account: &LiveAccount, params: &SearchParams) -> Result<Vec<NormalizedRecord>, GatewayError> {
        let mut records = self.records_by_account.read().get(&account.account_id).cloned().unwrap_or_default();
        let needle = params.query.to_lowercase();
        records.retain(|r| {
            r.subject.to_lowercase().contains(&needle)
                || r.body.as_deref().unwrap_or_default().to_lowercase().contains(&needle)
        });
        if params.max_results > 0 {
            records.truncate(params.max_results);
        }
        Ok(records)
    }
}

/// A backend that unconditionally fails every call, for exercising
/// spec.md §4.4's "partial-failure tolerance": one account's backend
/// erroring must not sink the whole fan-out.
pub struct FailingMockBackend {
    message: String,
}

impl FailingMockBackend {
    /// A backend whose every call returns `GatewayError::Provider` with
    /// `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    fn error(&self) -> GatewayError {
        GatewayError::Provider {
            transience: gateway_core::Transience::Permanent,
            message: self.message.clone(),
            status: Some(503),
        }
    }
}

#[async_trait]
impl ProviderBackend for FailingMockBackend {
    async fn list(&self, _account: &LiveAccount, _params: &ListParams) -> Result<Vec<NormalizedRecord>, GatewayError> {
        Err(self.error())
    }

    async fn read(&self, _account: &LiveAccount, _provider_entity_id: &str) -> Result<NormalizedRecord, GatewayError> {
        Err(self.error())
    }

    async fn send(&self, _account: &LiveAccount, _message: &SendParams) -> Result<String, GatewayError> {
        Err(self.error())
    }

    async fn search(&self, _account: &LiveAccount, _params: &SearchParams) -> Result<Vec<NormalizedRecord>, GatewayError> {
        Err(self.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, account_id: &str, timestamp_ms: u64) -> NormalizedRecord {
        NormalizedRecord {
            id: id.into(),
            account_id: account_id.into(),
            plugin_id: "mock".into(),
            subject: format!("subject {id}"),
            from: "a@x.com".into(),
            to: vec!["b@x.com".into()],
            cc: None,
            bcc: None,
            reply_to: None,
            body: Some("hello world".into()),
            html_body: None,
            snippet: None,
            timestamp_ms,
            is_read: false,
            is_starred: None,
            labels: None,
            thread_id: None,
            has_attachments: false,
            attachments: None,
        }
    }

    fn account(id: &str) -> LiveAccount {
        LiveAccount { account_id: id.into(), plugin_id: "mock".into(), email: format!("{id}@x.com"), credential: vec![] }
    }

    #[tokio::test]
    async fn static_backend_lists_seeded_records() {
        let backend = StaticMockBackend::new();
        backend.seed("acct-1", vec![record("r1", "acct-1", 100), record("r2", "acct-1", 200)]);
        let records = backend.list(&account("acct-1"), &ListParams::default()).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn static_backend_search_matches_subject_and_body() {
        let backend = StaticMockBackend::new();
        backend.seed("acct-1", vec![record("r1", "acct-1", 100)]);
        let params = SearchParams { query: "hello".into(), max_results: 0, ..SearchParams::default() };
        let records = backend.search(&account("acct-1"), &params).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn static_backend_records_sent_messages() {
        let backend = StaticMockBackend::new();
        let message = SendParams {
            to: vec!["c@x.com".into()],
            subject: "hi".into(),
            body: "body".into(),
            cc: None,
            bcc: None,
            html_body: None,
            reply_to: None,
        };
        backend.send(&account("acct-1"), &message).await.unwrap();
        assert_eq!(backend.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn failing_backend_errors_on_every_call() {
        let backend = FailingMockBackend::new("boom");
        assert!(backend.list(&account("acct-1"), &ListParams::default()).await.is_err());
        assert!(backend.read(&account("acct-1"), "r1").await.is_err());
        assert!(backend.search(&account("acct-1"), &SearchParams::default()).await.is_err());
    }
}
