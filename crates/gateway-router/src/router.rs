//! The universal router (spec.md §4.4): account discovery, parallel
//! fan-out reads, point-reads, writes, and virtual-id translation, all
//! behind one provider-agnostic surface. Grounded on `orchestrator`'s
//! `stream_events` fan-out-then-merge shape (`futures::future::join_all`
//! over per-target work), generalized from one RPC target to N live
//! provider accounts.

use crate::backend::{LiveAccount, ListParams, NormalizedRecord, ProviderBackend, SearchParams, SendParams};
use crate::cache::RecordCache;
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::retry::{with_retry, RetryPolicy};
use crate::translate::{to_virtual, VirtualRecord};
use gateway_accounts::account::{get_account, get_primary, list_accounts};
use gateway_accounts::credential::get_credentials;
use gateway_core::{process_clock, GatewayError};
use gateway_crypto::{CredentialCipher, KeyProvider};
use gateway_store::Store;
use gateway_vid::VidManager;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_LIST_RESULTS: usize = 10;
const MAX_LIST_RESULTS: usize = 500;
const DEFAULT_SEARCH_RESULTS: usize = 20;
const CACHE_TTL: Duration = Duration::from_secs(3600);
const CACHE_CAPACITY: usize = 5_000;

/// Maps a domain tag (e.g. `"email"`) to the set of `pluginId`s that serve
/// it (spec.md §4.4: "accounts whose `pluginId` is registered as
/// belonging to that domain").
#[derive(Default)]
pub struct PluginRegistry {
    domains: HashMap<String, Vec<String>>,
}

impl PluginRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin_id` as belonging to `domain`.
    pub fn register(&mut self, domain: impl Into<String>, plugin_id: impl Into<String>) {
        self.domains.entry(domain.into()).or_default().push(plugin_id.into());
    }

    /// The plugin ids registered for `domain`, if any.
    pub fn plugins_for(&self, domain: &str) -> &[String] {
        self.domains.get(domain).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// One registered backend plus its rate limiter.
struct Registration {
    backend: Arc<dyn ProviderBackend>,
    limiter: RateLimiter,
}

/// The universal router. Cheap to clone (shares store/cache/registry
/// state via `Arc`/internal `Clone` impls).
pub struct Router<K: KeyProvider> {
    store: Store,
    cipher: CredentialCipher<K>,
    vids: VidManager,
    registry: PluginRegistry,
    registrations: HashMap<String, Registration>,
    cache: RecordCache,
    retry_policy: RetryPolicy,
}

impl<K: KeyProvider> Router<K> {
    /// Build a router with the default retry policy and a 1-hour, 5,000
    /// entry record cache (spec.md §4.4's point-read cache contract).
    #[must_use]
    pub fn new(store: Store, cipher: CredentialCipher<K>, vids: VidManager) -> Self {
        Self {
            store,
            cipher,
            vids,
            registry: PluginRegistry::new(),
            registrations: HashMap::new(),
            cache: RecordCache::new(CACHE_CAPACITY, CACHE_TTL, process_clock()),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Register a provider backend under `plugin_id`, belonging to
    /// `domain`, rate-limited per `rate_limit`.
    pub fn register_backend(
        &mut self,
        domain: &str,
        plugin_id: impl Into<String>,
        backend: Arc<dyn ProviderBackend>,
        rate_limit: RateLimitConfig,
    ) {
        let plugin_id = plugin_id.into();
        self.registry.register(domain, plugin_id.clone());
        self.registrations.insert(plugin_id, Registration { backend, limiter: RateLimiter::new(rate_limit, process_clock()) });
    }

    /// Enumerate every account whose plugin belongs to `domain`, composed
    /// with decrypted credentials. An account with missing credentials is
    /// skipped with a warning (spec.md §4.4: "partial-failure tolerance").
    pub fn discover_live_accounts(&self, domain: &str) -> Result<Vec<LiveAccount>, GatewayError> {
        let mut live = Vec::new();
        for plugin_id in self.registry.plugins_for(domain) {
            for account in list_accounts(&self.store, Some(plugin_id))? {
                match get_credentials(&self.store, &self.cipher, &account.id)? {
                    Some(credential) => live.push(LiveAccount {
                        account_id: account.id,
                        plugin_id: account.plugin_id,
                        email: account.email,
                        credential,
                    }),
                    None => {
                        tracing::warn!(account_id = %account.id, plugin_id = %account.plugin_id, "account has no stored credentials, skipping");
                    }
                }
            }
        }
        Ok(live)
    }

    fn registration_for(&self, plugin_id: &str) -> Result<&Registration, GatewayError> {
        self.registrations.get(plugin_id).ok_or_else(|| GatewayError::Internal(format!("no backend registered for plugin {plugin_id}")))
    }

    /// List records across every live account for `domain`, merged newest
    /// first and truncated to `max_results` (default 10, hard cap 500).
    /// Returns the records alongside the number of accounts the fan-out
    /// actually queried, for the audit entry's `metadata.accountCount`
    /// (spec.md §8 scenario 4).
    pub async fn list(&self, domain: &str, mut params: ListParams) -> Result<(Vec<VirtualRecord>, usize), GatewayError> {
        if params.max_results == 0 {
            params.max_results = DEFAULT_LIST_RESULTS;
        }
        params.max_results = params.max_results.min(MAX_LIST_RESULTS);
        let cap = params.max_results;

        let accounts = self.discover_live_accounts(domain)?;
        let futures = accounts.into_iter().map(|account| {
            let params = params.clone();
            async move {
                let registration = self.registration_for(&account.plugin_id)?;
                registration.limiter.throttle(&account.account_id).await;
                with_retry(&self.retry_policy, None, || registration.backend.list(&account, &params)).await
            }
        });
        let results = futures::future::join_all(futures).await;
        self.merge_and_translate(results, cap)
    }

    /// Full-text/structured search across every live account for `domain`.
    /// See [`Router::list`] for the second element of the return value.
    pub async fn search(&self, domain: &str, mut params: SearchParams) -> Result<(Vec<VirtualRecord>, usize), GatewayError> {
        if params.max_results == 0 {
            params.max_results = DEFAULT_SEARCH_RESULTS;
        }
        let cap = params.max_results;

        let accounts = self.discover_live_accounts(domain)?;
        let futures = accounts.into_iter().map(|account| {
            let params = params.clone();
            async move {
                let registration = self.registration_for(&account.plugin_id)?;
                registration.limiter.throttle(&account.account_id).await;
                with_retry(&self.retry_policy, None, || registration.backend.search(&account, &params)).await
            }
        });
        let results = futures::future::join_all(futures).await;
        self.merge_and_translate(results, cap)
    }

    /// Merge and cap the per-account fan-out results, translating real ids
    /// to virtual ones. The returned `usize` is the number of accounts the
    /// fan-out queried (success or failure alike) — spec.md §8 scenario 4's
    /// `accountCount` names the accounts involved, not just the survivors.
    fn merge_and_translate(
        &self,
        per_account: Vec<Result<Vec<NormalizedRecord>, GatewayError>>,
        cap: usize,
    ) -> Result<(Vec<VirtualRecord>, usize), GatewayError> {
        let account_count = per_account.len();
        let mut merged = Vec::new();
        let mut any_ok = per_account.is_empty();
        for result in per_account {
            match result {
                Ok(records) => {
                    any_ok = true;
                    merged.extend(records);
                }
                Err(e) => tracing::warn!(error = %e, "per-account fan-out call failed, contributing empty set"),
            }
        }
        if !any_ok {
            return Err(GatewayError::Provider {
                transience: gateway_core::Transience::Permanent,
                message: "every account in the fan-out failed".into(),
                status: None,
            });
        }
        merged.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms).then_with(|| a.id.cmp(&b.id)));
        merged.truncate(cap);
        let translated: Vec<VirtualRecord> = merged.into_iter().map(|r| to_virtual(&self.vids, r)).collect::<Result<_, _>>()?;
        Ok((translated, account_count))
    }

    fn live_account_for(&self, account_id: &str) -> Result<LiveAccount, GatewayError> {
        let account = get_account(&self.store, account_id)?
            .ok_or_else(|| GatewayError::Protocol(format!("unknown account {account_id}")))?;
        let credential = get_credentials(&self.store, &self.cipher, account_id)?
            .ok_or_else(|| GatewayError::Auth(format!("no credentials for account {account_id}")))?;
        Ok(LiveAccount { account_id: account.id, plugin_id: account.plugin_id, email: account.email, credential })
    }

    /// Resolve `virtual_id` to a real `(account, providerEntityId)` pair,
    /// serving from the record cache when possible.
    pub async fn read(&self, virtual_id: &str) -> Result<VirtualRecord, GatewayError> {
        let (real_account_id, provider_entity_id) = self
            .vids
            .resolve(virtual_id)?
            .ok_or_else(|| GatewayError::Protocol(format!("unknown virtual id {virtual_id}")))?;
        let provider_entity_id = provider_entity_id
            .ok_or_else(|| GatewayError::Protocol(format!("{virtual_id} is not a record id")))?;

        let account = self.live_account_for(&real_account_id)?;
        let registration = self.registration_for(&account.plugin_id)?;

        let record = self
            .cache
            .get_or_compute(&real_account_id, &provider_entity_id, || async {
                registration.limiter.throttle(&real_account_id).await;
                with_retry(&self.retry_policy, None, || registration.backend.read(&account, &provider_entity_id)).await
            })
            .await?;
        to_virtual(&self.vids, record)
    }

    /// Send a message via `domain`'s primary account, or `virtual_account_id`
    /// when given (spec.md §4.4's write contract).
    pub async fn send(
        &self,
        domain: &str,
        virtual_account_id: Option<&str>,
        message: SendParams,
    ) -> Result<String, GatewayError> {
        message.validate()?;

        let real_account_id = match virtual_account_id {
            Some(vid) => {
                let (real_account_id, _) = self
                    .vids
                    .resolve(vid)?
                    .ok_or_else(|| GatewayError::Protocol(format!("unknown virtual account id {vid}")))?;
                real_account_id
            }
            None => self.primary_account_for_domain(domain)?,
        };

        let account = self.live_account_for(&real_account_id)?;
        let registration = self.registration_for(&account.plugin_id)?;
        registration.limiter.throttle(&real_account_id).await;
        with_retry(&self.retry_policy, None, || registration.backend.send(&account, &message)).await
    }

    fn primary_account_for_domain(&self, domain: &str) -> Result<String, GatewayError> {
        for plugin_id in self.registry.plugins_for(domain) {
            if let Some(primary) = get_primary(&self.store, plugin_id)? {
                return Ok(primary.id);
            }
        }
        Err(GatewayError::Protocol(format!("no primary account configured for domain {domain}")))
    }

    /// Resolve the plugin id behind `virtual_id` (an email or account
    /// virtual id) without decrypting credentials or calling a backend.
    /// Lets the dispatch envelope populate policy/audit context up front
    /// (spec.md §4.1 step 1's `(pluginId, category)` scope match and §3's
    /// required `AuditEntry.pluginId`) for tools that name an account.
    pub fn plugin_id_for_virtual_id(&self, virtual_id: &str) -> Result<Option<String>, GatewayError> {
        let Some((real_account_id, _)) = self.vids.resolve(virtual_id)? else {
            return Ok(None);
        };
        Ok(get_account(&self.store, &real_account_id)?.map(|a| a.plugin_id))
    }

    /// The plugin id of `domain`'s primary account, if one is configured.
    /// The synchronous counterpart to [`Router::send`]'s own default-account
    /// resolution, used to populate policy/audit context before dispatch.
    pub fn primary_plugin_id_for_domain(&self, domain: &str) -> Result<Option<String>, GatewayError> {
        for plugin_id in self.registry.plugins_for(domain) {
            if get_primary(&self.store, plugin_id)?.is_some() {
                return Ok(Some(plugin_id.clone()));
            }
        }
        Ok(None)
    }
}
