//! The virtual-identifier manager (spec.md §4.2): agents only ever see
//! opaque `email_<id>` / `account_<id>` strings, never real provider or
//! account identifiers.
//!
//! The in-process cache needs *LRU* eviction with a configurable capacity,
//! which a plain concurrent map doesn't provide, so it is built on the
//! `lru` crate instead, behind a `Mutex` (one per direction) rather than
//! per-shard locking, since evicting from an LRU is itself a write that
//! must be serialized.

#![deny(unsafe_code)]

use gateway_core::{ids, GatewayError};
use gateway_store::{trees, Store};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;

const DEFAULT_CAPACITY: usize = 10_000;
const ALLOC_RETRIES: usize = 3;

/// Which entity kind a virtual id stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// An opaque stand-in for a `(realAccountId, providerEntityId)` pair.
    Email,
    /// An opaque stand-in for a real account id.
    Account,
}

/// The durable mapping behind one virtual id (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualIdMapping {
    /// The opaque id exposed to agents.
    pub virtual_id: String,
    /// Which entity kind this maps.
    pub kind: Kind,
    /// The real account id.
    pub real_account_id: String,
    /// The provider-local entity id; non-null iff `kind == Email`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_entity_id: Option<String>,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
}

fn reverse_email_key(real_account_id: &str, provider_entity_id: &str) -> String {
    format!("{real_account_id}:{provider_entity_id}")
}

struct Caches {
    forward: Mutex<LruCache<String, VirtualIdMapping>>,
    reverse_email: Mutex<LruCache<String, String>>,
    reverse_account: Mutex<LruCache<String, String>>,
}

/// Hybrid cache + durable-store virtual-id manager. Cheap to clone (shares
/// the underlying store handle and cache state via `Arc`).
#[derive(Clone)]
pub struct VidManager {
    store: Store,
    caches: Arc<Caches>,
}

impl VidManager {
    /// Build a manager with the default cache capacity (10,000 per
    /// direction).
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self::with_capacity(store, DEFAULT_CAPACITY)
    }

    /// Build a manager with an explicit per-direction cache capacity.
    #[must_use]
    pub fn with_capacity(store: Store, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            store,
            caches: Arc::new(Caches {
                forward: Mutex::new(LruCache::new(cap)),
                reverse_email: Mutex::new(LruCache::new(cap)),
                reverse_account: Mutex::new(LruCache::new(cap)),
            }),
        }
    }

    /// Load a bounded set of existing mappings into the caches. Corrupt
    /// rows (an `email` mapping with no `provider_entity_id`) are skipped
    /// and logged, per spec.md §4.2's initialization contract.
    pub fn init(&self) -> Result<(), GatewayError> {
        let rows: Vec<(String, VirtualIdMapping)> = self.store.iter_all(trees::VID_FORWARD)?;
        for (_, mapping) in rows {
            if mapping.kind == Kind::Email && mapping.provider_entity_id.is_none() {
                tracing::warn!(virtual_id = %mapping.virtual_id, "skipping corrupt email mapping at init");
                continue;
            }
            self.cache_insert(&mapping);
        }
        Ok(())
    }

    fn cache_insert(&self, mapping: &VirtualIdMapping) {
        self.caches.forward.lock().put(mapping.virtual_id.clone(), mapping.clone());
        match mapping.kind {
            Kind::Email => {
                if let Some(provider_entity_id) = &mapping.provider_entity_id {
                    let key = reverse_email_key(&mapping.real_account_id, provider_entity_id);
                    self.caches.reverse_email.lock().put(key, mapping.virtual_id.clone());
                }
            }
            Kind::Account => {
                self.caches.reverse_account.lock().put(mapping.real_account_id.clone(), mapping.virtual_id.clone());
            }
        }
    }

    /// Allocate (or fetch the existing) virtual id for an email mapping:
    /// `(real_account_id, provider_entity_id)`.
    pub fn alloc_email(&self, real_account_id: &str, provider_entity_id: &str) -> Result<String, GatewayError> {
        self.alloc(Kind::Email, real_account_id, Some(provider_entity_id))
    }

    /// Allocate (or fetch the existing) virtual id for an account mapping.
    pub fn alloc_account(&self, real_account_id: &str) -> Result<String, GatewayError> {
        self.alloc(Kind::Account, real_account_id, None)
    }

    fn alloc(&self, kind: Kind, real_account_id: &str, provider_entity_id: Option<&str>) -> Result<String, GatewayError> {
        let reverse_key = match (kind, provider_entity_id) {
            (Kind::Email, Some(p)) => reverse_email_key(real_account_id, p),
            (Kind::Account, None) => real_account_id.to_string(),
            _ => return Err(GatewayError::Internal("malformed alloc request".into())),
        };

        // 1. Reverse cache hit.
        let cached = match kind {
            Kind::Email => self.caches.reverse_email.lock().get(&reverse_key).cloned(),
            Kind::Account => self.caches.reverse_account.lock().get(&reverse_key).cloned(),
        };
        if let Some(virtual_id) = cached {
            return Ok(virtual_id);
        }

        // Reverse store hit (cache was cold, e.g. evicted or a fresh process).
        let reverse_tree = match kind {
            Kind::Email => trees::VID_REVERSE_EMAIL,
            Kind::Account => trees::VID_REVERSE_ACCOUNT,
        };
        if let Some(existing_id) = self.store.get::<String>(reverse_tree, &reverse_key)? {
            if let Some(mapping) = self.store.get::<VirtualIdMapping>(trees::VID_FORWARD, &existing_id)? {
                self.cache_insert(&mapping);
            }
            return Ok(existing_id);
        }

        // 2. Generate a new id, verifying uniqueness against the forward
        // store with bounded retries.
        let new_id = self.generate_unique_id(kind)?;

        // 3. Insert-or-read-back: race-safety contract (spec.md §8).
        let inserted = self.store.put_if_absent(reverse_tree, &reverse_key, &new_id)?;
        if !inserted {
            let winner: String = self
                .store
                .get(reverse_tree, &reverse_key)?
                .ok_or_else(|| GatewayError::Internal("lost race but winner vanished".into()))?;
            if let Some(mapping) = self.store.get::<VirtualIdMapping>(trees::VID_FORWARD, &winner)? {
                self.cache_insert(&mapping);
            }
            return Ok(winner);
        }

        let mapping = VirtualIdMapping {
            virtual_id: new_id.clone(),
            kind,
            real_account_id: real_account_id.to_string(),
            provider_entity_id: provider_entity_id.map(str::to_string),
            created_at: ids::now_iso8601(),
        };
        self.store.put(trees::VID_FORWARD, &new_id, &mapping)?;
        self.cache_insert(&mapping);
        Ok(new_id)
    }

    fn generate_unique_id(&self, kind: Kind) -> Result<String, GatewayError> {
        for _ in 0..ALLOC_RETRIES {
            let candidate = match kind {
                Kind::Email => ids::new_virtual_email_id(),
                Kind::Account => ids::new_virtual_account_id(),
            };
            if self.store.get::<VirtualIdMapping>(trees::VID_FORWARD, &candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        Err(GatewayError::Internal("exhausted retries generating a unique virtual id".into()))
    }

    /// Resolve a virtual id back to `(real_account_id, provider_entity_id)`.
    /// A corrupt `email` mapping (null `provider_entity_id`) is treated as
    /// not found, per spec.md §4.2.
    pub fn resolve(&self, virtual_id: &str) -> Result<Option<(String, Option<String>)>, GatewayError> {
        if let Some(mapping) = self.caches.forward.lock().get(virtual_id).cloned() {
            return Self::resolved(mapping);
        }
        let Some(mapping) = self.store.get::<VirtualIdMapping>(trees::VID_FORWARD, virtual_id)? else {
            return Ok(None);
        };
        self.cache_insert(&mapping);
        Self::resolved(mapping)
    }

    fn resolved(mapping: VirtualIdMapping) -> Result<Option<(String, Option<String>)>, GatewayError> {
        if mapping.kind == Kind::Email && mapping.provider_entity_id.is_none() {
            tracing::warn!(virtual_id = %mapping.virtual_id, "corrupt email mapping on resolve");
            return Ok(None);
        }
        Ok(Some((mapping.real_account_id, mapping.provider_entity_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn alloc_then_resolve_round_trips() {
        let manager = VidManager::new(Store::open_temporary().unwrap());
        let vid = manager.alloc_email("acct-1", "msg-7").unwrap();
        let (real_account_id, provider_entity_id) = manager.resolve(&vid).unwrap().unwrap();
        assert_eq!(real_account_id, "acct-1");
        assert_eq!(provider_entity_id, Some("msg-7".to_string()));
    }

    #[test]
    fn alloc_is_idempotent_for_the_same_pair() {
        let manager = VidManager::new(Store::open_temporary().unwrap());
        let first = manager.alloc_email("acct-1", "msg-7").unwrap();
        let second = manager.alloc_email("acct-1", "msg-7").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn resolve_unknown_id_is_none() {
        let manager = VidManager::new(Store::open_temporary().unwrap());
        assert_eq!(manager.resolve("email_doesnotexist").unwrap(), None);
    }

    #[test]
    fn account_kind_has_no_provider_entity_id() {
        let manager = VidManager::new(Store::open_temporary().unwrap());
        let vid = manager.alloc_account("acct-1").unwrap();
        let (real_account_id, provider_entity_id) = manager.resolve(&vid).unwrap().unwrap();
        assert_eq!(real_account_id, "acct-1");
        assert_eq!(provider_entity_id, None);
    }

    #[test]
    fn init_skips_corrupt_email_rows() {
        let store = Store::open_temporary().unwrap();
        let corrupt = VirtualIdMapping {
            virtual_id: "email_corrupt123".into(),
            kind: Kind::Email,
            real_account_id: "acct-9".into(),
            provider_entity_id: None,
            created_at: ids::now_iso8601(),
        };
        store.put(trees::VID_FORWARD, &corrupt.virtual_id, &corrupt).unwrap();

        let manager = VidManager::new(store);
        manager.init().unwrap();
        assert_eq!(manager.resolve("email_corrupt123").unwrap(), None);
    }

    #[test]
    fn ten_concurrent_allocations_converge_on_one_mapping() {
        let rt = tokio::runtime::Builder::new_multi_thread().worker_threads(4).enable_all().build().unwrap();
        rt.block_on(async {
            let manager = VidManager::new(Store::open_temporary().unwrap());
            let barrier = Arc::new(Barrier::new(10));
            let mut handles = Vec::new();
            for _ in 0..10 {
                let manager = manager.clone();
                let barrier = barrier.clone();
                handles.push(tokio::task::spawn_blocking(move || {
                    barrier.wait();
                    manager.alloc_email("acct-1", "msg-7").unwrap()
                }));
            }
            let mut results = Vec::new();
            for h in handles {
                results.push(h.await.unwrap());
            }
            let first = &results[0];
            assert!(results.iter().all(|r| r == first));
        });
    }
}
