//! TTL + LRU record cache (spec.md §4.4.3) for point-reads. Grounded on
//! `gateway_vid`'s `Mutex<LruCache<...>>` shape, extended with a
//! per-entry expiry so a capacity-bounded cache also ages entries out on
//! time.

use crate::backend::NormalizedRecord;
use gateway_core::Clock;
use lru::LruCache;
use parking_lot::Mutex;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

struct Entry {
    record: NormalizedRecord,
    expires_at_ms: u64,
}

/// A bounded, time-expiring cache of [`NormalizedRecord`]s keyed by
/// `(account_id, provider_entity_id)`.
pub struct RecordCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: Mutex<LruCache<String, Entry>>,
}

fn cache_key(account_id: &str, provider_entity_id: &str) -> String {
    format!("{account_id}:{provider_entity_id}")
}

impl RecordCache {
    /// Build a cache with `capacity` entries and a TTL, e.g. spec.md
    /// §4.4's "TTL ≈ 1 hour" for point-reads.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self { clock, ttl, entries: Mutex::new(LruCache::new(cap)) }
    }

    /// Return the cached record for `(account_id, provider_entity_id)` if
    /// present and unexpired, otherwise compute it with `compute`, cache
    /// it, and return it. This is the `getOrCompute` interface spec.md
    /// §4.4.3 calls out as the cache's principal interface.
    pub async fn get_or_compute<F, Fut>(
        &self,
        account_id: &str,
        provider_entity_id: &str,
        compute: F,
    ) -> Result<NormalizedRecord, gateway_core::GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<NormalizedRecord, gateway_core::GatewayError>>,
    {
        let key = cache_key(account_id, provider_entity_id);
        let now = self.clock.now_ms();
        if let Some(entry) = self.entries.lock().get(&key) {
            if entry.expires_at_ms > now {
                return Ok(entry.record.clone());
            }
        }
        let record = compute().await?;
        self.entries.lock().put(key, Entry { record: record.clone(), expires_at_ms: now + self.ttl.as_millis() as u64 });
        Ok(record)
    }

    /// Drop every expired entry. Intended to be driven by a periodic
    /// background task (spec.md §4.4.3: "periodic sweep of expired
    /// entries"); also safe to call inline from tests.
    pub fn sweep(&self) {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock();
        let expired: Vec<String> =
            entries.iter().filter(|(_, entry)| entry.expires_at_ms <= now).map(|(k, _)| k.clone()).collect();
        for key in expired {
            entries.pop(&key);
        }
    }

    /// Current occupied size, for tests and diagnostics.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::FrozenClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn record(id: &str) -> NormalizedRecord {
        NormalizedRecord {
            id: id.into(),
            account_id: "acct-1".into(),
            plugin_id: "gmail".into(),
            subject: "hi".into(),
            from: "a@x.com".into(),
            to: vec!["b@x.com".into()],
            cc: None,
            bcc: None,
            reply_to: None,
            body: Some("body".into()),
            html_body: None,
            snippet: None,
            timestamp_ms: 1,
            is_read: false,
            is_starred: None,
            labels: None,
            thread_id: None,
            has_attachments: false,
            attachments: None,
        }
    }

    #[tokio::test]
    async fn computes_once_then_serves_from_cache() {
        let clock = Arc::new(FrozenClock::new(0));
        let cache = RecordCache::new(10, Duration::from_secs(60), clock);
        let calls = AtomicU32::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(record("msg-1")) }
        };
        cache.get_or_compute("acct-1", "msg-1", compute).await.unwrap();
        let compute2 = || async { Ok(record("msg-1")) };
        cache.get_or_compute("acct-1", "msg-1", compute2).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recomputes_after_ttl_expiry() {
        let clock = Arc::new(FrozenClock::new(0));
        let cache = RecordCache::new(10, Duration::from_millis(100), clock.clone());
        cache.get_or_compute("acct-1", "msg-1", || async { Ok(record("msg-1")) }).await.unwrap();
        clock.advance_ms(200);
        let calls = AtomicU32::new(0);
        cache
            .get_or_compute("acct-1", "msg-1", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(record("msg-1-refreshed")) }
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sweep_drops_only_expired_entries() {
        let clock = Arc::new(FrozenClock::new(0));
        let cache = RecordCache::new(10, Duration::from_millis(100), clock.clone());
        cache.get_or_compute("acct-1", "old", || async { Ok(record("old")) }).await.unwrap();
        clock.advance_ms(150);
        cache.get_or_compute("acct-1", "new", || async { Ok(record("new")) }).await.unwrap();
        cache.sweep();
        assert_eq!(cache.len(), 1);
    }
}
