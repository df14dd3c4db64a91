//! PKCE verifier/challenge generation and the short-TTL state store used by
//! the OAuth acquirer (spec.md §4.6).
//!
//! The state store is a concurrent map keyed by an opaque token, read
//! exactly once, that expires its entries.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use dashmap::DashMap;
use gateway_core::Clock;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const VERIFIER_BYTES: usize = 96;
const STATE_BYTES: usize = 16;
const STATE_TTL_MS: u64 = 10 * 60 * 1000;

/// A generated PKCE verifier/challenge pair.
pub struct PkceChallenge {
    /// The secret verifier, kept server-side until the callback.
    pub verifier: String,
    /// `base64url(SHA-256(verifier))`, sent to the provider.
    pub challenge: String,
}

/// Generate a 96-byte random `code_verifier` and its `S256` `code_challenge`.
pub fn generate_verifier() -> PkceChallenge {
    let mut bytes = [0u8; VERIFIER_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let verifier = URL_SAFE_NO_PAD.encode(bytes);

    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());

    PkceChallenge { verifier, challenge }
}

/// Generate a 16-byte random `state` parameter.
pub fn random_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

struct Entry {
    verifier: String,
    expires_at_ms: u64,
}

/// Process-wide `state -> verifier` map with a 10-minute TTL and one-time
/// read semantics (`take` removes the entry it returns).
pub struct StateStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    /// Build an empty store backed by the given clock (use
    /// [`gateway_core::SystemClock`] in production, a frozen clock in
    /// tests).
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { entries: DashMap::new(), clock }
    }

    /// Record `verifier` under a freshly generated `state`, returning it.
    pub fn put(&self, verifier: String) -> String {
        let state = random_state();
        let expires_at_ms = self.clock.now_ms() + STATE_TTL_MS;
        self.entries.insert(state.clone(), Entry { verifier, expires_at_ms });
        state
    }

    /// Remove and return the verifier for `state`, if present and not
    /// expired. Expired entries are evicted on lookup.
    pub fn take(&self, state: &str) -> Option<String> {
        let (_, entry) = self.entries.remove(state)?;
        if entry.expires_at_ms < self.clock.now_ms() {
            return None;
        }
        Some(entry.verifier)
    }

    /// Drop all expired entries; callers may run this periodically.
    pub fn sweep(&self) {
        let now = self.clock.now_ms();
        self.entries.retain(|_, entry| entry.expires_at_ms >= now);
    }
}
