//! Thin typed wrapper over `sled::Db`, one tree per entity. Grounded on
//! `pagi-xcurzens-core::relations::KB07Relations` (sled tree + JSON-payload
//! pattern), generalized from one bespoke tree to a named-tree registry and
//! extended with the compare-and-set primitive (`put_if_absent`) that backs
//! the virtual-id race-safety contract (§4.2) and the credential store's
//! primary-account invariant (§4.3).

#![deny(unsafe_code)]

use gateway_core::GatewayError;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

/// Named trees this workspace persists. One `sled::Tree` per entity keeps
/// scans (§4.7's audit queries, §4.2's mapping lookups) cheap without a
/// schema migration system.
pub mod trees {
    pub const RULES: &str = "rules";
    pub const REDACTION_PATTERNS: &str = "redaction_patterns";
    pub const ACCOUNTS: &str = "accounts";
    pub const CREDENTIALS: &str = "credentials";
    pub const APPROVALS: &str = "approvals";
    pub const AUDITS: &str = "audits";
    pub const VID_FORWARD: &str = "vid_forward";
    pub const VID_REVERSE_EMAIL: &str = "vid_reverse_email";
    pub const VID_REVERSE_ACCOUNT: &str = "vid_reverse_account";
}

impl From<sled::Error> for GatewayError {
    fn from(e: sled::Error) -> Self {
        GatewayError::Store(e.to_string())
    }
}

/// A durable, ordered KV store backed by `sled`, opened once per process at
/// `DATABASE_URL`.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
}

impl Store {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open a store entirely in memory (tests).
    #[cfg(any(test, feature = "test-util"))]
    pub fn open_temporary() -> Result<Self, GatewayError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    fn tree(&self, name: &str) -> Result<sled::Tree, GatewayError> {
        Ok(self.db.open_tree(name)?)
    }

    /// Serialize `value` as JSON and store it under `key` in `tree_name`.
    pub fn put<T: Serialize>(&self, tree_name: &str, key: &str, value: &T) -> Result<(), GatewayError> {
        let tree = self.tree(tree_name)?;
        let bytes = serde_json::to_vec(value)?;
        tree.insert(key.as_bytes(), bytes)?;
        Ok(())
    }

    /// Load and deserialize the value stored under `key`, if present.
    pub fn get<T: DeserializeOwned>(&self, tree_name: &str, key: &str) -> Result<Option<T>, GatewayError> {
        let tree = self.tree(tree_name)?;
        match tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Remove the value stored under `key`; no-op if absent.
    pub fn delete(&self, tree_name: &str, key: &str) -> Result<(), GatewayError> {
        let tree = self.tree(tree_name)?;
        tree.remove(key.as_bytes())?;
        Ok(())
    }

    /// Compare-and-set insert: stores `value` under `key` only if absent.
    /// Returns `Ok(true)` when this call performed the insert, `Ok(false)`
    /// when a prior value was already present (the caller should read it
    /// back — this is the race-safety primitive used by §4.2's
    /// insert-or-read-back sequence and §4.3's primary invariant).
    pub fn put_if_absent<T: Serialize>(
        &self,
        tree_name: &str,
        key: &str,
        value: &T,
    ) -> Result<bool, GatewayError> {
        let tree = self.tree(tree_name)?;
        let bytes = serde_json::to_vec(value)?;
        match tree.compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(bytes))? {
            Ok(()) => Ok(true),
            Err(_conflict) => Ok(false),
        }
    }

    /// Iterate all entries with the given key prefix, deserializing values.
    pub fn scan_prefix<T: DeserializeOwned>(
        &self,
        tree_name: &str,
        prefix: &str,
    ) -> Result<Vec<(String, T)>, GatewayError> {
        let tree = self.tree(tree_name)?;
        let mut out = Vec::new();
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (k, v) = item?;
            let key = String::from_utf8_lossy(&k).into_owned();
            match serde_json::from_slice::<T>(&v) {
                Ok(val) => out.push((key, val)),
                Err(e) => {
                    tracing::warn!(key = %key, tree = tree_name, error = %e, "skipping corrupt row");
                }
            }
        }
        Ok(out)
    }

    /// Iterate every entry in a tree, deserializing values; corrupt rows are
    /// skipped and logged rather than aborting the scan.
    pub fn iter_all<T: DeserializeOwned>(&self, tree_name: &str) -> Result<Vec<(String, T)>, GatewayError> {
        self.scan_prefix(tree_name, "")
    }

    /// Atomically apply a batch of puts/deletes within one tree. Used by
    /// `setPrimary`/`deleteAccount`'s "single atomic write set" requirement.
    pub fn apply_batch(&self, tree_name: &str, batch: sled::Batch) -> Result<(), GatewayError> {
        let tree = self.tree(tree_name)?;
        tree.apply_batch(batch)?;
        Ok(())
    }

    /// Atomically write several key/value pairs to one tree in a single
    /// batch, without exposing `sled::Batch` to callers that only need the
    /// common "multiple puts, one commit" shape.
    pub fn put_many<T: Serialize>(&self, tree_name: &str, items: &[(String, T)]) -> Result<(), GatewayError> {
        let mut batch = sled::Batch::default();
        for (key, value) in items {
            let bytes = serde_json::to_vec(value)?;
            batch.insert(key.as_bytes(), bytes);
        }
        self.apply_batch(tree_name, batch)
    }
}
