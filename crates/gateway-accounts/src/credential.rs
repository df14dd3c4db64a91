//! Account-scoped credential CRUD, encrypted at rest via `gateway-crypto`
//! (spec.md §4.3). A compatibility path lets a credential attach to a
//! plugin without an account (`account_id = None`); the legacy read path
//! prefers the primary account's credential and falls back to this orphan.

use crate::account::get_primary;
use gateway_core::{ids, GatewayError};
use gateway_crypto::{CredentialCipher, KeyProvider};
use gateway_store::{trees, Store};
use serde::{Deserialize, Serialize};

/// The kind of secret a credential blob holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// OAuth2 access/refresh token pair.
    Oauth2,
    /// Bare API key.
    ApiKey,
    /// Username/password.
    Basic,
}

/// An encrypted credential (spec.md §3). `cipher_blob` is the
/// `nonce:tag:ciphertext` hex triple produced by
/// [`gateway_crypto::CredentialCipher`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Unique id.
    pub id: String,
    /// Owning account, or `None` for a legacy plugin-scoped orphan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// Plugin this credential authenticates against.
    pub plugin_id: String,
    /// Secret kind.
    #[serde(rename = "type")]
    pub kind: CredentialType,
    /// Encrypted payload.
    pub cipher_blob: String,
    /// ISO-8601 creation timestamp.
    pub created_at: String,
    /// ISO-8601 last-update timestamp.
    pub updated_at: String,
}

fn key_for_account(account_id: &str) -> String {
    format!("account:{account_id}")
}

fn key_for_orphan(plugin_id: &str) -> String {
    format!("orphan:{plugin_id}")
}

/// Encrypt `plaintext` with `cipher` and store a new credential for
/// `account_id` (or as a plugin-scoped orphan when `account_id` is
/// `None`).
pub fn store_credentials<K: KeyProvider>(
    store: &Store,
    cipher: &CredentialCipher<K>,
    account_id: Option<String>,
    plugin_id: String,
    kind: CredentialType,
    plaintext: &[u8],
) -> Result<Credential, GatewayError> {
    let cipher_blob = cipher.encrypt(plaintext)?;
    let now = ids::now_iso8601();
    let credential = Credential {
        id: format!("credential_{}", ids::random_alnum(16)),
        account_id: account_id.clone(),
        plugin_id: plugin_id.clone(),
        kind,
        cipher_blob,
        created_at: now.clone(),
        updated_at: now,
    };
    let key = match &account_id {
        Some(id) => key_for_account(id),
        None => key_for_orphan(&plugin_id),
    };
    store.put(trees::CREDENTIALS, &key, &credential)?;
    Ok(credential)
}

/// Decrypt and return the plaintext for `account_id`'s credential.
pub fn get_credentials<K: KeyProvider>(
    store: &Store,
    cipher: &CredentialCipher<K>,
    account_id: &str,
) -> Result<Option<Vec<u8>>, GatewayError> {
    let credential: Option<Credential> = store.get(trees::CREDENTIALS, &key_for_account(account_id))?;
    credential.map(|c| cipher.decrypt(&c.cipher_blob)).transpose()
}

/// The legacy read path: prefer the plugin's primary account's
/// credentials, falling back to an orphan credential attached directly to
/// the plugin.
pub fn get_credentials_legacy<K: KeyProvider>(
    store: &Store,
    cipher: &CredentialCipher<K>,
    plugin_id: &str,
) -> Result<Option<Vec<u8>>, GatewayError> {
    if let Some(primary) = get_primary(store, plugin_id)? {
        if let Some(plaintext) = get_credentials(store, cipher, &primary.id)? {
            return Ok(Some(plaintext));
        }
    }
    let orphan: Option<Credential> = store.get(trees::CREDENTIALS, &key_for_orphan(plugin_id))?;
    orphan.map(|c| cipher.decrypt(&c.cipher_blob)).transpose()
}

/// Re-encrypt and replace an existing account credential (token refresh).
pub fn update_credentials<K: KeyProvider>(
    store: &Store,
    cipher: &CredentialCipher<K>,
    account_id: &str,
    plaintext: &[u8],
) -> Result<Credential, GatewayError> {
    let key = key_for_account(account_id);
    let mut credential: Credential = store
        .get(trees::CREDENTIALS, &key)?
        .ok_or_else(|| GatewayError::Store(format!("no credential for account {account_id}")))?;
    credential.cipher_blob = cipher.encrypt(plaintext)?;
    credential.updated_at = ids::now_iso8601();
    store.put(trees::CREDENTIALS, &key, &credential)?;
    Ok(credential)
}

/// Delete `account_id`'s credential, if any.
pub fn delete_credentials(store: &Store, account_id: &str) -> Result<(), GatewayError> {
    store.delete(trees::CREDENTIALS, &key_for_account(account_id))
}

/// Used by `delete_account`: remove dependent credentials before the
/// account record itself (spec.md §4.3: "deletion cascades").
pub(crate) fn delete_credentials_for_account(store: &Store, account_id: &str) -> Result<(), GatewayError> {
    delete_credentials(store, account_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::create_account;
    use gateway_crypto::aead::FileKeyProvider;

    fn cipher() -> CredentialCipher<FileKeyProvider> {
        CredentialCipher::new(FileKeyProvider::from_bytes([3u8; 32]))
    }

    #[test]
    fn store_then_get_roundtrips_plaintext() {
        let store = Store::open_temporary().unwrap();
        let c = cipher();
        let account = create_account(&store, "gmail".into(), "a@x.com".into(), None, None).unwrap();
        store_credentials(&store, &c, Some(account.id.clone()), "gmail".into(), CredentialType::Oauth2, b"token-abc")
            .unwrap();
        let got = get_credentials(&store, &c, &account.id).unwrap();
        assert_eq!(got, Some(b"token-abc".to_vec()));
    }

    #[test]
    fn legacy_path_falls_back_to_orphan() {
        let store = Store::open_temporary().unwrap();
        let c = cipher();
        store_credentials(&store, &c, None, "gmail".into(), CredentialType::ApiKey, b"legacy-key").unwrap();
        let got = get_credentials_legacy(&store, &c, "gmail").unwrap();
        assert_eq!(got, Some(b"legacy-key".to_vec()));
    }

    #[test]
    fn legacy_path_prefers_primary_account_over_orphan() {
        let store = Store::open_temporary().unwrap();
        let c = cipher();
        let account = create_account(&store, "gmail".into(), "a@x.com".into(), None, None).unwrap();
        store_credentials(&store, &c, None, "gmail".into(), CredentialType::ApiKey, b"orphan-key").unwrap();
        store_credentials(&store, &c, Some(account.id), "gmail".into(), CredentialType::Oauth2, b"primary-token")
            .unwrap();

        let got = get_credentials_legacy(&store, &c, "gmail").unwrap();
        assert_eq!(got, Some(b"primary-token".to_vec()));
    }

    #[test]
    fn update_credentials_replaces_ciphertext() {
        let store = Store::open_temporary().unwrap();
        let c = cipher();
        let account = create_account(&store, "gmail".into(), "a@x.com".into(), None, None).unwrap();
        store_credentials(&store, &c, Some(account.id.clone()), "gmail".into(), CredentialType::Oauth2, b"old")
            .unwrap();
        update_credentials(&store, &c, &account.id, b"refreshed").unwrap();
        let got = get_credentials(&store, &c, &account.id).unwrap();
        assert_eq!(got, Some(b"refreshed".to_vec()));
    }
}
