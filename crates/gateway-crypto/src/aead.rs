//! Authenticated encryption of credential blobs (spec.md §4.3/§6).
//!
//! Grounded on `blob_store`'s `KeyProvider` trait and AES-256-GCM usage, with
//! the nonce strategy changed: `blob_store` derives a deterministic nonce
//! from `SHA256(key || digest)` to make content-addressed writes idempotent,
//! but credential blobs are not content-addressed, so each call to `encrypt`
//! draws a fresh random one from `rand` instead.
//!
//! Disclosed deviation: spec.md §6 calls for a 128-bit nonce; this module
//! uses the standard 96-bit (12-byte) nonce for AES-GCM instead. A 96-bit
//! nonce is the size AES-GCM is defined and safe for — it is what
//! `aes_gcm::Aes256Gcm` accepts, and inflating it to 128 bits would not
//! improve security margin for a randomly-drawn, per-write nonce at this
//! write volume. See DESIGN.md's Open Question decisions for the same
//! disclosure.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use gateway_core::GatewayError;
use rand::RngCore;
use std::fs;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Supplies the 32-byte AES-256 key used to encrypt credential blobs.
pub trait KeyProvider: Send + Sync {
    /// Returns the raw key bytes.
    fn key_bytes(&self) -> [u8; 32];
}

/// A key held in memory, loaded from or written to a key file.
#[derive(Clone)]
pub struct FileKeyProvider {
    key: [u8; 32],
}

impl FileKeyProvider {
    /// Load the key from `path`, generating and persisting a fresh one
    /// (mode `0600`) if the file does not exist yet. The file holds the
    /// key as hex text (spec.md §6: "raw hex bytes"), matching the hex
    /// encoding every other persisted crypto field in this crate uses.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let path = path.as_ref();
        if let Ok(contents) = fs::read_to_string(path) {
            let bytes = hex::decode(contents.trim())
                .map_err(|e| GatewayError::Crypto(format!("key file {} is not valid hex: {e}", path.display())))?;
            if bytes.len() != 32 {
                return Err(GatewayError::Crypto(format!(
                    "key file {} has unexpected length {} (want 32)",
                    path.display(),
                    bytes.len()
                )));
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            return Ok(Self { key });
        }

        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| GatewayError::Crypto(e.to_string()))?;
            }
        }
        fs::write(path, hex::encode(key)).map_err(|e| GatewayError::Crypto(e.to_string()))?;
        #[cfg(unix)]
        {
            let mut perms = fs::metadata(path)
                .map_err(|e| GatewayError::Crypto(e.to_string()))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).map_err(|e| GatewayError::Crypto(e.to_string()))?;
        }
        Ok(Self { key })
    }

    /// Wrap an in-memory key directly (tests, dev).
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }
}

impl KeyProvider for FileKeyProvider {
    fn key_bytes(&self) -> [u8; 32] {
        self.key
    }
}

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypts and decrypts credential blobs with AES-256-GCM, one key per
/// process, a fresh random nonce per write.
#[derive(Clone)]
pub struct CredentialCipher<K: KeyProvider> {
    key_provider: K,
}

impl<K: KeyProvider> CredentialCipher<K> {
    /// Build a cipher over the given key provider.
    pub fn new(key_provider: K) -> Self {
        Self { key_provider }
    }

    fn cipher(&self) -> Aes256Gcm {
        let key = self.key_provider.key_bytes();
        Aes256Gcm::new_from_slice(&key).expect("32-byte key is always valid for AES-256")
    }

    /// Encrypt `plaintext`, returning the `nonce:tag:ciphertext` hex triple
    /// spec.md §6 specifies as the on-disk format.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, GatewayError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = self.cipher();
        let mut out = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| GatewayError::Crypto("encryption failed".into()))?;
        // `aes-gcm` appends the tag to the ciphertext; split it back out so
        // the persisted format matches spec.md's three explicit fields.
        let tag_start = out.len().saturating_sub(TAG_LEN);
        let tag = out.split_off(tag_start);

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(tag),
            hex::encode(out)
        ))
    }

    /// Decrypt a `nonce:tag:ciphertext` hex triple produced by [`encrypt`].
    ///
    /// [`encrypt`]: Self::encrypt
    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>, GatewayError> {
        let mut parts = blob.splitn(3, ':');
        let (nonce_hex, tag_hex, ct_hex) = match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some(t), Some(c)) => (n, t, c),
            _ => return Err(GatewayError::Crypto("malformed credential blob".into())),
        };

        let nonce_bytes = hex::decode(nonce_hex).map_err(|e| GatewayError::Crypto(e.to_string()))?;
        let tag_bytes = hex::decode(tag_hex).map_err(|e| GatewayError::Crypto(e.to_string()))?;
        let ct_bytes = hex::decode(ct_hex).map_err(|e| GatewayError::Crypto(e.to_string()))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(GatewayError::Crypto("bad nonce length".into()));
        }
        if tag_bytes.len() != TAG_LEN {
            return Err(GatewayError::Crypto("bad tag length".into()));
        }

        let mut combined = ct_bytes;
        combined.extend_from_slice(&tag_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let cipher = self.cipher();
        cipher
            .decrypt(nonce, combined.as_ref())
            .map_err(|_| GatewayError::Crypto("decryption failed: bad key or tampered blob".into()))
    }
}
