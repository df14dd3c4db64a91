//! Credential encryption at rest and PKCE helpers.
//!
//! Grounded on `blob_store`'s AES-256-GCM/`KeyProvider` mechanics for the
//! AEAD half; the nonce strategy deliberately deviates from `blob_store`'s
//! deterministic `SHA256(key||digest)` derivation (that scheme exists to
//! make content-addressed storage idempotent) — spec.md §6 calls for a
//! **fresh random nonce per write**, so `aead` draws it from `rand` instead.

#![deny(unsafe_code)]

pub mod aead;
pub mod pkce;

pub use aead::{CredentialCipher, KeyProvider};
pub use pkce::{PkceChallenge, StateStore};
