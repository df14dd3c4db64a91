//! The `GatewayError` taxonomy. Component boundaries re-tag lower-level
//! errors into it (a `sled::Error` becomes `Store`, an AEAD failure
//! becomes `Crypto`, ...) so callers across crate boundaries match on one
//! enum instead of each dependency's own error type.

use thiserror::Error;

/// Whether a provider-facing failure should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transience {
    /// Network error, timeout, HTTP 5xx/429 — safe to retry.
    Transient,
    /// Anything else — propagate immediately.
    Permanent,
}

/// Unified error taxonomy for the gateway. Every component boundary
/// converts its local error type into one of these variants.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing key file, malformed env, missing required config.
    #[error("config: {0}")]
    Config(String),

    /// Store unreachable or I/O failure.
    #[error("store: {0}")]
    Store(String),

    /// Unique-constraint violation — §4.2's race-safety contract recovers
    /// from this by reading back the winner.
    #[error("store conflict: {0}")]
    StoreConflict(String),

    /// Key load failure or AEAD authentication failure on decrypt.
    #[error("crypto: {0}")]
    Crypto(String),

    /// Invalid predicate, invalid regex, or an illegal approval-state
    /// transition.
    #[error("policy: {0}")]
    Policy(String),

    /// Missing/invalid credentials, token exchange failure.
    #[error("auth: {0}")]
    Auth(String),

    /// Provider-backend failure, tagged transient/permanent and carrying the
    /// HTTP status if the provider returned one.
    #[error("provider ({transience:?}): {message}")]
    Provider { transience: Transience, message: String, status: Option<u16> },

    /// Unknown session, unknown tool, malformed RPC request.
    #[error("protocol: {0}")]
    Protocol(String),

    /// Catch-all; always logged with context before conversion.
    #[error("internal: {0}")]
    Internal(String),
}

impl GatewayError {
    /// True for `Provider` errors marked transient — the only class the
    /// router's retry policy (§4.4.1) acts on, alongside select `Store`
    /// conflicts.
    pub fn is_retriable(&self) -> bool {
        matches!(self, GatewayError::Provider { transience: Transience::Transient, .. })
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Internal(format!("serde: {e}"))
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Config(format!("io: {e}"))
    }
}
