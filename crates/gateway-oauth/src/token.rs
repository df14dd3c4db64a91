//! Token-exchange and identity-lookup wire shapes (spec.md §4.6 step 2).
//! The credential blob persisted via `gateway-accounts` is this
//! [`TokenSet`] serialized as JSON, matching spec.md §3's "access token,
//! refresh token, expiry" payload.

use serde::{Deserialize, Serialize};

/// The provider's token-endpoint response. Fields beyond `access_token`
/// are optional since not every provider issues a refresh token or a
/// fixed expiry.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// The persisted credential payload (spec.md §4.6: "access token, refresh
/// token, and expiry"). Serialized to JSON and handed to
/// `gateway-crypto::CredentialCipher::encrypt` as the plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Milliseconds since epoch the access token expires at, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
}

impl TokenSet {
    /// Build a `TokenSet` from the raw token-endpoint response, resolving
    /// `expires_in` (seconds from now) into an absolute `expires_at_ms`.
    #[must_use]
    pub fn from_response(resp: TokenExchangeResponse, now_ms: u64) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_at_ms: resp.expires_in.map(|secs| now_ms + secs * 1000),
        }
    }
}

/// The subset of an identity-endpoint response this crate needs: the
/// account's human-facing email address.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityResponse {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_in_resolves_to_absolute_millis() {
        let resp = TokenExchangeResponse {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            expires_in: Some(3600),
            token_type: Some("Bearer".into()),
        };
        let set = TokenSet::from_response(resp, 1_000_000);
        assert_eq!(set.expires_at_ms, Some(1_000_000 + 3_600_000));
        assert_eq!(set.refresh_token, Some("rt".into()));
    }

    #[test]
    fn missing_expires_in_leaves_expiry_unset() {
        let resp = TokenExchangeResponse { access_token: "at".into(), refresh_token: None, expires_in: None, token_type: None };
        let set = TokenSet::from_response(resp, 0);
        assert_eq!(set.expires_at_ms, None);
    }
}
