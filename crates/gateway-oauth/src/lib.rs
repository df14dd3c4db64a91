//! The PKCE OAuth acquirer (spec.md §4.6): `/auth-start`/`/auth-callback`
//! flow, token exchange, identity lookup, and credential deposit through
//! `gateway-accounts`.
//!
//! Grounded on `gateway-crypto::pkce` for the verifier/challenge/state
//! plumbing and on the `other_examples` mcp-gateway `handler.rs`'s
//! token-exchange HTTP shape for the `reqwest` call sequence. Raw tokens
//! never reach the store unencrypted: every credential passes through
//! `gateway_accounts::credential::store_credentials`.

#![deny(unsafe_code)]

pub mod provider;
pub mod token;

pub use provider::ProviderConfig;
pub use token::{IdentityResponse, TokenExchangeResponse, TokenSet};

use gateway_accounts::account::{create_account, list_accounts};
use gateway_accounts::credential::{store_credentials, CredentialType};
use gateway_accounts::Account;
use gateway_core::{Clock, GatewayError, Transience};
use gateway_crypto::{CredentialCipher, KeyProvider, StateStore};
use gateway_store::Store;
use std::collections::HashMap;
use std::sync::Arc;

/// Result of `/auth-start`: the URL the agent's browser must be sent to.
#[derive(Debug, Clone)]
pub struct AuthStart {
    /// Provider authorization URL, carrying the PKCE challenge and state.
    pub auth_url: String,
}

/// Result of a successful `/auth-callback`.
#[derive(Debug, Clone)]
pub struct AuthCallbackResult {
    /// The account the credential was deposited against.
    pub account: Account,
}

/// Registry of provider OAuth configurations plus the process-wide PKCE
/// state store. One instance lives for the life of the process
/// (spec.md §5: "the PKCE verifier store is process-wide with TTL").
pub struct OauthAcquirer<K: KeyProvider> {
    store: Store,
    cipher: CredentialCipher<K>,
    http: reqwest::Client,
    providers: HashMap<String, ProviderConfig>,
    states: StateStore,
    clock: Arc<dyn Clock>,
}

impl<K: KeyProvider> OauthAcquirer<K> {
    /// Build an acquirer over an empty provider registry.
    #[must_use]
    pub fn new(store: Store, cipher: CredentialCipher<K>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cipher,
            http: reqwest::Client::new(),
            providers: HashMap::new(),
            states: StateStore::new(clock.clone()),
            clock,
        }
    }

    /// Register (or replace) a provider's OAuth configuration, keyed by
    /// provider id (e.g. `"gmail"`).
    pub fn register_provider(&mut self, id: impl Into<String>, config: ProviderConfig) {
        self.providers.insert(id.into(), config);
    }

    fn provider(&self, id: &str) -> Result<&ProviderConfig, GatewayError> {
        self.providers.get(id).ok_or_else(|| GatewayError::Config(format!("unknown oauth provider {id}")))
    }

    /// spec.md §4.6 step 1: mint a PKCE verifier/challenge pair, a random
    /// state, stash `(state -> verifier)` with a 10-minute TTL, and build
    /// the provider's authorization URL.
    pub fn start(&self, provider_id: &str) -> Result<AuthStart, GatewayError> {
        let provider = self.provider(provider_id)?;
        let pair = gateway_crypto::pkce::generate_verifier();
        let state = self.states.put(pair.verifier);
        Ok(AuthStart { auth_url: provider.authorization_url(&pair.challenge, &state) })
    }

    /// spec.md §4.6 step 2: validate `state`/`code`, exchange the code for
    /// tokens, look up the account's identity, create/attach the account,
    /// and deposit the encrypted credential.
    pub async fn callback(&self, provider_id: &str, code: &str, state: &str) -> Result<AuthCallbackResult, GatewayError> {
        let provider = self.provider(provider_id)?;

        let verifier = self
            .states
            .take(state)
            .ok_or_else(|| GatewayError::Auth("oauth state is unknown or expired".into()))?;

        let tokens = self.exchange_code(provider, code, &verifier).await?;
        let identity = self.fetch_identity(provider, &tokens.access_token).await?;

        let account = match list_accounts(&self.store, Some(provider.plugin_id.as_str()))?
            .into_iter()
            .find(|a| a.email == identity.email)
        {
            Some(existing) => existing,
            None => create_account(&self.store, provider.plugin_id.clone(), identity.email.clone(), identity.name, None)?,
        };

        let payload = serde_json::to_vec(&tokens)?;
        store_credentials(
            &self.store,
            &self.cipher,
            Some(account.id.clone()),
            provider.plugin_id.clone(),
            CredentialType::Oauth2,
            &payload,
        )?;

        Ok(AuthCallbackResult { account })
    }

    /// spec.md §6: `GET /oauth/<provider>/status` — whether any account is
    /// connected for this provider.
    pub fn status(&self, provider_id: &str) -> Result<bool, GatewayError> {
        self.provider(provider_id)?;
        Ok(!list_accounts(&self.store, Some(provider_id))?.is_empty())
    }

    /// spec.md §6: `DELETE /oauth/<provider>` — disconnect the primary
    /// account for this provider, cascading its credential.
    pub fn disconnect(&self, provider_id: &str) -> Result<(), GatewayError> {
        self.provider(provider_id)?;
        if let Some(primary) = gateway_accounts::get_primary(&self.store, provider_id)? {
            gateway_accounts::delete_account(&self.store, &primary.id)?;
        } else if let Some(first) = list_accounts(&self.store, Some(provider_id))?.into_iter().next() {
            gateway_accounts::delete_account(&self.store, &first.id)?;
        }
        Ok(())
    }

    async fn exchange_code(&self, provider: &ProviderConfig, code: &str, verifier: &str) -> Result<TokenSet, GatewayError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", &provider.redirect_uri),
            ("client_id", &provider.client_id),
            ("client_secret", &provider.client_secret),
        ];
        let resp = self
            .http
            .post(&provider.token_url)
            .form(&params)
            .send()
            .await
            .map_err(reqwest_to_gateway_error)?;
        let resp = ensure_success(resp).await?;
        let parsed: TokenExchangeResponse = resp.json().await.map_err(reqwest_to_gateway_error)?;
        Ok(TokenSet::from_response(parsed, self.clock.now_ms()))
    }

    async fn fetch_identity(&self, provider: &ProviderConfig, access_token: &str) -> Result<IdentityResponse, GatewayError> {
        let resp = self
            .http
            .get(&provider.identity_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(reqwest_to_gateway_error)?;
        let resp = ensure_success(resp).await?;
        resp.json().await.map_err(reqwest_to_gateway_error)
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let transience = if status.is_server_error() || status.as_u16() == 429 { Transience::Transient } else { Transience::Permanent };
    let body = resp.text().await.unwrap_or_default();
    Err(GatewayError::Provider {
        transience,
        message: format!("oauth endpoint returned {status}: {body}"),
        status: Some(status.as_u16()),
    })
}

fn reqwest_to_gateway_error(e: reqwest::Error) -> GatewayError {
    let status = e.status().map(|s| s.as_u16());
    let transience = if e.is_timeout() || e.is_connect() || status.map(|s| s >= 500).unwrap_or(false) {
        Transience::Transient
    } else {
        Transience::Permanent
    };
    GatewayError::Provider { transience, message: e.to_string(), status }
}
