//! Per-provider OAuth endpoint configuration (spec.md §4.6, §6's
//! `<PROVIDER>_CLIENT_ID`/`_SECRET` environment surface). `gateway-oauth`
//! itself has no knowledge of any concrete identity provider; `gateway-server`
//! builds one [`ProviderConfig`] per configured provider id from the
//! environment and registers it with an [`crate::OauthAcquirer`].

/// Static OAuth endpoint configuration for one provider (e.g. `"gmail"`).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider id, e.g. `"gmail"`. Matches the `pluginId` of accounts it
    /// creates.
    pub plugin_id: String,
    /// OAuth `client_id`.
    pub client_id: String,
    /// OAuth `client_secret`.
    pub client_secret: String,
    /// Authorization endpoint the agent's browser is redirected to.
    pub auth_url: String,
    /// Token endpoint for the authorization-code exchange.
    pub token_url: String,
    /// Identity endpoint used to learn the account's email after token
    /// exchange.
    pub identity_url: String,
    /// Space-joined scopes requested.
    pub scopes: Vec<String>,
    /// This server's registered redirect URI for this provider.
    pub redirect_uri: String,
}

impl ProviderConfig {
    /// Build the full authorization URL for a fresh `/auth-start` call
    /// (spec.md §4.6 step 1: `response_type=code`, `code_challenge_method=S256`,
    /// `prompt=consent`).
    #[must_use]
    pub fn authorization_url(&self, code_challenge: &str, state: &str) -> String {
        let scope = self.scopes.join(" ");
        let mut url = url::Url::parse(&self.auth_url).expect("configured auth_url must be a valid URL");
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &scope)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("prompt", "consent");
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            plugin_id: "gmail".into(),
            client_id: "client-123".into(),
            client_secret: "secret".into(),
            auth_url: "https://provider.example/o/authorize".into(),
            token_url: "https://provider.example/o/token".into(),
            identity_url: "https://provider.example/identity".into(),
            scopes: vec!["mail.read".into(), "mail.send".into()],
            redirect_uri: "https://gateway.example/oauth/callback/gmail".into(),
        }
    }

    #[test]
    fn authorization_url_carries_pkce_and_consent_params() {
        let url = config().authorization_url("challenge-abc", "state-xyz");
        assert!(url.contains("code_challenge=challenge-abc"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state=state-xyz"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("response_type=code"));
    }
}
