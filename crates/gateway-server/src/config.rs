//! Environment configuration, read directly with `std::env::var` plus
//! defaults rather than a config-file layer.

use gateway_oauth::ProviderConfig;
use std::env;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_DATABASE_URL: &str = "./data/gateway.sled";
const DEFAULT_KEY_PATH: &str = "./data/encryption.key";
const DEFAULT_CORS_ORIGIN: &str = "*";

/// Process configuration, read once at startup.
pub struct Config {
    /// `HOST` — interface to bind.
    pub host: String,
    /// `PORT` — TCP port to bind.
    pub port: u16,
    /// `DATABASE_URL` — path to the sled store.
    pub database_url: String,
    /// `ENCRYPTION_KEY_PATH` — path to the credential encryption key file.
    pub encryption_key_path: String,
    /// `CORS_ORIGIN` — allowed origin for the HTTP management API.
    pub cors_origin: String,
    /// `ADMIN_TOKEN` — bearer token the management API compares against.
    pub admin_token: String,
    /// Providers built from `OAUTH_PROVIDERS` and their per-provider env vars.
    pub oauth_providers: Vec<ProviderConfig>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Load configuration from the process environment. `PORT`, if set,
    /// must parse as a `u16`; everything else is optional with a default.
    pub fn from_env() -> Result<Self, String> {
        let port = match env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|e| format!("PORT must be a valid port number: {e}"))?,
            Err(_) => DEFAULT_PORT,
        };

        Ok(Self {
            host: env_or("HOST", DEFAULT_HOST),
            port,
            database_url: env_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            encryption_key_path: env_or("ENCRYPTION_KEY_PATH", DEFAULT_KEY_PATH),
            cors_origin: env_or("CORS_ORIGIN", DEFAULT_CORS_ORIGIN),
            // Management API admin bearer token. Empty disables the
            // surface rather than silently accepting any bearer value;
            // `gateway-rpc`'s constant-time compare still runs either way.
            admin_token: env_or("ADMIN_TOKEN", ""),
            oauth_providers: oauth_providers_from_env(&env_or("OAUTH_PROVIDERS", "")),
        })
    }
}

/// Build one `ProviderConfig` per comma-separated id in `OAUTH_PROVIDERS`
/// (e.g. `"gmail,outlook"`), reading `<PROVIDER>_CLIENT_ID`/`_SECRET` and
/// friends for each (spec.md §6). A provider missing its client id/secret
/// is skipped with a warning rather than failing the whole process, since
/// an operator may only have some providers configured.
fn oauth_providers_from_env(list: &str) -> Vec<ProviderConfig> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|id| provider_config_from_env(id))
        .collect()
}

fn provider_config_from_env(id: &str) -> Option<ProviderConfig> {
    let upper = id.to_ascii_uppercase();
    let var = |suffix: &str| env::var(format!("{upper}_{suffix}")).ok();

    let client_id = var("CLIENT_ID");
    let client_secret = var("CLIENT_SECRET");
    let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
        tracing::warn!(provider = %id, "OAUTH_PROVIDERS lists this provider but its client id/secret is not configured, skipping");
        return None;
    };

    let auth_url = var("AUTH_URL")?;
    let token_url = var("TOKEN_URL")?;
    let identity_url = var("IDENTITY_URL")?;
    let redirect_uri = var("REDIRECT_URI")?;
    let scopes = var("SCOPES").map(|s| s.split(' ').map(str::to_string).collect()).unwrap_or_default();

    Some(ProviderConfig { plugin_id: id.to_string(), client_id, client_secret, auth_url, token_url, identity_url, scopes, redirect_uri })
}
