//! Trust gateway process entrypoint: env config is read first, `tracing`
//! is initialized before anything else, then the HTTP server is served.
//!
//! Exit codes: `0` normal, `1` fatal startup (missing config, key file
//! unreadable, store unreachable).

mod config;

use config::Config;
use gateway_core::{process_clock, Clock};
use gateway_crypto::aead::FileKeyProvider;
use gateway_crypto::CredentialCipher;
use gateway_rpc::{build_app, AppState};
use gateway_store::Store;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> ExitCode {
    gateway_telemetry::init_json_logging();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!(error = %message, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let config = Config::from_env()?;

    let store = Store::open(&config.database_url).map_err(|e| format!("failed to open store at {}: {e}", config.database_url))?;
    let key_provider = FileKeyProvider::load_or_create(&config.encryption_key_path)
        .map_err(|e| format!("failed to load/create encryption key at {}: {e}", config.encryption_key_path))?;
    let cipher = CredentialCipher::new(key_provider);
    let clock: Arc<dyn Clock> = process_clock();

    let mut state = AppState::new(store, cipher, config.admin_token.clone(), clock);
    if config.admin_token.is_empty() {
        tracing::warn!("ADMIN_TOKEN is unset; the HTTP management API will reject every request (empty bearer tokens never match)");
    }
    for provider in &config.oauth_providers {
        tracing::info!(provider = %provider.plugin_id, "registering oauth provider");
        state.oauth.register_provider(provider.plugin_id.clone(), provider.clone());
    }
    let state = Arc::new(state);

    spawn_session_sweeper(state.clone());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| format!("failed to bind {addr}: {e}"))?;
    tracing::info!(%addr, "trust gateway listening");

    let app = build_app(state.clone(), &config.cors_origin).map_err(|e| format!("invalid configuration: {e}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .map_err(|e| format!("server error: {e}"))?;
    Ok(())
}

/// Wait for Ctrl-C, then drop every live session (spec.md §4.5: "Cleanup
/// on shutdown closes all sessions").
async fn shutdown_signal<K>(state: Arc<AppState<K>>)
where
    K: gateway_crypto::KeyProvider + Clone + Send + Sync + 'static,
{
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!(live_sessions = state.sessions.len(), "shutdown signal received, closing sessions");
    state.sessions.clear();
}

/// Periodically reap idle sessions past their TTL (spec.md §5: session
/// cleanup is part of the process's ambient resource management, not a
/// per-request concern).
fn spawn_session_sweeper<K>(state: Arc<AppState<K>>)
where
    K: gateway_crypto::KeyProvider + Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            state.sessions.sweep();
        }
    });
}
