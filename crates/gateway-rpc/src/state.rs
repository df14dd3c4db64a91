//! Process-wide application state shared by the RPC transport and the
//! management API (spec.md §6). Grounded on `pagi-xcurzens-gateway`'s
//! `AppState`/`main.rs` wiring: one `Arc<AppState>` handed to every axum
//! router via `.with_state(...)`.

use std::sync::Arc;

use axum::Router as AxumRouter;
use gateway_core::Clock;
use gateway_crypto::{CredentialCipher, KeyProvider};
use gateway_oauth::OauthAcquirer;
use gateway_policy::Engine;
use gateway_router::Router;
use gateway_store::Store;
use tower_http::cors::CorsLayer;

use crate::session::SessionTable;

/// Everything a request handler needs, reachable through one `Arc`.
pub struct AppState<K: KeyProvider> {
    pub store: Store,
    pub router: Router<K>,
    pub oauth: OauthAcquirer<K>,
    pub sessions: SessionTable,
    /// Bearer token admin endpoints compare against, constant-time.
    pub admin_token: String,
    pub clock: Arc<dyn Clock>,
}

impl<K: KeyProvider> AppState<K> {
    #[must_use]
    pub fn new(store: Store, cipher: CredentialCipher<K>, admin_token: String, clock: Arc<dyn Clock>) -> Self
    where
        K: Clone,
    {
        let vids = gateway_vid::VidManager::new(store.clone());
        let router = Router::new(store.clone(), cipher.clone(), vids);
        let oauth = OauthAcquirer::new(store.clone(), cipher, clock.clone());
        Self { store, router, oauth, sessions: SessionTable::new(clock.clone()), admin_token, clock }
    }

    /// The rule engine snapshot for this evaluation. Rebuilt from the store
    /// on every call per spec.md §4.1's "Guarantees" (pure evaluation over
    /// an in-memory snapshot — never a long-lived cache that could go stale
    /// against a concurrent `/api/policies` edit).
    pub fn policy_engine(&self) -> Result<Engine, gateway_core::GatewayError> {
        let rules = gateway_policy::store::list_rules(&self.store)?;
        Ok(Engine::with_rules(rules))
    }
}

/// Assemble the full HTTP surface: the JSON-RPC tool-call transport plus
/// the management API, CORS-wrapped (spec.md §6).
///
/// Fails the same way every other startup misconfiguration does (a plain
/// `Err`, never a panic) if `cors_origin` isn't `"*"` and doesn't parse as
/// a header value.
pub fn build_app<K>(state: Arc<AppState<K>>, cors_origin: &str) -> Result<AxumRouter, String>
where
    K: KeyProvider + Clone + Send + Sync + 'static,
{
    let cors = if cors_origin == "*" {
        CorsLayer::permissive()
    } else {
        let origin = cors_origin
            .parse::<axum::http::HeaderValue>()
            .map_err(|e| format!("CORS_ORIGIN {cors_origin:?} is not a valid header value: {e}"))?;
        CorsLayer::new().allow_origin(origin)
    };

    Ok(AxumRouter::new()
        .merge(crate::transport::router::<K>())
        .merge(crate::management::router::<K>(state.clone()))
        .layer(cors)
        .with_state(state))
}
