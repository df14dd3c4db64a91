//! End-to-end HTTP coverage for spec.md §8's six concrete scenarios,
//! exercised against the real `build_app` router over `tower::ServiceExt::
//! oneshot` rather than any one crate's internals. Grounded on the
//! `adamtc007-ob-poc` `sem_os_server` `authoring_http_integration` test's
//! shape: build the router, drive it with real HTTP requests, assert on
//! status codes and JSON bodies.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use gateway_accounts::account::create_account;
use gateway_accounts::credential::{store_credentials, CredentialType};
use gateway_core::FrozenClock;
use gateway_crypto::aead::FileKeyProvider;
use gateway_crypto::CredentialCipher;
use gateway_policy::ast::Condition;
use gateway_policy::rule::{Action, Scope};
use gateway_policy::store::{create_pattern, create_rule};
use gateway_router::{FailingMockBackend, NormalizedRecord, ProviderBackend, RateLimitConfig, StaticMockBackend};
use gateway_rpc::{build_app, AppState, SESSION_HEADER};
use gateway_store::Store;

const ADMIN_TOKEN: &str = "test-admin-token";

fn cipher() -> CredentialCipher<FileKeyProvider> {
    CredentialCipher::new(FileKeyProvider::from_bytes([7u8; 32]))
}

fn new_state() -> (Store, Arc<AppState<FileKeyProvider>>) {
    let store = Store::open_temporary().unwrap();
    let clock = Arc::new(FrozenClock::new(1_700_000_000_000));
    let state = AppState::new(store.clone(), cipher(), ADMIN_TOKEN.to_string(), clock);
    (store, Arc::new(state))
}

fn record(id: &str, account_id: &str, subject: &str, body: &str, timestamp_ms: u64) -> NormalizedRecord {
    NormalizedRecord {
        id: id.into(),
        account_id: account_id.into(),
        plugin_id: "mockmail".into(),
        subject: subject.into(),
        from: "sender@example.com".into(),
        to: vec!["agent@example.com".into()],
        cc: None,
        bcc: None,
        reply_to: None,
        body: Some(body.into()),
        html_body: None,
        snippet: None,
        timestamp_ms,
        is_read: false,
        is_starred: None,
        labels: None,
        thread_id: None,
        has_attachments: false,
        attachments: None,
    }
}

async fn send(app: &axum::Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value: Value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

/// `initialize`, returning the session id handed back on `Mcp-Session-Id`.
async fn initialize(app: &axum::Router, agent: &str) -> String {
    let req = Request::post("/rpc")
        .header("content-type", "application/json")
        .body(Body::from(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"agent": agent}}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.headers().get(SESSION_HEADER).unwrap().to_str().unwrap().to_string()
}

async fn tools_call(app: &axum::Router, session_id: &str, name: &str, arguments: Value) -> Value {
    let req = Request::post("/rpc")
        .header("content-type", "application/json")
        .header(SESSION_HEADER, session_id)
        .body(Body::from(
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": name, "arguments": arguments}}).to_string(),
        ))
        .unwrap();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK, "tools/call transport itself never fails with a non-200");
    body["result"].clone()
}

fn tool_text(result: &Value) -> String {
    result["content"][0]["text"].as_str().unwrap().to_string()
}

async fn admin(app: &axum::Router, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(path).header("authorization", format!("Bearer {ADMIN_TOKEN}"));
    let req = if let Some(body) = body {
        builder = builder.header("content-type", "application/json");
        builder.body(Body::from(body.to_string())).unwrap()
    } else {
        builder.body(Body::empty()).unwrap()
    };
    send(app, req).await
}

// ── Scenario 1: BLOCK by a global rule ──────────────────────────────────

#[tokio::test]
async fn blanket_block_rule_denies_the_call_and_is_audited() {
    let (store, state) = new_state();
    create_rule(&store, Scope::default(), Action::Block, Condition::Lit(json!(true)), Some("lockdown".into()), 100, true).unwrap();

    let app = build_app(state, "*").unwrap();
    let session_id = initialize(&app, "agent-1").await;

    let result = tools_call(&app, &session_id, "list_emails", json!({})).await;
    assert!(result["isError"].as_bool().unwrap());
    assert!(tool_text(&result).contains("blocked by policy"));

    let (status, logs) = admin(&app, "GET", "/api/audit-logs", None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = logs.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["status"], json!("denied"));
    assert!(entries[0]["decision"]["rule_id"].is_string());
}

// ── Scenario 2: REDACT round-trip ───────────────────────────────────────

#[tokio::test]
async fn redact_rule_scrubs_ssn_from_the_listed_result() {
    let store = Store::open_temporary().unwrap();
    let clock = Arc::new(FrozenClock::new(1_700_000_000_000));
    let mut state = AppState::new(store.clone(), cipher(), ADMIN_TOKEN.to_string(), clock);

    let account = create_account(&store, "mockmail".into(), "user@example.com".into(), None, None).unwrap();
    store_credentials(&store, &cipher(), Some(account.id.clone()), "mockmail".into(), CredentialType::ApiKey, b"token").unwrap();

    let backend = StaticMockBackend::new();
    backend.seed(&account.id, vec![record("r1", &account.id, "hi", "call me, SSN 123-45-6789", 100)]);
    state.router.register_backend("email", "mockmail", Arc::new(backend) as Arc<dyn ProviderBackend>, RateLimitConfig::FAST);

    create_rule(&store, Scope::default(), Action::Redact, Condition::Lit(json!(true)), None, 10, true).unwrap();
    create_pattern(&store, "ssn".into(), r"\b\d{3}-\d{2}-\d{4}\b".into(), "[SSN_REDACTED]".into(), true).unwrap();

    let app = build_app(Arc::new(state), "*").unwrap();
    let session_id = initialize(&app, "agent-1").await;

    let result = tools_call(&app, &session_id, "list_emails", json!({})).await;
    assert!(!result["isError"].as_bool().unwrap());
    let text = tool_text(&result);
    assert!(text.contains("[SSN_REDACTED]"));
    assert!(!text.contains("123-45-6789"));
}

// ── Scenario 3: REQUIRE_APPROVAL lifecycle ──────────────────────────────

#[tokio::test]
async fn require_approval_files_a_request_then_approve_resolves_it() {
    let (store, state) = new_state();
    create_rule(
        &store,
        Scope::default(),
        Action::RequireApproval,
        Condition::Eq(Box::new(Condition::Var("tool".into())), Box::new(Condition::Lit(json!("send_email")))),
        Some("sends need a human".into()),
        50,
        true,
    )
    .unwrap();

    let app = build_app(state, "*").unwrap();
    let session_id = initialize(&app, "agent-1").await;

    let result = tools_call(&app, &session_id, "send_email", json!({"to": ["a@b.com"], "subject": "hi", "body": "hi"})).await;
    assert!(result["isError"].as_bool().unwrap());
    let text = tool_text(&result);
    assert!(text.contains("requires human approval"));
    let approval_id = text.split("request id ").nth(1).unwrap().split(' ').next().unwrap().to_string();

    let (status, approval) = admin(&app, "GET", &format!("/api/approval-requests/{approval_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approval["status"], json!("pending"));

    let (status, approved) = admin(&app, "POST", &format!("/api/approval-requests/{approval_id}/approve"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], json!("approved"));

    // Resolving a second time is rejected: the transition is monotonic.
    let (status, _) = admin(&app, "POST", &format!("/api/approval-requests/{approval_id}/deny"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Scenario 4: fan-out partial failure ─────────────────────────────────

#[tokio::test]
async fn one_failing_account_does_not_sink_the_whole_listing() {
    let store = Store::open_temporary().unwrap();
    let clock = Arc::new(FrozenClock::new(1_700_000_000_000));
    let mut state = AppState::new(store.clone(), cipher(), ADMIN_TOKEN.to_string(), clock);

    let good = create_account(&store, "goodmail".into(), "good@example.com".into(), None, None).unwrap();
    let bad = create_account(&store, "badmail".into(), "bad@example.com".into(), None, None).unwrap();
    store_credentials(&store, &cipher(), Some(good.id.clone()), "goodmail".into(), CredentialType::ApiKey, b"good-token").unwrap();
    store_credentials(&store, &cipher(), Some(bad.id.clone()), "badmail".into(), CredentialType::ApiKey, b"bad-token").unwrap();

    let good_backend = StaticMockBackend::new();
    good_backend.seed(&good.id, vec![record("r1", &good.id, "fine", "fine", 100)]);
    state.router.register_backend("email", "goodmail", Arc::new(good_backend) as Arc<dyn ProviderBackend>, RateLimitConfig::FAST);
    state.router.register_backend("email", "badmail", Arc::new(FailingMockBackend::new("provider down")) as Arc<dyn ProviderBackend>, RateLimitConfig::FAST);

    create_rule(&store, Scope::default(), Action::Allow, Condition::Lit(json!(true)), None, 10, true).unwrap();

    let app = build_app(Arc::new(state), "*").unwrap();
    let session_id = initialize(&app, "agent-1").await;

    let result = tools_call(&app, &session_id, "list_emails", json!({})).await;
    assert!(!result["isError"].as_bool().unwrap(), "one dead backend must not fail the whole fan-out");
    let records: Value = serde_json::from_str(&tool_text(&result)).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 1, "only the surviving account's record should appear");

    let (status, logs) = admin(&app, "GET", "/api/audit-logs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs[0]["status"], json!("success"));
    // spec.md §8 scenario 4: the audit entry's metadata names both
    // accounts the fan-out queried, not just the one that contributed
    // records.
    assert_eq!(logs[0]["metadata"]["accountCount"], json!(2));
}

// ── Scenario 5: virtual-id race ──────────────────────────────────────────

#[tokio::test]
async fn concurrent_listings_converge_on_one_virtual_id_per_record() {
    let store = Store::open_temporary().unwrap();
    let clock = Arc::new(FrozenClock::new(1_700_000_000_000));
    let mut state = AppState::new(store.clone(), cipher(), ADMIN_TOKEN.to_string(), clock);

    let account = create_account(&store, "mockmail".into(), "user@example.com".into(), None, None).unwrap();
    store_credentials(&store, &cipher(), Some(account.id.clone()), "mockmail".into(), CredentialType::ApiKey, b"token").unwrap();
    let backend = StaticMockBackend::new();
    backend.seed(&account.id, vec![record("same-record", &account.id, "subj", "body", 100)]);
    state.router.register_backend("email", "mockmail", Arc::new(backend) as Arc<dyn ProviderBackend>, RateLimitConfig::FAST);

    create_rule(&store, Scope::default(), Action::Allow, Condition::Lit(json!(true)), None, 10, true).unwrap();

    let app = build_app(Arc::new(state), "*").unwrap();
    let session_a = initialize(&app, "agent-a").await;
    let session_b = initialize(&app, "agent-b").await;

    let (result_a, result_b) = tokio::join!(
        tools_call(&app, &session_a, "list_emails", json!({})),
        tools_call(&app, &session_b, "list_emails", json!({})),
    );

    let vid_a = tool_text(&result_a);
    let vid_b = tool_text(&result_b);
    let parsed_a: Value = serde_json::from_str(&vid_a).unwrap();
    let parsed_b: Value = serde_json::from_str(&vid_b).unwrap();
    assert_eq!(parsed_a[0]["id"], parsed_b[0]["id"], "the same underlying record must resolve to one virtual id under concurrent discovery");
}

// ── Scenario 6: OAuth + PKCE happy path ──────────────────────────────────

#[tokio::test]
async fn oauth_start_then_callback_connects_an_account() {
    let token_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/token"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-123",
            "refresh_token": "rt-456",
            "expires_in": 3600,
        })))
        .mount(&token_server)
        .await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/identity"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
            "email": "connected@example.com",
            "name": "Connected User",
        })))
        .mount(&token_server)
        .await;

    let store = Store::open_temporary().unwrap();
    let clock = Arc::new(FrozenClock::new(1_700_000_000_000));
    let mut state = AppState::new(store.clone(), cipher(), ADMIN_TOKEN.to_string(), clock);
    state.oauth.register_provider(
        "gmail",
        gateway_oauth::ProviderConfig {
            plugin_id: "gmail".into(),
            client_id: "client-1".into(),
            client_secret: "secret-1".into(),
            auth_url: "https://provider.example/authorize".into(),
            token_url: format!("{}/token", token_server.uri()),
            identity_url: format!("{}/identity", token_server.uri()),
            scopes: vec!["mail.read".into()],
            redirect_uri: "https://gateway.example/oauth/callback/gmail".into(),
        },
    );

    let app = build_app(Arc::new(state), "*").unwrap();

    let (status, start_body) = admin(&app, "GET", "/oauth/gmail/start", None).await;
    assert_eq!(status, StatusCode::OK);
    let auth_url = start_body["authUrl"].as_str().unwrap().to_string();
    let oauth_state = auth_url.split("state=").nth(1).unwrap().split('&').next().unwrap().to_string();

    let callback_path = format!("/oauth/callback/gmail?code=auth-code-xyz&state={oauth_state}");
    let (status, _) = admin(&app, "GET", &callback_path, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, status_body) = admin(&app, "GET", "/oauth/gmail/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_body["connected"], json!(true));
}

// ── Admin auth: empty token never matches ───────────────────────────────

#[tokio::test]
async fn unset_admin_token_rejects_even_an_empty_bearer_header() {
    let store = Store::open_temporary().unwrap();
    let clock = Arc::new(FrozenClock::new(1_700_000_000_000));
    // `ADMIN_TOKEN` unset: `AppState` holds an empty admin token, the
    // documented default (gateway-server/src/config.rs).
    let state = AppState::new(store, cipher(), String::new(), clock);
    let app = build_app(Arc::new(state), "*").unwrap();

    let req = Request::get("/api/audit-logs").header("authorization", "Bearer ").body(Body::empty()).unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "an empty bearer token must never match an unset admin token");

    let req = Request::get("/api/audit-logs").body(Body::empty()).unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "a missing header must also be rejected once ADMIN_TOKEN is unset");
}
