//! Fan-out partial-failure coverage: one account's backend erroring must
//! not sink a domain-wide `list`/`search` call (spec.md §4.4, §8 scenario
//! 4).

use gateway_accounts::account::create_account;
use gateway_accounts::credential::{store_credentials, CredentialType};
use gateway_crypto::aead::FileKeyProvider;
use gateway_crypto::CredentialCipher;
use gateway_router::{
    FailingMockBackend, ListParams, NormalizedRecord, RateLimitConfig, Router, SearchParams, StaticMockBackend,
};
use gateway_store::Store;
use gateway_vid::VidManager;
use std::sync::Arc;

fn record(id: &str, account_id: &str, timestamp_ms: u64, subject: &str) -> NormalizedRecord {
    NormalizedRecord {
        id: id.into(),
        account_id: account_id.into(),
        plugin_id: "good-mail".into(),
        subject: subject.into(),
        from: "sender@x.com".into(),
        to: vec!["me@x.com".into()],
        cc: None,
        bcc: None,
        reply_to: None,
        body: None,
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

fn build_router() -> (Router<FileKeyProvider>, Store, Arc<StaticMockBackend>) {
    let store = Store::open_temporary().unwrap();
    let cipher = CredentialCipher::new(FileKeyProvider::from_bytes([7u8; 32]));
    let vids = VidManager::new(store.clone());
    let mut router = Router::new(store.clone(), cipher.clone(), vids);

    let good_account = create_account(&store, "good-mail".into(), "good@x.com".into(), None, None).unwrap();
    let bad_account = create_account(&store, "bad-mail".into(), "bad@x.com".into(), None, None).unwrap();
    store_credentials(&store, &cipher, Some(good_account.id.clone()), "good-mail".into(), CredentialType::Oauth2, b"token").unwrap();
    store_credentials(&store, &cipher, Some(bad_account.id.clone()), "bad-mail".into(), CredentialType::Oauth2, b"token").unwrap();

    let good_backend = Arc::new(StaticMockBackend::new());
    good_backend.seed(&good_account.id, vec![record("r1", &good_account.id, 200, "hello"), record("r2", &good_account.id, 100, "world")]);
    router.register_backend("email", "good-mail", good_backend.clone(), RateLimitConfig::FAST);

    let bad_backend = Arc::new(FailingMockBackend::new("provider unreachable"));
    router.register_backend("email", "bad-mail", bad_backend, RateLimitConfig::FAST);

    (router, store, good_backend)
}

#[tokio::test]
async fn list_survives_one_account_failing() {
    let (router, _store, _good) = build_router();
    let (records, account_count) = router.list("email", ListParams::default()).await.unwrap();
    assert_eq!(records.len(), 2);
    // Two accounts (one good, one failing) were queried, matching
    // spec.md §8 scenario 4's accountCount=2 even though only one
    // contributed records.
    assert_eq!(account_count, 2);
}

#[tokio::test]
async fn list_merges_newest_first_across_the_surviving_account() {
    let (router, _store, _good) = build_router();
    let (records, _account_count) = router.list("email", ListParams::default()).await.unwrap();
    assert!(records[0].timestamp_ms >= records[1].timestamp_ms);
}

#[tokio::test]
async fn search_survives_one_account_failing() {
    let (router, _store, _good) = build_router();
    let params = SearchParams { query: "hello".into(), ..SearchParams::default() };
    let (records, account_count) = router.search("email", params).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(account_count, 2);
}

#[tokio::test]
async fn list_errors_when_every_account_fails() {
    let store = Store::open_temporary().unwrap();
    let cipher = CredentialCipher::new(FileKeyProvider::from_bytes([8u8; 32]));
    let vids = VidManager::new(store.clone());
    let mut router = Router::new(store.clone(), cipher.clone(), vids);

    let account = create_account(&store, "bad-mail".into(), "bad@x.com".into(), None, None).unwrap();
    store_credentials(&store, &cipher, Some(account.id.clone()), "bad-mail".into(), CredentialType::Oauth2, b"token").unwrap();
    router.register_backend("email", "bad-mail", Arc::new(FailingMockBackend::new("down")), RateLimitConfig::FAST);

    let result = router.list("email", ListParams::default()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn account_with_no_credentials_is_skipped_not_failed() {
    let store = Store::open_temporary().unwrap();
    let cipher = CredentialCipher::new(FileKeyProvider::from_bytes([9u8; 32]));
    let vids = VidManager::new(store.clone());
    let mut router = Router::new(store.clone(), cipher.clone(), vids);

    // No store_credentials call for this account: discover_live_accounts
    // must skip it with a warning rather than surface an error.
    create_account(&store, "good-mail".into(), "good@x.com".into(), None, None).unwrap();
    router.register_backend("email", "good-mail", Arc::new(StaticMockBackend::new()), RateLimitConfig::FAST);

    let (records, account_count) = router.list("email", ListParams::default()).await.unwrap();
    assert!(records.is_empty());
    assert_eq!(account_count, 0, "the uncredentialed account never reached the fan-out");
}
