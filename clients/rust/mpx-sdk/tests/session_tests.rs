//! Token lifecycle against a mocked identity service

mod common;

use common::*;
use mpx_sdk::token_cache::TokenCachePool;
use mpx_sdk::{Error, Token, User, UserSession};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_sign_in_uses_shorter_lifetime_and_caches() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SIGN_IN_PATH))
        .and(basic_auth(USERNAME, PASSWORD))
        .and(query_param("schema", "1.0"))
        .and(query_param("form", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sign_in_body("tok-1")))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server);
    let token = session.acquire_token(None, false).await.unwrap();

    assert_eq!(token.value(), "tok-1");
    // idleTimeout (30 min) is shorter than duration (60 min)
    assert_eq!(token.lifetime_seconds(), 1800);

    let cached = session.token_cache().get_token(USERNAME).await.unwrap();
    assert_eq!(cached.value(), "tok-1");
}

#[tokio::test]
async fn test_valid_cached_token_is_reused() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SIGN_IN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(sign_in_body("tok-1")))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server);
    let first = session.acquire_token(None, false).await.unwrap();
    let second = session.acquire_token(None, false).await.unwrap();
    assert_eq!(first.value(), second.value());
}

#[tokio::test]
async fn test_requested_duration_longer_than_cached_forces_sign_in() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-new"]).await;
    mount_sign_out(&server).await;

    let session = session(&server);
    session
        .token_cache()
        .set_token(USERNAME, &Token::new("tok-short", 60))
        .await
        .unwrap();

    // The cached token has about a minute left, two hours are requested
    let token = session
        .acquire_token(Some(Duration::from_secs(7200)), false)
        .await
        .unwrap();
    assert_eq!(token.value(), "tok-new");

    let requests = server.received_requests().await.unwrap();
    let sign_in = requests
        .iter()
        .find(|r| r.url.path() == SIGN_IN_PATH)
        .unwrap();
    assert!(sign_in
        .url
        .query_pairs()
        .any(|(k, v)| k == "_duration" && v == "7200000"));
}

#[tokio::test]
async fn test_force_refresh_signs_out_old_token() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1", "tok-2"]).await;

    Mock::given(method("GET"))
        .and(path(SIGN_OUT_PATH))
        .and(query_param("_token", "tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"signOutResponse": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server);
    assert_eq!(session.acquire_token(None, false).await.unwrap().value(), "tok-1");
    assert_eq!(session.acquire_token(None, true).await.unwrap().value(), "tok-2");

    let cached = session.token_cache().get_token(USERNAME).await.unwrap();
    assert_eq!(cached.value(), "tok-2");
}

#[tokio::test]
async fn test_failed_sign_out_does_not_block_refresh() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1", "tok-2"]).await;

    Mock::given(method("GET"))
        .and(path(SIGN_OUT_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let session = session(&server);
    session.acquire_token(None, false).await.unwrap();
    let refreshed = session.acquire_token(None, true).await.unwrap();
    assert_eq!(refreshed.value(), "tok-2");
}

#[tokio::test]
async fn test_identity_rejection_is_authentication_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SIGN_IN_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(exception_body(
                401,
                "com.theplatform.authentication.api.exception.AuthenticationException",
            )),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = session(&server).acquire_token(None, false).await.unwrap_err();
    assert!(matches!(err, Error::Authentication { status: 401, .. }));
    // Identity failures never qualify for the data-request retry
    assert!(!err.is_token_auth_error());
}

#[tokio::test]
async fn test_sessions_sharing_a_cache_sign_in_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SIGN_IN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(sign_in_body("shared"))
                .set_delay(Duration::from_millis(50)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = TokenCachePool::in_memory();
    let lock: Arc<dyn mpx_sdk::lock::SessionLock> = Arc::new(mpx_sdk::lock::LocalLock::new());
    let make = || {
        Arc::new(
            UserSession::new(User::new(USERNAME, PASSWORD), reqwest::Client::new())
                .with_identity_url(server.uri())
                .with_token_cache(cache.clone())
                .with_lock(lock.clone()),
        )
    };

    let a = make();
    let b = make();
    let (ta, tb) = tokio::join!(a.acquire_token(None, false), b.acquire_token(None, false));
    assert_eq!(ta.unwrap().value(), "shared");
    assert_eq!(tb.unwrap().value(), "shared");
}

#[tokio::test]
async fn test_cancelled_acquire_releases_lock() {
    let server = MockServer::start().await;

    // The first sign-in hangs, the next one answers at once
    Mock::given(method("GET"))
        .and(path(SIGN_IN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(sign_in_body("slow"))
                .set_delay(Duration::from_secs(30)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_sign_ins(&server, &["tok-1"]).await;

    let lock: Arc<dyn mpx_sdk::lock::SessionLock> = Arc::new(mpx_sdk::lock::LocalLock::new());
    let session = session(&server).with_lock(lock.clone());

    let cancelled = tokio::time::timeout(Duration::from_millis(100), session.acquire_token(None, false)).await;
    assert!(cancelled.is_err());

    let lease = tokio::time::timeout(Duration::from_millis(500), lock.acquire(USERNAME))
        .await
        .expect("lock should be free once the acquire is dropped")
        .unwrap();
    lock.release(lease).await.unwrap();

    let token = tokio::time::timeout(Duration::from_secs(2), session.acquire_token(None, false))
        .await
        .expect("acquire should not wait on the cancelled sign-in")
        .unwrap();
    assert_eq!(token.value(), "tok-1");
}

#[tokio::test]
async fn test_replace_token_reuses_newer_cached_token() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1", "tok-2"]).await;
    mount_sign_out(&server).await;

    let session = session(&server);
    let stale = session.acquire_token(None, false).await.unwrap();
    let fresh = session.replace_token(&stale).await.unwrap();
    assert_eq!(fresh.value(), "tok-2");

    // A second holder of the stale token gets the same replacement
    let again = session.replace_token(&stale).await.unwrap();
    assert_eq!(again.value(), "tok-2");

    let sign_ins = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == SIGN_IN_PATH)
        .count();
    assert_eq!(sign_ins, 2);
}

#[tokio::test]
async fn test_sign_out_current_clears_cache() {
    let server = MockServer::start().await;
    mount_sign_ins(&server, &["tok-1"]).await;
    mount_sign_out(&server).await;

    let session = session(&server);
    session.acquire_token(None, false).await.unwrap();
    session.sign_out_current().await.unwrap();

    let err = session.token_cache().get_token(USERNAME).await.unwrap_err();
    assert!(matches!(err, Error::TokenNotFound(_)));
}
