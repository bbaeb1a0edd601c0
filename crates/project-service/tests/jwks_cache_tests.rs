//! Key set fetcher and cache integration tests.
//!
//! Runs the real HTTP fetcher against a mocked JWKS endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures::future::join_all;
use project_service::auth::{KeyCache, KeySetSource, RemoteKeySetFetcher};
use project_service::errors::AuthError;
use project_test_utils::{key_set, MockJwks, TestKeypair, KEY_EXPONENT};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn fetcher_for(jwks: &MockJwks) -> Arc<RemoteKeySetFetcher> {
    Arc::new(RemoteKeySetFetcher::new(jwks.url()))
}

// ============================================================================
// RemoteKeySetFetcher
// ============================================================================

#[tokio::test]
async fn test_fetch_keeps_only_usable_rsa_keys() {
    let jwks = MockJwks::start().await;
    jwks.serve_keys(key_set(&[
        TestKeypair::primary().jwk_json("k1"),
        json!({"kty": "EC", "kid": "ec-1", "crv": "P-256", "x": "abc", "y": "def"}),
        json!({"kty": "RSA", "kid": "no-modulus", "e": KEY_EXPONENT}),
        json!({"kty": "RSA", "n": TestKeypair::primary().modulus(), "e": KEY_EXPONENT}),
        json!({"kty": "RSA", "kid": "bad-b64", "n": "!!!", "e": KEY_EXPONENT}),
        TestKeypair::secondary().jwk_json("k2"),
    ]))
    .await;

    let keys = fetcher_for(&jwks).fetch_key_set().await.unwrap();

    assert_eq!(keys.len(), 2);
    assert!(keys.contains_key("k1"));
    assert!(keys.contains_key("k2"));
    assert_eq!(
        keys.get("k1").unwrap().modulus_b64(),
        TestKeypair::primary().modulus()
    );
    assert_eq!(keys.get("k2").unwrap().public_exponent(), Some(65537));
}

#[tokio::test]
async fn test_fetch_non_200_is_fetch_error() {
    for status in [404, 500, 503] {
        let jwks = MockJwks::start().await;
        jwks.serve_status(status).await;

        let result = fetcher_for(&jwks).fetch_key_set().await;

        assert!(
            matches!(result, Err(AuthError::Fetch(ref msg)) if msg.contains(&status.to_string())),
            "status {status} gave {result:?}"
        );
    }
}

#[tokio::test]
async fn test_fetch_malformed_body_is_fetch_error() {
    let jwks = MockJwks::start().await;
    jwks.serve_raw("{not json").await;

    let result = fetcher_for(&jwks).fetch_key_set().await;

    assert!(matches!(result, Err(AuthError::Fetch(_))));
}

#[tokio::test]
async fn test_fetch_document_without_keys_is_empty_set() {
    let jwks = MockJwks::start().await;
    jwks.serve_raw(r#"{"issuer":"nope"}"#).await;

    let keys = fetcher_for(&jwks).fetch_key_set().await.unwrap();

    assert!(keys.is_empty());
}

#[tokio::test]
async fn test_fetch_timeout_is_fetch_error() {
    let jwks = MockJwks::start().await;
    jwks.serve_keys_delayed(
        key_set(&[TestKeypair::primary().jwk_json("k1")]),
        Duration::from_secs(5),
    )
    .await;

    let fetcher = RemoteKeySetFetcher::with_timeout(jwks.url(), Duration::from_millis(200));
    let result = fetcher.fetch_key_set().await;

    assert!(matches!(result, Err(AuthError::Fetch(_))));
}

#[tokio::test]
async fn test_fetch_unreachable_host_is_fetch_error() {
    // Port 9 (discard) on loopback is not listening in test environments
    let fetcher = RemoteKeySetFetcher::with_timeout(
        "http://127.0.0.1:9/certs".to_string(),
        Duration::from_secs(2),
    );

    let result = fetcher.fetch_key_set().await;

    assert!(matches!(result, Err(AuthError::Fetch(_))));
}

// ============================================================================
// KeyCache over HTTP
// ============================================================================

#[tokio::test]
async fn test_concurrent_lookups_share_one_request() {
    let jwks = MockJwks::start().await;
    jwks.serve_keys_expecting(key_set(&[TestKeypair::primary().jwk_json("k1")]), 1)
        .await;

    let cache = Arc::new(KeyCache::new(fetcher_for(&jwks)));

    let lookups = (0..32).map(|_| {
        let cache = Arc::clone(&cache);
        async move { cache.lookup("k1").await }
    });
    let results = join_all(lookups).await;

    assert!(results.iter().all(|r| r.is_ok()));
    jwks.verify().await;
}

#[tokio::test]
async fn test_rotation_visible_on_next_miss() {
    let jwks = MockJwks::start().await;
    jwks.serve_keys(key_set(&[TestKeypair::primary().jwk_json("k1")]))
        .await;

    let cache = KeyCache::new(fetcher_for(&jwks));

    assert!(cache.lookup("k1").await.is_ok());
    assert_eq!(cache.lookup("k2").await.unwrap_err(), AuthError::KeyNotFound);
    assert_eq!(jwks.request_count().await, 2);

    // Provider rotates to k2
    jwks.reset().await;
    jwks.serve_keys(key_set(&[TestKeypair::secondary().jwk_json("k2")]))
        .await;

    // Cached k1 is still served without a request
    assert!(cache.lookup("k1").await.is_ok());
    assert_eq!(jwks.request_count().await, 0);

    // The miss on k2 refreshes and finds it
    assert!(cache.lookup("k2").await.is_ok());
    assert_eq!(jwks.request_count().await, 1);

    // k1 was replaced wholesale
    assert_eq!(cache.lookup("k1").await.unwrap_err(), AuthError::KeyNotFound);
    assert_eq!(jwks.request_count().await, 2);
}

#[tokio::test]
async fn test_expired_set_refetched() {
    let jwks = MockJwks::start().await;
    jwks.serve_keys(key_set(&[TestKeypair::primary().jwk_json("k1")]))
        .await;

    let cache = KeyCache::with_ttl(fetcher_for(&jwks), Duration::from_millis(300));

    assert!(cache.lookup("k1").await.is_ok());
    assert!(cache.lookup("k1").await.is_ok());
    assert_eq!(jwks.request_count().await, 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!cache.is_fresh().await);

    assert!(cache.lookup("k1").await.is_ok());
    assert_eq!(jwks.request_count().await, 2);
}

#[tokio::test]
async fn test_failed_fetch_is_not_cached() {
    let jwks = MockJwks::start().await;
    jwks.serve_status(500).await;

    let cache = KeyCache::new(fetcher_for(&jwks));

    assert_eq!(cache.lookup("k1").await.unwrap_err(), AuthError::KeyNotFound);
    assert!(!cache.is_fresh().await);

    // Provider recovers
    jwks.reset().await;
    jwks.serve_keys(key_set(&[TestKeypair::primary().jwk_json("k1")]))
        .await;

    assert!(cache.lookup("k1").await.is_ok());
    assert!(cache.is_fresh().await);
    assert_eq!(jwks.request_count().await, 1);
}

#[tokio::test]
async fn test_force_refresh_reports_fetch_error() {
    let jwks = MockJwks::start().await;
    jwks.serve_status(502).await;

    let cache = KeyCache::new(fetcher_for(&jwks));

    assert!(matches!(
        cache.force_refresh().await,
        Err(AuthError::Fetch(_))
    ));
}
