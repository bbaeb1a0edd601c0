//! JWKS client for fetching and caching public keys from the identity provider.
//!
//! The JWKS (JSON Web Key Set) endpoint publishes the RSA keys the provider
//! signs access tokens with. [`RemoteKeySetFetcher`] downloads and decodes
//! the set; [`KeyCache`] holds the decoded keys for a fixed TTL.
//!
//! # Cache semantics
//!
//! - The whole set shares one `valid_until`; a refresh replaces it wholesale
//! - Entries are only trusted before `valid_until`, stale entries included
//! - Any miss (expired set or unknown kid) refreshes once, then retries
//! - Concurrent misses share one in-flight fetch (single-flight)
//! - A failed fetch leaves the previous set untouched
//!
//! # Security
//!
//! - Only RSA descriptors with kid, n and e are usable; the rest are skipped
//! - HTTPS should be used in production (enforced by deployment config)

use crate::auth::keys::{decode_rsa_public_key, RsaPublicKey};
use crate::errors::AuthError;
use crate::observability::metrics;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::instrument;

/// Default cache TTL in seconds (10 minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 600;

/// Upper bound on the cache TTL in seconds (one day).
pub const MAX_CACHE_TTL_SECONDS: u64 = 86_400;

/// Default timeout for a key set fetch in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Decoded keys by key id.
pub type KeyMap = HashMap<String, Arc<RsaPublicKey>>;

/// JSON Web Key descriptor from a JWKS document.
///
/// Missing fields default to empty strings so incomplete descriptors can be
/// skipped instead of failing the whole document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" for usable keys).
    #[serde(default)]
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: String,

    /// RSA modulus (base64url encoded).
    #[serde(default)]
    pub n: String,

    /// RSA public exponent (base64url encoded).
    #[serde(default)]
    pub e: String,
}

/// JWKS document as published by the identity provider.
///
/// Descriptors are kept as raw JSON and converted one by one, so a single
/// descriptor with unexpected field types does not reject the document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeySetDocument {
    /// List of JSON Web Keys.
    #[serde(default)]
    pub keys: Vec<serde_json::Value>,
}

impl KeySetDocument {
    /// Decode every usable descriptor into a key map.
    ///
    /// Skips (without failing) descriptors that are not RSA, lack a kid,
    /// modulus or exponent, or whose key material does not decode. A later
    /// descriptor with a duplicate kid replaces an earlier one.
    pub fn usable_keys(&self) -> KeyMap {
        let mut keys = KeyMap::new();

        for raw in &self.keys {
            let jwk: Jwk = match serde_json::from_value(raw.clone()) {
                Ok(jwk) => jwk,
                Err(e) => {
                    tracing::debug!(target: "ps.auth.jwks", error = %e, "Skipping unparseable JWK");
                    continue;
                }
            };

            if jwk.kty != "RSA" || jwk.kid.is_empty() || jwk.n.is_empty() || jwk.e.is_empty() {
                tracing::debug!(
                    target: "ps.auth.jwks",
                    kty = %jwk.kty,
                    kid = %jwk.kid,
                    "Skipping non-RSA or incomplete JWK"
                );
                continue;
            }

            match decode_rsa_public_key(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys.insert(jwk.kid, Arc::new(key));
                }
                Err(e) => {
                    tracing::warn!(target: "ps.auth.jwks", kid = %jwk.kid, error = %e, "Skipping JWK with undecodable key material");
                }
            }
        }

        keys
    }
}

/// Source of signing keys for the cache.
///
/// Production uses [`RemoteKeySetFetcher`]; tests substitute in-memory
/// sources to count and delay fetches.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetch the current key set.
    ///
    /// An empty map is a successful fetch, not an error.
    async fn fetch_key_set(&self) -> Result<KeyMap, AuthError>;
}

/// Fetches the key set from a JWKS URL.
pub struct RemoteKeySetFetcher {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,
}

impl RemoteKeySetFetcher {
    /// Create a fetcher with the default timeout.
    pub fn new(jwks_url: String) -> Self {
        Self::with_timeout(jwks_url, Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS))
    }

    /// Create a fetcher whose requests fail after `timeout`.
    pub fn with_timeout(jwks_url: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "ps.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
        }
    }

    /// The JWKS endpoint this fetcher reads.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}

#[async_trait]
impl KeySetSource for RemoteKeySetFetcher {
    #[instrument(skip(self), name = "ps.auth.jwks.fetch")]
    async fn fetch_key_set(&self) -> Result<KeyMap, AuthError> {
        tracing::debug!(target: "ps.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "ps.auth.jwks", error = %e, "Failed to fetch JWKS");
                AuthError::Fetch(e.to_string())
            })?;

        if response.status() != reqwest::StatusCode::OK {
            tracing::error!(
                target: "ps.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(AuthError::Fetch(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let document: KeySetDocument = response.json().await.map_err(|e| {
            tracing::error!(target: "ps.auth.jwks", error = %e, "Failed to parse JWKS response");
            AuthError::Fetch(e.to_string())
        })?;

        let descriptor_count = document.keys.len();
        let keys = document.usable_keys();
        if keys.len() < descriptor_count {
            tracing::debug!(
                target: "ps.auth.jwks",
                usable = keys.len(),
                descriptors = descriptor_count,
                "Some JWKS descriptors were skipped"
            );
        }

        Ok(keys)
    }
}

/// The current key set and the instant it stops being trusted.
struct CachedKeySet {
    /// Map of key ID to decoded key. Replaced, never mutated.
    keys: Arc<KeyMap>,

    /// `None` until the first successful refresh.
    valid_until: Option<Instant>,
}

/// Cache of decoded signing keys with single-flight refresh.
///
/// Thread-safe; share it behind an `Arc`. Readers take a shared lock and
/// never wait on network I/O: the fetch runs outside the cache lock, and the
/// exclusive lock is held only to swap in the new set.
pub struct KeyCache {
    /// Where refreshed key sets come from.
    source: Arc<dyn KeySetSource>,

    /// Cached key set.
    cache: RwLock<CachedKeySet>,

    /// Cache TTL duration.
    cache_ttl: Duration,

    /// Serializes refreshes; holds the outcome of the latest attempt.
    refresh_gate: Mutex<Result<(), AuthError>>,

    /// Number of completed refresh attempts. Bumped while holding the gate.
    refresh_attempts: AtomicU64,
}

impl KeyCache {
    /// Create an empty cache with the default TTL.
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self::with_ttl(source, Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS))
    }

    /// Create an empty cache with a custom TTL, capped at
    /// [`MAX_CACHE_TTL_SECONDS`].
    pub fn with_ttl(source: Arc<dyn KeySetSource>, cache_ttl: Duration) -> Self {
        let cache_ttl = cache_ttl.min(Duration::from_secs(MAX_CACHE_TTL_SECONDS));
        Self {
            source,
            cache: RwLock::new(CachedKeySet {
                keys: Arc::new(KeyMap::new()),
                valid_until: None,
            }),
            cache_ttl,
            refresh_gate: Mutex::new(Ok(())),
            refresh_attempts: AtomicU64::new(0),
        }
    }

    /// Cache TTL.
    pub fn ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Get a key by key ID.
    ///
    /// Served from the cache while it is fresh and holds `kid`. Otherwise
    /// the set is refreshed (sharing an in-flight refresh if there is one)
    /// and the lookup is retried once against the replaced set, so a key
    /// the provider rotates in is usable without waiting out the TTL.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::KeyNotFound` if the key is absent or the refresh
    /// failed; the underlying cause is logged, not returned.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn lookup(&self, kid: &str) -> Result<Arc<RsaPublicKey>, AuthError> {
        // Read the attempt counter before the cache so a refresh that lands
        // in between is detected by refresh_single_flight.
        let observed_attempts = self.refresh_attempts.load(Ordering::Acquire);

        if let Some(key) = self.cached(kid).await {
            tracing::debug!(target: "ps.auth.jwks", "JWKS cache hit");
            return Ok(key);
        }

        tracing::debug!(target: "ps.auth.jwks", "JWKS cache miss, refreshing");

        if let Err(e) = self.refresh_single_flight(observed_attempts).await {
            tracing::warn!(target: "ps.auth.jwks", error = %e, "JWKS refresh failed, cannot resolve key");
            return Err(AuthError::KeyNotFound);
        }

        // Retry once against the freshly replaced set, regardless of TTL.
        let cache = self.cache.read().await;
        if let Some(key) = cache.keys.get(kid) {
            return Ok(Arc::clone(key));
        }

        tracing::warn!(target: "ps.auth.jwks", "Key not found in JWKS after refresh");
        Err(AuthError::KeyNotFound)
    }

    /// Refresh now, joining an in-flight refresh if there is one.
    ///
    /// # Errors
    ///
    /// Returns the `AuthError::Fetch` of the failed attempt.
    pub async fn force_refresh(&self) -> Result<(), AuthError> {
        let observed_attempts = self.refresh_attempts.load(Ordering::Acquire);
        self.refresh_single_flight(observed_attempts).await
    }

    /// Whether the cache holds a set that is still within its TTL.
    pub async fn is_fresh(&self) -> bool {
        let cache = self.cache.read().await;
        cache
            .valid_until
            .is_some_and(|valid_until| Instant::now() < valid_until)
    }

    /// The key for `kid` if the set is within its TTL and holds it.
    async fn cached(&self, kid: &str) -> Option<Arc<RsaPublicKey>> {
        let cache = self.cache.read().await;
        let fresh = cache
            .valid_until
            .is_some_and(|valid_until| Instant::now() < valid_until);
        if !fresh {
            return None;
        }
        cache.keys.get(kid).map(Arc::clone)
    }

    /// Run one refresh, or adopt the outcome of one that completed after
    /// `observed_attempts` was read.
    async fn refresh_single_flight(&self, observed_attempts: u64) -> Result<(), AuthError> {
        let mut last_outcome = self.refresh_gate.lock().await;

        if self.refresh_attempts.load(Ordering::Acquire) != observed_attempts {
            tracing::debug!(target: "ps.auth.jwks", "Joined concurrent JWKS refresh");
            return last_outcome.clone();
        }

        // If this future is dropped mid-fetch the gate is released without
        // bumping the counter, and the next waiter fetches on its own.
        let outcome = self.refresh().await;
        *last_outcome = outcome.clone();
        self.refresh_attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    /// Fetch from the source and swap in the new set.
    async fn refresh(&self) -> Result<(), AuthError> {
        let start = Instant::now();

        let keys = match self.source.fetch_key_set().await {
            Ok(keys) => keys,
            Err(e) => {
                metrics::record_jwks_refresh("error", None, start.elapsed());
                return Err(e);
            }
        };

        let key_count = keys.len();
        if key_count == 0 {
            // Not an error: lookups against the empty set simply miss.
            tracing::warn!(target: "ps.auth.jwks", "JWKS refresh yielded no usable keys");
        }

        // An unrepresentable expiry leaves the set stale rather than panicking
        let now = Instant::now();
        let valid_until = now.checked_add(self.cache_ttl).unwrap_or(now);

        {
            let mut cache = self.cache.write().await;
            *cache = CachedKeySet {
                keys: Arc::new(keys),
                valid_until: Some(valid_until),
            };
        }

        metrics::record_jwks_refresh("success", Some(key_count), start.elapsed());
        tracing::info!(target: "ps.auth.jwks", key_count, "JWKS cache refreshed");

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use project_test_utils::{PRIMARY_KEY_MODULUS, SECONDARY_KEY_MODULUS};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// In-memory key source that counts fetches.
    struct FakeSource {
        document: std::sync::Mutex<Result<KeySetDocument, AuthError>>,
        fetches: AtomicUsize,
        delay: Duration,
    }

    impl FakeSource {
        fn serving(document: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                document: std::sync::Mutex::new(Ok(serde_json::from_value(document).unwrap())),
                fetches: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(document: serde_json::Value, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                document: std::sync::Mutex::new(Ok(serde_json::from_value(document).unwrap())),
                fetches: AtomicUsize::new(0),
                delay,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                document: std::sync::Mutex::new(Err(AuthError::Fetch(
                    "connection refused".to_string(),
                ))),
                fetches: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn set(&self, document: Result<serde_json::Value, AuthError>) {
            *self.document.lock().unwrap() =
                document.map(|d| serde_json::from_value(d).unwrap());
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl KeySetSource for FakeSource {
        async fn fetch_key_set(&self) -> Result<KeyMap, AuthError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let document = self.document.lock().unwrap().clone();
            document.map(|d| d.usable_keys())
        }
    }

    fn rsa_jwk(kid: &str, n: &str) -> serde_json::Value {
        json!({"kty": "RSA", "kid": kid, "n": n, "e": "AQAB", "alg": "RS256", "use": "sig"})
    }

    fn one_key_set() -> serde_json::Value {
        json!({"keys": [rsa_jwk("k1", PRIMARY_KEY_MODULUS)]})
    }

    // =========================================================================
    // Document parsing
    // =========================================================================

    #[test]
    fn test_jwk_deserialization_ignores_extra_fields() {
        let jwk: Jwk = serde_json::from_value(json!({
            "kty": "RSA",
            "kid": "k1",
            "n": "abc",
            "e": "AQAB",
            "x5c": ["MIIC..."],
            "x5t": "thumb"
        }))
        .unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid, "k1");
        assert_eq!(jwk.e, "AQAB");
    }

    #[test]
    fn test_jwk_deserialization_minimal() {
        let jwk: Jwk = serde_json::from_value(json!({"kty": "OKP"})).unwrap();
        assert_eq!(jwk.kty, "OKP");
        assert!(jwk.kid.is_empty());
        assert!(jwk.n.is_empty());
    }

    #[test]
    fn test_usable_keys_skips_unusable_descriptors() {
        let document: KeySetDocument = serde_json::from_value(json!({
            "keys": [
                rsa_jwk("good", PRIMARY_KEY_MODULUS),
                {"kty": "EC", "kid": "ec-key", "crv": "P-256", "x": "abc", "y": "def"},
                {"kty": "RSA", "kid": "", "n": PRIMARY_KEY_MODULUS, "e": "AQAB"},
                {"kty": "RSA", "kid": "no-n", "e": "AQAB"},
                {"kty": "RSA", "kid": "no-e", "n": PRIMARY_KEY_MODULUS},
                {"kty": "RSA", "kid": "bad-b64", "n": "!!!", "e": "AQAB"},
                {"kty": "RSA", "kid": 7, "n": PRIMARY_KEY_MODULUS, "e": "AQAB"},
                "not-an-object"
            ]
        }))
        .unwrap();

        let keys = document.usable_keys();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains_key("good"));
    }

    #[test]
    fn test_usable_keys_round_trips_material() {
        let document: KeySetDocument = serde_json::from_value(json!({
            "keys": [rsa_jwk("k1", PRIMARY_KEY_MODULUS), rsa_jwk("k2", SECONDARY_KEY_MODULUS)]
        }))
        .unwrap();

        let keys = document.usable_keys();
        assert_eq!(keys.get("k1").unwrap().modulus_b64(), PRIMARY_KEY_MODULUS);
        assert_eq!(keys.get("k2").unwrap().modulus_b64(), SECONDARY_KEY_MODULUS);
        assert_eq!(keys.get("k2").unwrap().exponent_b64(), "AQAB");
    }

    #[test]
    fn test_usable_keys_duplicate_kid_keeps_last() {
        let document: KeySetDocument = serde_json::from_value(json!({
            "keys": [rsa_jwk("dup", PRIMARY_KEY_MODULUS), rsa_jwk("dup", SECONDARY_KEY_MODULUS)]
        }))
        .unwrap();

        let keys = document.usable_keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.get("dup").unwrap().modulus_b64(), SECONDARY_KEY_MODULUS);
    }

    #[test]
    fn test_document_without_keys_is_empty() {
        let document: KeySetDocument = serde_json::from_value(json!({})).unwrap();
        assert!(document.usable_keys().is_empty());
    }

    #[test]
    fn test_remote_fetcher_creation() {
        let fetcher = RemoteKeySetFetcher::new(
            "http://localhost:8081/realms/demo/protocol/openid-connect/certs".to_string(),
        );
        assert_eq!(
            fetcher.jwks_url(),
            "http://localhost:8081/realms/demo/protocol/openid-connect/certs"
        );
    }

    // =========================================================================
    // KeyCache
    // =========================================================================

    #[test]
    fn test_default_ttl_is_ten_minutes() {
        let cache = KeyCache::new(FakeSource::serving(one_key_set()));
        assert_eq!(cache.ttl(), Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_lookup_empty_cache_fetches_once() {
        let source = FakeSource::serving(one_key_set());
        let cache = KeyCache::new(source.clone());
        assert!(!cache.is_fresh().await);

        let key = cache.lookup("k1").await.unwrap();
        assert_eq!(key.modulus_b64(), PRIMARY_KEY_MODULUS);
        assert_eq!(source.fetches(), 1);
        assert!(cache.is_fresh().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_before_expiry_does_not_fetch() {
        let source = FakeSource::serving(one_key_set());
        let cache = KeyCache::with_ttl(source.clone(), Duration::from_secs(600));

        cache.lookup("k1").await.unwrap();
        tokio::time::advance(Duration::from_secs(599)).await;
        cache.lookup("k1").await.unwrap();
        cache.lookup("k1").await.unwrap();

        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_after_expiry_refreshes_exactly_once() {
        let source = FakeSource::serving(one_key_set());
        let cache = KeyCache::with_ttl(source.clone(), Duration::from_secs(600));

        cache.lookup("k1").await.unwrap();
        tokio::time::advance(Duration::from_secs(601)).await;
        assert!(!cache.is_fresh().await);

        cache.lookup("k1").await.unwrap();
        assert_eq!(source.fetches(), 2);

        // Fresh again: served from cache
        cache.lookup("k1").await.unwrap();
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_kid_refreshes_once_per_lookup() {
        let source = FakeSource::serving(one_key_set());
        let cache = KeyCache::new(source.clone());

        // Empty cache: one refresh, one retry, no second fetch
        assert!(matches!(
            cache.lookup("unknown").await,
            Err(AuthError::KeyNotFound)
        ));
        assert_eq!(source.fetches(), 1);

        // Fresh cache without the kid: the miss still refreshes
        assert!(matches!(
            cache.lookup("unknown").await,
            Err(AuthError::KeyNotFound)
        ));
        assert_eq!(source.fetches(), 2);

        // The known key is served from the cache
        assert!(cache.lookup("k1").await.is_ok());
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotated_key_picked_up_before_expiry() {
        let source = FakeSource::serving(one_key_set());
        let cache = KeyCache::with_ttl(source.clone(), Duration::from_secs(600));
        cache.lookup("k1").await.unwrap();
        assert!(matches!(
            cache.lookup("unknown").await,
            Err(AuthError::KeyNotFound)
        ));
        assert_eq!(source.fetches(), 2);

        // Provider rotates to k2 well within the TTL
        source.set(Ok(json!({"keys": [rsa_jwk("k2", SECONDARY_KEY_MODULUS)]})));
        let key = cache.lookup("k2").await.unwrap();
        assert_eq!(key.modulus_b64(), SECONDARY_KEY_MODULUS);
        assert_eq!(source.fetches(), 3);

        // Full replacement: k1 is gone after its own refresh attempt
        assert!(matches!(cache.lookup("k1").await, Err(AuthError::KeyNotFound)));
        assert_eq!(source.fetches(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_unknown_kids_on_fresh_cache_share_one_fetch() {
        let source = FakeSource::slow(one_key_set(), Duration::from_millis(50));
        let cache = Arc::new(KeyCache::new(source.clone()));
        cache.force_refresh().await.unwrap();
        assert_eq!(source.fetches(), 1);

        let lookups = (0..32).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.lookup("unknown").await })
        });
        let results = futures::future::join_all(lookups).await;

        for result in results {
            assert!(matches!(result.unwrap(), Err(AuthError::KeyNotFound)));
        }
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_ttl_is_capped() {
        let source = FakeSource::serving(one_key_set());
        let cache = KeyCache::with_ttl(source.clone(), Duration::from_secs(u64::MAX));
        assert_eq!(cache.ttl(), Duration::from_secs(MAX_CACHE_TTL_SECONDS));

        cache.lookup("k1").await.unwrap();
        assert!(cache.is_fresh().await);

        tokio::time::advance(Duration::from_secs(MAX_CACHE_TTL_SECONDS + 1)).await;
        assert!(!cache.is_fresh().await);
        cache.lookup("k1").await.unwrap();
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_surfaces_key_not_found() {
        let source = FakeSource::failing();
        let cache = KeyCache::new(source.clone());

        assert!(matches!(cache.lookup("k1").await, Err(AuthError::KeyNotFound)));
        assert!(!cache.is_fresh().await);

        // Not cached as a negative result: next lookup tries again
        assert!(matches!(cache.lookup("k1").await, Err(AuthError::KeyNotFound)));
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_reports_fetch_error() {
        let cache = KeyCache::new(FakeSource::failing());
        assert!(matches!(
            cache.force_refresh().await,
            Err(AuthError::Fetch(msg)) if msg.contains("connection refused")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_previous_set_but_does_not_trust_it() {
        let source = FakeSource::serving(one_key_set());
        let cache = KeyCache::with_ttl(source.clone(), Duration::from_secs(60));
        cache.lookup("k1").await.unwrap();

        source.set(Err(AuthError::Fetch("timeout".to_string())));
        tokio::time::advance(Duration::from_secs(61)).await;

        // Expired entries are not served when the refresh fails
        assert!(matches!(cache.lookup("k1").await, Err(AuthError::KeyNotFound)));

        // Once the provider recovers the key resolves again
        source.set(Ok(one_key_set()));
        assert!(cache.lookup("k1").await.is_ok());
        assert_eq!(source.fetches(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_key_set_is_not_an_error() {
        let source = FakeSource::serving(json!({"keys": []}));
        let cache = KeyCache::new(source.clone());

        assert!(cache.force_refresh().await.is_ok());
        assert!(cache.is_fresh().await);
        assert_eq!(source.fetches(), 1);

        // The miss refreshes once and still finds nothing
        assert!(matches!(cache.lookup("k1").await, Err(AuthError::KeyNotFound)));
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let source = FakeSource::slow(one_key_set(), Duration::from_millis(50));
        let cache = Arc::new(KeyCache::new(source.clone()));

        let lookups = (0..64).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.lookup("k1").await })
        });
        let results = futures::future::join_all(lookups).await;

        for result in results {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_failure() {
        let source = Arc::new(FakeSource {
            document: std::sync::Mutex::new(Err(AuthError::Fetch("down".to_string()))),
            fetches: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
        });
        let cache = Arc::new(KeyCache::new(source.clone()));

        let lookups = (0..32).map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.lookup("k1").await })
        });
        let results = futures::future::join_all(lookups).await;

        for result in results {
            assert!(matches!(result.unwrap(), Err(AuthError::KeyNotFound)));
        }
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_refresh_leaves_cache_untouched() {
        let source = FakeSource::slow(one_key_set(), Duration::from_secs(5));
        let cache = KeyCache::new(source.clone());

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), cache.lookup("k1")).await;
        assert!(timed_out.is_err());
        assert!(!cache.is_fresh().await);

        // The gate was released; the next caller runs its own refresh
        assert!(cache.lookup("k1").await.is_ok());
        assert_eq!(source.fetches(), 2);
    }
}
