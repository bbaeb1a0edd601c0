//! JWT validation for the project service.
//!
//! Validates incoming access tokens using RSA public keys from the identity
//! provider's JWKS endpoint.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RS256 is accepted; the declared algorithm is checked before any
//!   key lookup, which forecloses algorithm-confusion attacks
//! - Expiration, not-before and issued-at claims are validated with clock
//!   skew tolerance
//! - Unknown keys, bad signatures and time-claim failures all surface as
//!   the same `InvalidToken` rejection

use crate::auth::claims::Claims;
use crate::auth::jwks::KeyCache;
use crate::errors::AuthError;
use crate::observability::metrics;
use common::jwt::{parse_header, validate_iat};
use jsonwebtoken::{decode, Algorithm, Validation};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// The only signing algorithm accepted.
const ACCEPTED_ALGORITHM: &str = "RS256";

/// Validates bearer tokens against keys from a [`KeyCache`].
///
/// Stateless across calls apart from the shared key cache.
pub struct TokenValidator {
    /// Cache of the provider's signing keys.
    key_cache: Arc<KeyCache>,

    /// Expected `iss`, or `None` to skip the issuer check.
    issuer: Option<String>,

    /// Leeway for `exp`, `nbf` and `iat`.
    clock_skew: Duration,
}

impl TokenValidator {
    /// Create a new validator.
    ///
    /// An empty `issuer` is treated as not configured.
    pub fn new(key_cache: Arc<KeyCache>, issuer: Option<String>, clock_skew: Duration) -> Self {
        Self {
            key_cache,
            issuer: issuer.filter(|iss| !iss.is_empty()),
            clock_skew,
        }
    }

    /// The key cache backing this validator.
    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.key_cache
    }

    /// The issuer this validator enforces, if any.
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Validate a token and return its claims.
    ///
    /// # Security Checks
    ///
    /// 1. Empty token is rejected
    /// 2. Size check and header parse (via `common::jwt`)
    /// 3. `kid` must be present, `alg` must be RS256
    /// 4. Key resolved from the cache (refreshing on a stale cache)
    /// 5. RS256 signature, `exp` (required) and `nbf` checked with leeway
    /// 6. `iat` may not lie more than the leeway in the future
    /// 7. Issuer, when configured, must match exactly
    /// 8. Audience, when `expected_audience` is non-empty, must be listed
    ///
    /// # Errors
    ///
    /// One of `EmptyToken`, `MissingKeyId`, `UnsupportedAlgorithm`,
    /// `InvalidToken`, `InvalidIssuer` or `InvalidAudience`.
    #[instrument(skip_all)]
    pub async fn validate(
        &self,
        token: &str,
        expected_audience: Option<&str>,
    ) -> Result<Claims, AuthError> {
        let start = Instant::now();
        let result = self.validate_inner(token, expected_audience).await;

        match &result {
            Ok(_) => {
                tracing::debug!(target: "ps.auth.jwt", "Token validated successfully");
                metrics::record_token_validation("success", None, start.elapsed());
            }
            Err(e) => {
                tracing::debug!(target: "ps.auth.jwt", reason = e.kind(), "Token rejected");
                metrics::record_token_validation("error", Some(e.kind()), start.elapsed());
            }
        }

        result
    }

    async fn validate_inner(
        &self,
        token: &str,
        expected_audience: Option<&str>,
    ) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }

        // 1. Unverified header (includes size check via common::jwt)
        let header = parse_header(token).map_err(|e| {
            tracing::debug!(target: "ps.auth.jwt", error = ?e, "Token header parsing failed");
            AuthError::InvalidToken
        })?;

        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;

        match header.alg.as_deref() {
            Some(ACCEPTED_ALGORITHM) => {}
            other => {
                let alg = other.unwrap_or("none").to_string();
                tracing::debug!(target: "ps.auth.jwt", alg = %alg, "Rejected token algorithm");
                return Err(AuthError::UnsupportedAlgorithm(alg));
            }
        }

        // 2. Resolve signing key; unknown kids look like any other bad token
        let key = self.key_cache.lookup(&kid).await.map_err(|e| {
            tracing::debug!(target: "ps.auth.jwt", kid = %kid, error = %e, "Signing key unavailable");
            AuthError::InvalidToken
        })?;

        // 3. Verify signature and standard time claims
        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // Audience and issuer are checked below so they report distinct errors
        validation.validate_aud = false;

        let claims = decode::<Claims>(token, key.decoding_key(), &validation)
            .map_err(|e| {
                tracing::debug!(target: "ps.auth.jwt", error = %e, "Token verification failed");
                AuthError::InvalidToken
            })?
            .claims;

        // 4. iat with clock skew tolerance using common utility
        if let Some(iat) = claims.iat {
            validate_iat(iat, self.clock_skew).map_err(|e| {
                tracing::debug!(target: "ps.auth.jwt", error = ?e, "Token iat validation failed");
                AuthError::InvalidToken
            })?;
        }

        // 5. Issuer
        if let Some(expected_issuer) = &self.issuer {
            if claims.iss.as_deref() != Some(expected_issuer.as_str()) {
                tracing::debug!(
                    target: "ps.auth.jwt",
                    iss = ?claims.iss,
                    "Token issuer mismatch"
                );
                return Err(AuthError::InvalidIssuer);
            }
        }

        // 6. Audience
        if let Some(expected) = expected_audience.filter(|aud| !aud.is_empty()) {
            let matches = claims.aud.as_ref().is_some_and(|aud| aud.contains(expected));
            if !matches {
                tracing::debug!(
                    target: "ps.auth.jwt",
                    aud = ?claims.aud,
                    expected = %expected,
                    "Token audience mismatch"
                );
                return Err(AuthError::InvalidAudience);
            }
        }

        Ok(claims)
    }
}
