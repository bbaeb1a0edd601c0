//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating signed test tokens.

use crate::crypto_fixtures::TestKeypair;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Issuer used by default in test tokens.
pub const TEST_ISSUER: &str = "https://auth.example.com/realms/demo";

/// Audience used by default in test tokens.
pub const TEST_AUDIENCE: &str = "api";

/// Builder for creating test JWT claims
///
/// Defaults to a token for `test-subject` from [`TEST_ISSUER`] to
/// [`TEST_AUDIENCE`], valid for an hour.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_groups(&["team-a"])
///     .expires_in(3600)
///     .sign("k1");
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
    keypair: TestKeypair,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("iss".to_string(), json!(TEST_ISSUER));
        claims.insert("aud".to_string(), json!(TEST_AUDIENCE));
        claims.insert("exp".to_string(), json!((now + Duration::seconds(3600)).timestamp()));
        claims.insert("iat".to_string(), json!(now.timestamp()));

        Self {
            claims,
            keypair: TestKeypair::primary(),
        }
    }

    /// Set the subject
    pub fn for_user(self, subject: &str) -> Self {
        self.with_claim("sub", json!(subject))
    }

    /// Set the issuer
    pub fn issued_by(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    /// Set a single audience
    pub fn for_audience(self, audience: &str) -> Self {
        self.with_claim("aud", json!(audience))
    }

    /// Set a list of audiences
    pub fn for_audiences(self, audiences: &[&str]) -> Self {
        self.with_claim("aud", json!(audiences))
    }

    /// Set group memberships
    pub fn with_groups(self, groups: &[&str]) -> Self {
        self.with_claim("groups", json!(groups))
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("exp", json!(exp))
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        let nbf = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("nbf", json!(nbf))
    }

    /// Set issued-at timestamp
    pub fn issued_at(self, timestamp: i64) -> Self {
        self.with_claim("iat", json!(timestamp))
    }

    /// Set any claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Sign with a different fixture keypair
    pub fn signed_with(mut self, keypair: TestKeypair) -> Self {
        self.keypair = keypair;
        self
    }

    /// Build the claims as a JSON value
    pub fn build(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Build and sign an RS256 token whose header names `kid`
    pub fn sign(&self, kid: &str) -> String {
        self.keypair.sign_token(kid, &self.build())
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let claims = TestTokenBuilder::new().build();

        assert_eq!(claims["sub"], "test-subject");
        assert_eq!(claims["iss"], TEST_ISSUER);
        assert_eq!(claims["aud"], TEST_AUDIENCE);
        assert!(claims["exp"].as_i64().unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn test_builder_overrides() {
        let claims = TestTokenBuilder::new()
            .for_user("alice")
            .for_audiences(&["api", "account"])
            .with_groups(&["team-a"])
            .without_claim("iss")
            .build();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["aud"], json!(["api", "account"]));
        assert_eq!(claims["groups"], json!(["team-a"]));
        assert!(claims.get("iss").is_none());
    }

    #[test]
    fn test_expires_in_past() {
        let claims = TestTokenBuilder::new().expires_in(-60).build();
        assert!(claims["exp"].as_i64().unwrap() < Utc::now().timestamp());
    }

    #[test]
    fn test_sign_produces_compact_jwt() {
        let token = TestTokenBuilder::new().sign("k1");
        assert_eq!(token.split('.').count(), 3);
    }
}
