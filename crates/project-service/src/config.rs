//! Project service configuration.
//!
//! Configuration is loaded from environment variables. The key set URL and
//! expected issuer can be given explicitly or derived from a Keycloak base
//! URL and realm.

use crate::auth::jwks::{
    DEFAULT_CACHE_TTL_SECONDS, DEFAULT_FETCH_TIMEOUT_SECONDS, MAX_CACHE_TTL_SECONDS,
};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP port when neither `BIND_ADDRESS` nor `PORT` is set.
pub const DEFAULT_PORT: &str = "8080";

/// Upper bound for the key set fetch timeout in seconds.
pub const MAX_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Project service configuration.
///
/// Loaded from environment variables with sensible defaults. A missing
/// `jwks_url` is valid and means authentication is disabled.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// URL of the identity provider's JWKS endpoint.
    pub jwks_url: Option<String>,

    /// Expected `iss` claim; `None` skips the issuer check.
    pub jwt_issuer: Option<String>,

    /// Expected `aud` claim; `None` skips the audience check.
    pub jwt_audience: Option<String>,

    /// How long a fetched key set is trusted.
    pub jwks_cache_ttl: Duration,

    /// Timeout for one key set fetch.
    pub jwks_fetch_timeout: Duration,

    /// Leeway for `exp`, `nbf` and `iat`.
    pub jwt_clock_skew: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid JWKS cache TTL configuration: {0}")]
    InvalidJwksCacheTtl(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidJwksFetchTimeout(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = non_empty(vars, "BIND_ADDRESS").unwrap_or_else(|| {
            let port = non_empty(vars, "PORT").unwrap_or_else(|| DEFAULT_PORT.to_string());
            format!("0.0.0.0:{port}")
        });

        // Keycloak realm endpoints, used unless overridden below
        let realm_url = match (
            non_empty(vars, "KEYCLOAK_BASE_URL"),
            non_empty(vars, "KEYCLOAK_REALM"),
        ) {
            (Some(base), Some(realm)) => {
                Some(format!("{}/realms/{}", base.trim_end_matches('/'), realm))
            }
            _ => None,
        };

        let jwks_url = non_empty(vars, "JWKS_URL").or_else(|| {
            realm_url
                .as_ref()
                .map(|realm| format!("{realm}/protocol/openid-connect/certs"))
        });

        let jwt_issuer = non_empty(vars, "JWT_ISSUER").or(realm_url);

        let jwt_audience = non_empty(vars, "JWT_AUDIENCE");

        let jwks_cache_ttl_seconds = match vars.get("JWKS_CACHE_TTL_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidJwksCacheTtl(format!(
                        "JWKS_CACHE_TTL_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 || value > MAX_CACHE_TTL_SECONDS {
                    return Err(ConfigError::InvalidJwksCacheTtl(format!(
                        "JWKS_CACHE_TTL_SECONDS must be between 1 and {}, got {}",
                        MAX_CACHE_TTL_SECONDS, value
                    )));
                }

                value
            }
            None => DEFAULT_CACHE_TTL_SECONDS,
        };

        let jwks_fetch_timeout_seconds = match vars.get("JWKS_FETCH_TIMEOUT_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidJwksFetchTimeout(format!(
                        "JWKS_FETCH_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 || value > MAX_FETCH_TIMEOUT_SECONDS {
                    return Err(ConfigError::InvalidJwksFetchTimeout(format!(
                        "JWKS_FETCH_TIMEOUT_SECONDS must be between 1 and {}, got {}",
                        MAX_FETCH_TIMEOUT_SECONDS, value
                    )));
                }

                value
            }
            None => DEFAULT_FETCH_TIMEOUT_SECONDS,
        };

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = match vars.get("JWT_CLOCK_SKEW_SECONDS") {
            Some(value_str) => {
                let value: i64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidJwtClockSkew(format!(
                        "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                let value = u64::try_from(value)
                    .ok()
                    .filter(|v| *v > 0)
                    .ok_or_else(|| {
                        ConfigError::InvalidJwtClockSkew(format!(
                            "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                            value
                        ))
                    })?;

                if value > MAX_CLOCK_SKEW.as_secs() {
                    return Err(ConfigError::InvalidJwtClockSkew(format!(
                        "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                        MAX_CLOCK_SKEW.as_secs(),
                        value
                    )));
                }

                value
            }
            None => DEFAULT_CLOCK_SKEW.as_secs(),
        };

        Ok(Config {
            bind_address,
            jwks_url,
            jwt_issuer,
            jwt_audience,
            jwks_cache_ttl: Duration::from_secs(jwks_cache_ttl_seconds),
            jwks_fetch_timeout: Duration::from_secs(jwks_fetch_timeout_seconds),
            jwt_clock_skew: Duration::from_secs(jwt_clock_skew_seconds),
        })
    }

    /// Whether bearer-token authentication is enabled.
    pub fn auth_enabled(&self) -> bool {
        self.jwks_url.is_some()
    }
}

/// A variable's value, treating empty strings as unset.
fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name).filter(|v| !v.is_empty()).cloned()
}
