//! Project service error types.
//!
//! [`AuthError`] is the bearer-token rejection taxonomy produced by the
//! `auth` module and the authentication middleware. [`ServiceError`] is the
//! HTTP-facing error; every variant maps to a status code via the
//! `IntoResponse` impl. Messages returned to clients are intentionally
//! generic; actual causes are logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Generic client-facing message for token failures.
const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Reasons a bearer token (or the key material behind it) was rejected.
///
/// `Fetch` and `Decoding` never leave the key cache: a failed refresh is
/// surfaced to the validator as `KeyNotFound`, and the validator surfaces
/// `KeyNotFound` as `InvalidToken`. `Clone` lets one refresh outcome be
/// handed to every caller waiting on the same in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Empty bearer token")]
    EmptyToken,

    #[error("Missing or malformed Authorization header")]
    MissingCredential,

    #[error("Token header has no key id")]
    MissingKeyId,

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Signing key not found")]
    KeyNotFound,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid token issuer")]
    InvalidIssuer,

    #[error("Invalid token audience")]
    InvalidAudience,

    #[error("Key set fetch failed: {0}")]
    Fetch(String),

    #[error("Key material decoding failed: {0}")]
    Decoding(String),
}

impl AuthError {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::EmptyToken => "empty_token",
            AuthError::MissingCredential => "missing_credential",
            AuthError::MissingKeyId => "missing_kid",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::KeyNotFound => "key_not_found",
            AuthError::InvalidToken => "invalid_token",
            AuthError::InvalidIssuer => "invalid_issuer",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::Fetch(_) => "fetch_error",
            AuthError::Decoding(_) => "decoding_error",
        }
    }
}

/// Project service HTTP error type.
///
/// Maps to appropriate HTTP status codes:
/// - Unauthorized: 401 Unauthorized
/// - NotFound: 404 Not Found
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Unauthorized(_) => 401,
            ServiceError::NotFound(_) => 404,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Client-facing code and message for an authentication failure.
///
/// Key lookup, fetch and decoding failures share the `INVALID_TOKEN`
/// response so callers cannot probe which key ids exist.
fn auth_error_detail(err: &AuthError) -> (&'static str, &'static str) {
    match err {
        AuthError::EmptyToken | AuthError::MissingCredential => (
            "MISSING_CREDENTIAL",
            "Missing or malformed Authorization header",
        ),
        AuthError::InvalidIssuer => ("INVALID_ISSUER", "The access token issuer is not trusted"),
        AuthError::InvalidAudience => (
            "INVALID_AUDIENCE",
            "The access token is not intended for this service",
        ),
        AuthError::UnsupportedAlgorithm(_) => {
            ("UNSUPPORTED_ALGORITHM", "The access token algorithm is not supported")
        }
        AuthError::MissingKeyId
        | AuthError::KeyNotFound
        | AuthError::InvalidToken
        | AuthError::Fetch(_)
        | AuthError::Decoding(_) => ("INVALID_TOKEN", INVALID_TOKEN_MESSAGE),
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ServiceError::Unauthorized(err) => {
                tracing::debug!(target: "ps.auth", reason = err.kind(), "Request not authenticated");
                let (code, message) = auth_error_detail(err);
                (StatusCode::UNAUTHORIZED, code, message.to_string())
            }
            ServiceError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        // Add WWW-Authenticate header for 401 responses
        if status == StatusCode::UNAUTHORIZED {
            if let Ok(header_value) =
                "Bearer realm=\"project-service\", error=\"invalid_token\"".parse()
            {
                response
                    .headers_mut()
                    .insert("WWW-Authenticate", header_value);
            }
        }

        response
    }
}
