//! Authentication gate for protected routes.
//!
//! Extracts the Bearer token from the Authorization header, validates it
//! with the [`TokenValidator`], and injects an [`AuthContext`] into request
//! extensions. Any rejection ends the request with 401; downstream handlers
//! never run for unauthenticated requests.

use crate::auth::{Claims, TokenValidator};
use crate::errors::{AuthError, ServiceError};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::IntoResponse,
};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    /// Token validator with its key cache.
    pub validator: Arc<TokenValidator>,

    /// Audience every token must carry; `None` skips the check.
    pub expected_audience: Option<String>,
}

/// The authenticated caller, available to handlers behind the gate.
#[derive(Clone)]
pub struct AuthContext {
    /// The token's `sub` claim - redacted in Debug output.
    pub subject: String,

    /// The full validated claim set.
    pub claims: Claims,
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthContext")
            .field("subject", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Extract the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively and must be followed by exactly
/// one space. `"Bearer "` yields an empty token, which the validator rejects
/// as `EmptyToken`.
///
/// # Errors
///
/// Returns `AuthError::MissingCredential` if the header is absent or not of
/// the form `Bearer <token>`.
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or_else(|| {
        tracing::debug!(target: "ps.middleware.auth", "Missing Authorization header");
        AuthError::MissingCredential
    })?;

    match header.split_once(' ') {
        Some((scheme, token))
            if scheme.eq_ignore_ascii_case("Bearer") && !token.starts_with(char::is_whitespace) =>
        {
            Ok(token)
        }
        _ => {
            tracing::debug!(target: "ps.middleware.auth", "Invalid Authorization header format");
            Err(AuthError::MissingCredential)
        }
    }
}

/// Authenticate a raw `Authorization` header value.
///
/// This is the whole gate without the HTTP plumbing: header in, caller
/// identity or typed rejection out. An empty or absent `expected_audience`
/// disables the audience check.
///
/// # Errors
///
/// Returns the first rejection from header parsing or token validation.
pub async fn authenticate(
    validator: &TokenValidator,
    header: Option<&str>,
    expected_audience: Option<&str>,
) -> Result<AuthContext, AuthError> {
    let token = extract_bearer_token(header)?;
    let claims = validator.validate(token, expected_audience).await?;

    Ok(AuthContext {
        subject: claims.sub.clone(),
        claims,
    })
}

/// Authentication middleware.
///
/// # Response
///
/// - Returns 401 Unauthorized if the token is missing or invalid
/// - Continues to the next handler with `AuthContext` in extensions otherwise
#[instrument(skip_all, name = "ps.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ServiceError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let context = authenticate(
        &state.validator,
        header,
        state.expected_audience.as_deref(),
    )
    .await?;

    // Store the caller in request extensions for downstream handlers
    req.extensions_mut().insert(context);

    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<AuthContext>().cloned().ok_or_else(|| {
            tracing::debug!(target: "ps.middleware.auth", "No authenticated caller on request");
            ServiceError::Unauthorized(AuthError::MissingCredential)
        })
    }
}
