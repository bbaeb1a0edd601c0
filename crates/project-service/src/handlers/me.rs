//! Current user handler.
//!
//! Returns the authenticated caller's identity from the validated claims.

use crate::middleware::AuthContext;
use axum::Json;
use serde::Serialize;
use tracing::instrument;

/// Response for `/api/me`.
#[derive(Debug, Clone, Serialize)]
pub struct MeResponse {
    /// Subject (user id).
    pub sub: String,

    /// Token issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Group memberships used for project ownership.
    pub groups: Vec<String>,
}

/// Handler for GET /api/me
///
/// Requires the auth gate; without it the [`AuthContext`] extractor answers
/// 401.
///
/// ## Response
///
/// ```json
/// {
///   "sub": "user-42",
///   "iss": "https://auth.example.com/realms/demo",
///   "groups": ["team-a"]
/// }
/// ```
#[instrument(skip_all, name = "ps.handlers.me")]
pub async fn get_me(context: AuthContext) -> Json<MeResponse> {
    tracing::debug!(target: "ps.handlers.me", "Returning caller identity");

    let groups = context
        .claims
        .groups()
        .into_iter()
        .map(ToString::to_string)
        .collect();

    Json(MeResponse {
        sub: context.subject,
        iss: context.claims.iss,
        groups,
    })
}
