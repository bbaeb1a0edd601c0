//! Liveness handler.

use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

/// Response for `/healthz`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process is serving.
    pub status: &'static str,

    /// Server time, RFC 3339 in UTC.
    pub time: String,
}

/// Handler for GET /healthz
///
/// Does not check the identity provider: an unreachable key set degrades
/// authentication, not liveness.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    })
}
