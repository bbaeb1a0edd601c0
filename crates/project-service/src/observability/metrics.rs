//! Metrics definitions for the project service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ps_` prefix for project service
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: 7 values max (GET, POST, PATCH, DELETE, PUT, HEAD, OPTIONS)
//! - `endpoint`: ~10 values (parameterized paths)
//! - `status`: 3 values (success, error, timeout)
//! - `error_type`: bounded by `AuthError` variants

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // HTTP request buckets aligned with 200ms p95 target
        .set_buckets_for_metric(
            Matcher::Prefix("ps_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // JWKS refresh is a network round trip bounded by the fetch timeout
        .set_buckets_for_metric(
            Matcher::Prefix("ps_jwks_refresh".to_string()),
            &[0.010, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        // Token validation is CPU-bound on the fast path
        .set_buckets_for_metric(
            Matcher::Prefix("ps_token_validation".to_string()),
            &[0.0005, 0.001, 0.002, 0.005, 0.010, 0.025, 0.050, 0.100, 0.500],
        )
        .map_err(|e| format!("Failed to set token validation buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `ps_http_requests_total`, `ps_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
///
/// This captures ALL HTTP responses including framework-level errors like
/// 404 Not Found and 405 Method Not Allowed.
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("ps_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("ps_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
///
/// Replaces project and build ids with placeholders; anything unknown
/// collapses to `/other`.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/healthz" => "/healthz",
        "/metrics" => "/metrics",
        "/api/me" => "/api/me",
        "/api/projects" => "/api/projects",
        "/api/envvars" => "/api/envvars",
        "/api/projects/import/github" => "/api/projects/import/github",
        _ => normalize_dynamic_endpoint(path),
    }
}

fn normalize_dynamic_endpoint(path: &str) -> &'static str {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match segments.as_slice() {
        ["api", "projects", id] if !id.is_empty() => "/api/projects/{id}",
        ["api", "projects", id, "builds"] if !id.is_empty() => "/api/projects/{id}/builds",
        ["api", "builds", id, "logs"] if !id.is_empty() => "/api/builds/{id}/logs",
        _ => "/other",
    }
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a key set refresh attempt.
///
/// Emits:
/// - `ps_jwks_refresh_total` counter (labels: `status`)
/// - `ps_jwks_refresh_duration_seconds` histogram (no labels)
/// - `ps_jwks_keys` gauge, on success only
///
/// # Arguments
///
/// * `status` - "success" or "error"
/// * `key_count` - Usable keys after a successful refresh
/// * `duration` - Duration of the fetch and swap
pub fn record_jwks_refresh(status: &'static str, key_count: Option<usize>, duration: Duration) {
    histogram!("ps_jwks_refresh_duration_seconds").record(duration.as_secs_f64());

    counter!("ps_jwks_refresh_total",
        "status" => status
    )
    .increment(1);

    if let Some(count) = key_count {
        #[allow(clippy::cast_precision_loss)] // Key counts are tiny
        gauge!("ps_jwks_keys").set(count as f64);
    }
}

// ============================================================================
// Token Validation Metrics
// ============================================================================

/// Record a token validation outcome.
///
/// Metric: `ps_token_validations_total`, `ps_token_validation_duration_seconds`
/// Labels: `status`, `error_type`
pub fn record_token_validation(
    status: &'static str,
    error_type: Option<&'static str>,
    duration: Duration,
) {
    histogram!("ps_token_validation_duration_seconds",
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("ps_token_validations_total",
        "status" => status,
        "error_type" => error_type.unwrap_or("none")
    )
    .increment(1);
}

// ============================================================================
// Tests
// ============================================================================
