//! HTTP routes for the project service.
//!
//! Defines the Axum router and application state.

use crate::auth::{KeyCache, RemoteKeySetFetcher, TokenValidator};
use crate::config::Config;
use crate::errors::ServiceError;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Gate state; `None` when no key set URL is configured.
    pub auth: Option<Arc<AuthState>>,
}

impl AppState {
    /// Build state from configuration, wiring the key cache and validator
    /// when a key set URL is configured.
    pub fn from_config(config: Config) -> Self {
        let auth = config.jwks_url.as_ref().map(|jwks_url| {
            let fetcher = Arc::new(RemoteKeySetFetcher::with_timeout(
                jwks_url.clone(),
                config.jwks_fetch_timeout,
            ));
            let key_cache = Arc::new(KeyCache::with_ttl(fetcher, config.jwks_cache_ttl));
            let validator = Arc::new(TokenValidator::new(
                key_cache,
                config.jwt_issuer.clone(),
                config.jwt_clock_skew,
            ));

            Arc::new(AuthState {
                validator,
                expected_audience: config.jwt_audience.clone(),
            })
        });

        Self { config, auth }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/healthz` - Liveness probe - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/api/me` - Current caller - behind the auth gate
/// - `api_routes` nested under `/api`, behind the same gate
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
///
/// Without a configured key set the gate is skipped and `/api` is served
/// unauthenticated.
pub fn build_routes(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    api_routes: Router,
) -> Router {
    // Public routes (no authentication required)
    let public_routes = Router::new().route("/healthz", get(handlers::health_check));

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let api = Router::new()
        .route("/me", get(handlers::get_me))
        .merge(api_routes);

    let api = match &state.auth {
        Some(auth_state) => api.route_layer(middleware::from_fn_with_state(
            Arc::clone(auth_state),
            require_auth,
        )),
        None => {
            tracing::warn!(
                target: "ps.routes",
                "No JWKS URL configured; /api routes are served WITHOUT authentication"
            );
            api
        }
    };

    // Merge routes and apply global middleware layers
    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .nest("/api", api)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

async fn not_found() -> ServiceError {
    ServiceError::NotFound("Resource not found".to_string())
}
