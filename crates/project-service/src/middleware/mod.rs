//! Middleware for the project service.
//!
//! # Components
//!
//! - `auth` - Bearer token gate for the `/api` routes
//! - `http_metrics` - HTTP request metrics middleware

pub mod auth;
pub mod http_metrics;

pub use auth::{authenticate, extract_bearer_token, require_auth, AuthContext, AuthState};
pub use http_metrics::http_metrics_middleware;
