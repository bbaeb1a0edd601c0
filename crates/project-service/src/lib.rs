//! Project Service Library
//!
//! Bearer-token authentication for the project/build REST backend. Tokens
//! are RS256 JWTs issued by an OpenID Connect provider (Keycloak) and
//! verified against the provider's published key set.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/jwt.rs -> auth/jwks.rs -> auth/keys.rs
//! ```
//!
//! The CRUD surface (projects, builds, env vars) is supplied by the caller
//! as a router and mounted behind the same gate via
//! [`routes::build_routes`].
//!
//! # Modules
//!
//! - `auth` - Key decoding, key set cache, token validation, claims
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Auth gate and HTTP metrics
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
