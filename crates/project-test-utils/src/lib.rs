//! # Project Service Test Utilities
//!
//! Shared test utilities for the project service.
//!
//! This crate provides:
//! - Deterministic RSA keypairs and their JWK components (`crypto_fixtures`)
//! - A claims builder for signed test tokens (`token_builders`)
//! - A mock JWKS endpoint on top of wiremock (`mock_jwks`)
//! - Server test harness (`TestProjectServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use project_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let jwks = MockJwks::start().await;
//!     jwks.serve_keys(key_set(&[TestKeypair::primary().jwk_json("k1")])).await;
//!
//!     let server = TestProjectServer::spawn(jwks.auth_vars()).await?;
//!     let token = TestTokenBuilder::new().for_user("user-42").sign("k1");
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/api/me", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_jwks;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_jwks::*;
pub use server_harness::*;
pub use token_builders::*;
