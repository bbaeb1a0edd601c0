//! Mock JWKS endpoint
//!
//! Wraps a wiremock server publishing a key set at a Keycloak-style path,
//! with helpers for the failure modes the key cache must survive.

use crate::token_builders::{TEST_AUDIENCE, TEST_ISSUER};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/realms/demo/protocol/openid-connect/certs";

/// Wrap JWK descriptors into a key set document.
pub fn key_set(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

/// A mock identity provider key set endpoint.
pub struct MockJwks {
    server: MockServer,
}

impl MockJwks {
    /// Start a mock server with nothing mounted.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full URL of the key set endpoint.
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Environment for a server that trusts this mock, using the default
    /// test issuer and audience.
    pub fn auth_vars(&self) -> HashMap<String, String> {
        HashMap::from([
            ("JWKS_URL".to_string(), self.url()),
            ("JWT_ISSUER".to_string(), TEST_ISSUER.to_string()),
            ("JWT_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
        ])
    }

    /// Serve `document` with 200 for any number of requests.
    pub async fn serve_keys(&self, document: Value) {
        self.mount(ResponseTemplate::new(200).set_body_json(document), None)
            .await;
    }

    /// Serve `document` with 200 and fail verification unless exactly
    /// `calls` requests arrive.
    pub async fn serve_keys_expecting(&self, document: Value, calls: u64) {
        self.mount(ResponseTemplate::new(200).set_body_json(document), Some(calls))
            .await;
    }

    /// Serve `document` after `delay`.
    pub async fn serve_keys_delayed(&self, document: Value, delay: Duration) {
        self.mount(
            ResponseTemplate::new(200)
                .set_body_json(document)
                .set_delay(delay),
            None,
        )
        .await;
    }

    /// Respond with a bare status code.
    pub async fn serve_status(&self, status: u16) {
        self.mount(ResponseTemplate::new(status), None).await;
    }

    /// Respond with 200 and a raw body.
    pub async fn serve_raw(&self, body: &str) {
        self.mount(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string(body),
            None,
        )
        .await;
    }

    /// Drop every mounted response and recorded request.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of key set requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }

    /// Assert every `serve_keys_expecting` expectation was met.
    pub async fn verify(&self) {
        self.server.verify().await;
    }

    async fn mount(&self, response: ResponseTemplate, calls: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response);
        let mock = match calls {
            Some(calls) => mock.expect(calls),
            None => mock,
        };
        mock.mount(&self.server).await;
    }
}
