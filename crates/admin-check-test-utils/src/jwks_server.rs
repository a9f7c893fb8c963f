//! Mock key publisher for integration tests
//!
//! Wraps a wiremock `MockServer` serving a JWKS document at a fixed path and
//! counts the requests it received, so tests can assert how often the key
//! cache went to the network.

use crate::crypto_fixtures::{jwks_document, TestRsaKey};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock publisher serves keys on.
pub const JWKS_PATH: &str = "/common/discovery/v2.0/keys";

/// Mock JWKS endpoint.
pub struct JwksMockServer {
    server: MockServer,
}

impl JwksMockServer {
    /// Start a publisher serving the given `(kid, key)` pairs.
    pub async fn start(keys: &[(&str, TestRsaKey)]) -> Self {
        let publisher = Self {
            server: MockServer::start().await,
        };
        publisher.publish(keys).await;
        publisher
    }

    /// Start a publisher that answers every request with `status`.
    pub async fn failing(status: u16) -> Self {
        let publisher = Self {
            server: MockServer::start().await,
        };
        publisher.fail_with(status).await;
        publisher
    }

    /// Start a publisher that answers after `delay` (for single-flight tests).
    pub async fn slow(keys: &[(&str, TestRsaKey)], delay: Duration) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks_document(keys))
                    .set_delay(delay),
            )
            .mount(&server)
            .await;
        Self { server }
    }

    /// Replace the published key set (key rotation). Request history is
    /// cleared too.
    pub async fn publish(&self, keys: &[(&str, TestRsaKey)]) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .mount(&self.server)
            .await;
    }

    /// Replace the response with an error status. Request history is
    /// cleared too.
    pub async fn fail_with(&self, status: u16) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Replace the response with a body that is not a JWKS document.
    pub async fn serve_garbage(&self) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not a key set"))
            .mount(&self.server)
            .await;
    }

    /// Full JWKS URL for this publisher.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Requests received since start or the last reset.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}
