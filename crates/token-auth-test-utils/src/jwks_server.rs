//! Mock token key endpoint for integration tests
//!
//! Wraps a wiremock server that publishes a key set, optionally with a
//! response delay or an error status, and verifies how often it was called.

use crate::crypto_fixtures::{jwks_json, TestSigningKey};
use crate::test_ids::{LEGACY_JWKS_PATH, MODERN_JWKS_PATH};
use serde_json::Value;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Token key endpoint backed by a wiremock server
///
/// # Example
/// ```rust,ignore
/// let key = TestSigningKey::rsa("key-1");
/// let server = MockJwksServer::builder()
///     .with_keys(&[&key])
///     .expect(1)
///     .start()
///     .await;
///
/// let url = server.jwks_url();
/// ```
pub struct MockJwksServer {
    server: MockServer,
    path: String,
}

/// Configures a [`MockJwksServer`] before it starts.
pub struct MockJwksServerBuilder {
    body: Value,
    path: String,
    status: u16,
    delay: Option<Duration>,
    expected_calls: Option<u64>,
}

impl MockJwksServer {
    pub fn builder() -> MockJwksServerBuilder {
        MockJwksServerBuilder {
            body: serde_json::json!({ "keys": [] }),
            path: LEGACY_JWKS_PATH.to_string(),
            status: 200,
            delay: None,
            expected_calls: None,
        }
    }

    /// Start a server on the legacy path publishing `keys`, with no call
    /// expectation.
    pub async fn start(keys: &[&TestSigningKey]) -> Self {
        Self::builder().with_keys(keys).start().await
    }

    /// Full URL of the published key set.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), self.path)
    }

    /// Base URI of the server.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Panics if the call expectation set on the builder is not met.
    pub async fn verify(&self) {
        self.server.verify().await;
    }
}

impl MockJwksServerBuilder {
    pub fn with_keys(mut self, keys: &[&TestSigningKey]) -> Self {
        self.body = jwks_json(keys);
        self
    }

    /// Serve an arbitrary body instead of a key set.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Serve on the modern identity provider path.
    pub fn modern_path(mut self) -> Self {
        self.path = MODERN_JWKS_PATH.to_string();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Expect exactly `calls` requests; checked when the server is dropped
    /// or on [`MockJwksServer::verify`].
    pub fn expect(mut self, calls: u64) -> Self {
        self.expected_calls = Some(calls);
        self
    }

    pub async fn start(self) -> MockJwksServer {
        let server = MockServer::start().await;

        let mut response = ResponseTemplate::new(self.status).set_body_json(&self.body);
        if let Some(delay) = self.delay {
            response = response.set_delay(delay);
        }

        let mut mock = Mock::given(method("GET"))
            .and(path(self.path.as_str()))
            .respond_with(response);
        if let Some(calls) = self.expected_calls {
            mock = mock.expect(calls);
        }
        mock.mount(&server).await;

        MockJwksServer {
            server,
            path: self.path,
        }
    }
}
