//! Builder patterns for test data construction
//!
//! Provides fluent APIs for creating token claims in the shape each issuer
//! family produces.

use crate::test_ids::*;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::legacy()
///     .for_user("alice")
///     .in_zone("zone-a")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Empty claims; nothing is set.
    pub fn new() -> Self {
        Self { claims: Map::new() }
    }

    /// Claims as issued by the legacy authorization server on [`TEST_DOMAIN`]
    /// to [`TEST_CLIENT_ID`], valid for an hour.
    pub fn legacy() -> Self {
        Self::new()
            .issuer(&format!("https://tenant.{}/oauth/token", TEST_DOMAIN))
            .client(TEST_CLIENT_ID)
            .audience(TEST_CLIENT_ID)
            .for_user(TEST_USER_ALICE)
            .issued_now()
            .expires_in(3600)
    }

    /// Claims as issued by the modern identity provider on
    /// [`TEST_MODERN_DOMAIN`] to [`TEST_MODERN_CLIENT_ID`], valid for an hour.
    pub fn modern() -> Self {
        Self::new()
            .issuer(&format!("https://{}", TEST_MODERN_DOMAIN))
            .claim("azp", json!(TEST_MODERN_CLIENT_ID))
            .audience(TEST_MODERN_CLIENT_ID)
            .claim("app_tid", json!(TEST_TENANT_ID))
            .for_user(TEST_USER_ALICE)
            .issued_now()
            .expires_in(3600)
    }

    /// Set the subject
    pub fn for_user(self, subject: &str) -> Self {
        self.claim("sub", json!(subject))
    }

    pub fn issuer(self, issuer: &str) -> Self {
        self.claim("iss", json!(issuer))
    }

    /// Set the `cid` claim
    pub fn client(self, client_id: &str) -> Self {
        self.claim("cid", json!(client_id))
    }

    pub fn audience(self, audience: &str) -> Self {
        self.claim("aud", json!([audience]))
    }

    pub fn audiences(self, audiences: &[&str]) -> Self {
        self.claim("aud", json!(audiences))
    }

    /// Set the legacy zone claim
    pub fn in_zone(self, zone: &str) -> Self {
        self.claim("zid", json!(zone))
    }

    /// Set the scope (space-separated)
    pub fn with_scope(self, scope: &str) -> Self {
        self.claim("scope", json!(scope))
    }

    /// Set expiration in seconds from now; negative values produce an expired token
    pub fn expires_in(self, seconds: i64) -> Self {
        self.claim("exp", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        self.claim("nbf", json!((Utc::now() + Duration::seconds(seconds)).timestamp()))
    }

    pub fn issued_now(self) -> Self {
        self.claim("iat", json!(Utc::now().timestamp()))
    }

    /// Set an arbitrary claim
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim set by a preset
    pub fn without(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
