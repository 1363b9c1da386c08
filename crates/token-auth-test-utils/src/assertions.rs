//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions on compact tokens produced by the fixtures.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::Value;

/// Custom assertions for compact JWT strings
///
/// # Example
/// ```rust,ignore
/// token
///     .assert_valid_jwt()
///     .assert_signed_by("key-1")
///     .assert_claim("cid", "clientId");
/// ```
pub trait TokenAssertions {
    /// Assert that the token is a valid JWT format
    fn assert_valid_jwt(&self) -> &Self;

    /// Assert that the token header names the specified key
    fn assert_signed_by(&self, key_id: &str) -> &Self;

    /// Assert that the token header uses the specified algorithm
    fn assert_algorithm(&self, alg: &str) -> &Self;

    /// Assert that a string claim has the specified value
    fn assert_claim(&self, name: &str, expected: &str) -> &Self;
}

fn decode_part(token: &str, index: usize) -> Value {
    let part = token
        .split('.')
        .nth(index)
        .unwrap_or_else(|| panic!("JWT is missing part {}", index));
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .unwrap_or_else(|e| panic!("Failed to base64 decode JWT part {}: {:?}", index, e));
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("Failed to parse JWT part {} JSON: {:?}", index, e))
}

impl TokenAssertions for String {
    fn assert_valid_jwt(&self) -> &Self {
        let parts: Vec<_> = self.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "JWT must have 3 parts (header.payload.signature), got {}",
            parts.len()
        );

        let header = decode_part(self, 0);
        assert!(header.get("alg").is_some(), "JWT header must carry alg");

        let claims = decode_part(self, 1);
        assert!(claims.is_object(), "JWT payload must be a JSON object");

        self
    }

    fn assert_signed_by(&self, key_id: &str) -> &Self {
        let header = decode_part(self, 0);
        assert_eq!(
            header["kid"].as_str(),
            Some(key_id),
            "Expected token signed by key '{}'",
            key_id
        );
        self
    }

    fn assert_algorithm(&self, alg: &str) -> &Self {
        let header = decode_part(self, 0);
        assert_eq!(header["alg"].as_str(), Some(alg), "Expected {} algorithm", alg);
        self
    }

    fn assert_claim(&self, name: &str, expected: &str) -> &Self {
        let claims = decode_part(self, 1);
        assert_eq!(
            claims[name].as_str(),
            Some(expected),
            "Expected claim '{}' to be '{}'",
            name,
            expected
        );
        self
    }
}
