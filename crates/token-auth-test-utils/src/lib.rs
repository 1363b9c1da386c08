//! # Token Auth Test Utilities
//!
//! Shared test utilities for the `token-auth` crate.
//!
//! This crate provides:
//! - Deterministic signing keys (seeded Ed25519, a fixed RSA key)
//! - Claim builders for legacy and modern issuer tokens
//! - A wiremock-backed token key endpoint with call counting
//! - Fixed test IDs (client ids, domains, key ids)
//! - Custom assertions (TokenAssertions trait)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use token_auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = TestSigningKey::rsa(TEST_KEY_ID_1);
//!     let server = MockJwksServer::start(&[&key]).await;
//!
//!     let token = key.sign(&TestTokenBuilder::legacy().build());
//!     token.assert_valid_jwt().assert_signed_by(TEST_KEY_ID_1);
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod jwks_server;
pub mod test_ids;
pub mod token_builders;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use test_ids::*;
pub use token_builders::*;
