//! Bearer token authentication.
//!
//! # Components
//!
//! - `token` - compact JWT parsing
//! - `claims` - claim accessors for both issuer families
//! - `trust` - bound service instances and their key endpoints
//! - `resolver` - picks the candidate instances for a token
//! - `jwks` - per-endpoint signing-key cache with single-flight refresh
//! - `signature` - signature verification over the candidates
//! - `validators` - fail-fast claim validation chain
//! - `context` - request-scoped security context
//! - `authenticator` - the pipeline tying it all together

pub mod authenticator;
pub mod claims;
pub mod context;
pub mod jwks;
pub mod resolver;
pub mod signature;
pub mod token;
pub mod trust;
pub mod validators;

pub use authenticator::{AuthenticationResult, TokenAuthenticator};
pub use claims::Claims;
pub use context::{ContextScope, SecurityContext};
pub use jwks::{HttpKeySetFetcher, JwksCache, KeySetFetcher};
pub use resolver::ConfigurationResolver;
pub use token::{DecodedToken, RawToken};
pub use trust::{KeyEndpoint, ServiceFamily, TrustConfiguration, TrustSettings};
pub use validators::{ClaimValidator, ClaimValidatorChain};
