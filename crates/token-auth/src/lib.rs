//! Bearer token authentication for multi-tenant services.
//!
//! Validates `Authorization: Bearer` JWTs issued by a legacy authorization
//! server family, a modern identity provider family, or both at once.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = AuthConfig::from_env()?;
//! let authenticator = TokenAuthenticator::from_config(&config)?;
//!
//! let context = SecurityContext::new();
//! let _scope = context.enter();
//! let result = authenticator
//!     .authenticate(Some("Bearer eyJ..."), &context)
//!     .await;
//! ```

pub mod auth;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod observability;

pub use auth::{AuthenticationResult, DecodedToken, SecurityContext, TokenAuthenticator};
pub use config::{AuthConfig, ConfigError};
pub use errors::AuthError;
