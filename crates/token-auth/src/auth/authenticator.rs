//! Token authenticator.
//!
//! Runs the validation pipeline for one request:
//! extract bearer token → parse → resolve trust configurations → verify
//! signature → validate claims. Every failure, including a panic inside the
//! pipeline, ends in [`AuthenticationResult::Unauthenticated`].

use crate::auth::context::SecurityContext;
use crate::auth::jwks::JwksCache;
use crate::auth::resolver::ConfigurationResolver;
use crate::auth::signature::SignatureValidator;
use crate::auth::token::DecodedToken;
use crate::auth::validators::{ClaimValidator, ClaimValidatorChain};
use crate::config::{AuthConfig, ConfigError};
use crate::errors::AuthError;
use crate::observability::metrics::record_token_validation;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

const BEARER_PREFIX: &str = "Bearer ";

/// Outcome of authenticating one request.
///
/// Either a validated token or the reason it was rejected, never both.
#[derive(Debug, Clone)]
pub enum AuthenticationResult {
    Authenticated(Arc<DecodedToken>),
    Unauthenticated(AuthError),
}

impl AuthenticationResult {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthenticationResult::Authenticated(_))
    }

    pub fn token(&self) -> Option<&Arc<DecodedToken>> {
        match self {
            AuthenticationResult::Authenticated(token) => Some(token),
            AuthenticationResult::Unauthenticated(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&AuthError> {
        match self {
            AuthenticationResult::Authenticated(_) => None,
            AuthenticationResult::Unauthenticated(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<Arc<DecodedToken>, AuthError> {
        match self {
            AuthenticationResult::Authenticated(token) => Ok(token),
            AuthenticationResult::Unauthenticated(reason) => Err(reason),
        }
    }
}

/// Validates bearer tokens against the bound service instances.
///
/// Share one instance (and thereby one key cache) across all requests.
pub struct TokenAuthenticator {
    resolver: ConfigurationResolver,
    signature_validator: SignatureValidator,
    claim_validators: ClaimValidatorChain,
}

impl TokenAuthenticator {
    /// Create an authenticator.
    ///
    /// # Arguments
    ///
    /// * `resolver` - Bound service instances
    /// * `cache` - Signing-key cache, usually shared process-wide
    /// * `clock_skew_seconds` - Leeway for `exp`/`nbf`
    pub fn new(
        resolver: ConfigurationResolver,
        cache: Arc<JwksCache>,
        clock_skew_seconds: i64,
    ) -> Self {
        Self {
            resolver,
            signature_validator: SignatureValidator::new(cache),
            claim_validators: ClaimValidatorChain::new(clock_skew_seconds),
        }
    }

    /// Build an authenticator with an HTTP-backed key cache from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the trust configurations are inconsistent.
    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let resolver = ConfigurationResolver::new(config.trust_configurations.clone())?;
        let cache = Arc::new(JwksCache::from_config(config));
        Ok(Self::new(resolver, cache, config.clock_skew_seconds))
    }

    /// Append a claim check that runs after the standard ones.
    pub fn with_claim_validator(mut self, validator: impl ClaimValidator + 'static) -> Self {
        self.claim_validators = self.claim_validators.with_validator(validator);
        self
    }

    pub fn cache(&self) -> &Arc<JwksCache> {
        self.signature_validator.cache()
    }

    pub fn resolver(&self) -> &ConfigurationResolver {
        &self.resolver
    }

    /// Authenticate the value of an `Authorization` header.
    ///
    /// `context` is cleared first and holds the token afterwards only if the
    /// result is [`AuthenticationResult::Authenticated`].
    #[instrument(skip_all)]
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        context: &SecurityContext,
    ) -> AuthenticationResult {
        let start = Instant::now();
        context.clear();

        let outcome = AssertUnwindSafe(self.run_pipeline(authorization))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let cause = panic_message(panic.as_ref());
                tracing::error!(target: "auth.authenticator", cause = %cause, "Token validation panicked");
                Err(AuthError::UnexpectedInternalFault(cause))
            });

        match outcome {
            Ok(token) => {
                context.set(Arc::clone(&token));
                record_token_validation("success", None, start.elapsed());
                tracing::debug!(target: "auth.authenticator", "Request authenticated");
                AuthenticationResult::Authenticated(token)
            }
            Err(e) => {
                record_token_validation("error", Some(e.error_type()), start.elapsed());
                match &e {
                    AuthError::NoConfiguration | AuthError::UnexpectedInternalFault(_) => {
                        tracing::error!(target: "auth.authenticator", error = %e, "Authentication unavailable");
                    }
                    _ => {
                        tracing::debug!(target: "auth.authenticator", error = %e, "Request not authenticated");
                    }
                }
                AuthenticationResult::Unauthenticated(e)
            }
        }
    }

    /// Authenticate the `Authorization` header of a request.
    pub async fn authenticate_headers(
        &self,
        headers: &HeaderMap,
        context: &SecurityContext,
    ) -> AuthenticationResult {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        self.authenticate(authorization, context).await
    }

    async fn run_pipeline(
        &self,
        authorization: Option<&str>,
    ) -> Result<Arc<DecodedToken>, AuthError> {
        let raw = extract_bearer(authorization)?;
        let token = DecodedToken::parse(raw)?;
        let candidates = self.resolver.resolve(&token)?;
        let configuration = self.signature_validator.verify(&token, &candidates).await?;
        self.claim_validators.validate(&token, configuration)?;

        tracing::debug!(
            target: "auth.authenticator",
            issuer_domain = %configuration.issuer_domain(),
            family = %configuration.family(),
            "Token validated"
        );
        Ok(Arc::new(token))
    }
}

fn extract_bearer(authorization: Option<&str>) -> Result<&str, AuthError> {
    authorization
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .ok_or_else(|| {
            tracing::debug!(target: "auth.authenticator", "Missing or non-bearer Authorization header");
            AuthError::HeaderMissing
        })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
