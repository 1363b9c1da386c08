//! Authentication middleware for protected routes.
//!
//! Runs the token authenticator against the request's Authorization header
//! and injects the validated token into request extensions.

use crate::auth::{DecodedToken, SecurityContext, TokenAuthenticator};
use crate::errors::AuthError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<TokenAuthenticator>,
}

/// Authentication middleware that validates bearer tokens.
///
/// A fresh [`SecurityContext`] is created per request and cleared once the
/// handler returns. Handlers can read the token via [`TokenExt`] or the
/// `Arc<SecurityContext>` extension.
///
/// # Response
///
/// - Returns 401 Unauthorized with WWW-Authenticate header if the token is missing or invalid
/// - Continues to next handler with the token in extensions if it is valid
#[instrument(skip_all, name = "auth.middleware")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, AuthError> {
    let context = Arc::new(SecurityContext::new());
    let _scope = context.enter();

    let token = state
        .authenticator
        .authenticate_headers(req.headers(), &context)
        .await
        .into_result()
        .inspect_err(|e| {
            tracing::debug!(target: "auth.middleware", error_type = e.error_type(), "Rejecting request");
        })?;

    req.extensions_mut().insert(token);
    req.extensions_mut().insert(Arc::clone(&context));

    Ok(next.run(req).await)
}

/// Extension trait for extracting the validated token from a request.
pub trait TokenExt {
    /// Returns `None` if the auth middleware was not applied to this request.
    fn token(&self) -> Option<&Arc<DecodedToken>>;
}

impl<B> TokenExt for axum::extract::Request<B> {
    fn token(&self) -> Option<&Arc<DecodedToken>> {
        self.extensions().get::<Arc<DecodedToken>>()
    }
}
