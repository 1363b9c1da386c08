//! Request-scoped security context.
//!
//! Holds the token of the request currently being handled. The authenticator
//! sets it on success; a [`ContextScope`] clears it when request handling
//! ends, whatever the outcome.

use crate::auth::token::DecodedToken;
use std::sync::{Arc, Mutex, PoisonError};

/// The authenticated token of one request, if any.
#[derive(Debug, Default)]
pub struct SecurityContext {
    token: Mutex<Option<Arc<DecodedToken>>>,
}

impl SecurityContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The token set by the last successful authentication in this scope.
    pub fn token(&self) -> Option<Arc<DecodedToken>> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub(crate) fn set(&self, token: Arc<DecodedToken>) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    pub fn clear(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Open a scope that clears the context when dropped.
    pub fn enter(&self) -> ContextScope<'_> {
        ContextScope { context: self }
    }
}

/// Clears its [`SecurityContext`] on drop.
#[must_use = "the context is cleared as soon as the scope is dropped"]
pub struct ContextScope<'a> {
    context: &'a SecurityContext,
}

impl ContextScope<'_> {
    pub fn context(&self) -> &SecurityContext {
        self.context
    }
}

impl Drop for ContextScope<'_> {
    fn drop(&mut self) {
        self.context.clear();
    }
}
