//! Authentication error types.
//!
//! Every failure of the token pipeline is an [`AuthError`]. The authenticator
//! converts them into an unauthenticated result; the axum integration maps
//! them to `401 Unauthorized` via the `IntoResponse` impl.
//!
//! Messages never contain key material or signature bytes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message used when the bearer token is not structurally a JWT.
pub const MALFORMED_TOKEN_MESSAGE: &str =
    "JWT token does not consist of 'header'.'payload'.'signature'";

/// Token authentication error type.
///
/// `Clone` so that the outcome of one shared key fetch can be handed to every
/// caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authorization header is missing")]
    HeaderMissing,

    #[error("{0}")]
    MalformedToken(String),

    #[error("There must be a service configuration.")]
    NoConfiguration,

    #[error("{0}")]
    AmbiguousConfiguration(String),

    #[error("Failed to retrieve token keys: {0}")]
    KeyRetrievalFailure(String),

    #[error("Key id '{kid}' is not published by the token key endpoint")]
    UnknownKey { kid: String },

    #[error("Token signature is invalid: {0}")]
    SignatureInvalid(String),

    #[error("Token has expired (exp {exp}, now {now})")]
    Expired { exp: i64, now: i64 },

    #[error("Token is not valid yet (nbf {nbf}, now {now})")]
    NotYetValid { nbf: i64, now: i64 },

    #[error("Token issuer '{issuer}' does not match the trusted domain '{domain}'")]
    IssuerMismatch { issuer: String, domain: String },

    #[error("Token audience does not match the client id or application id of the service")]
    AudienceMismatch,

    #[error("Token zone does not match the zone of the service instance")]
    ZoneMismatch,

    #[error("Unexpected error occurred: {0}")]
    UnexpectedInternalFault(String),
}

impl AuthError {
    /// Structural token failure with the standard message.
    pub fn malformed() -> Self {
        AuthError::MalformedToken(MALFORMED_TOKEN_MESSAGE.to_string())
    }

    /// Bounded label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            AuthError::HeaderMissing => "header_missing",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::NoConfiguration => "no_configuration",
            AuthError::AmbiguousConfiguration(_) => "ambiguous_configuration",
            AuthError::KeyRetrievalFailure(_) => "key_retrieval_failure",
            AuthError::UnknownKey { .. } => "unknown_key",
            AuthError::SignatureInvalid(_) => "signature_invalid",
            AuthError::Expired { .. } => "expired",
            AuthError::NotYetValid { .. } => "not_yet_valid",
            AuthError::IssuerMismatch { .. } => "issuer_mismatch",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::ZoneMismatch => "zone_mismatch",
            AuthError::UnexpectedInternalFault(_) => "internal",
        }
    }

    /// HTTP status for this error. Every authentication failure is a 401 to
    /// the client; pipeline faults are told apart in logs and the body code.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn response_code(&self) -> &'static str {
        match self {
            AuthError::HeaderMissing => "MISSING_TOKEN",
            AuthError::NoConfiguration | AuthError::UnexpectedInternalFault(_) => {
                "AUTHENTICATION_UNAVAILABLE"
            }
            _ => "INVALID_TOKEN",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::NoConfiguration | AuthError::UnexpectedInternalFault(_) => {
                tracing::error!(target: "auth.errors", error = %self, "Authentication pipeline failure");
            }
            AuthError::KeyRetrievalFailure(_) => {
                tracing::warn!(target: "auth.errors", error = %self, "Token keys unavailable");
            }
            _ => {
                tracing::debug!(target: "auth.errors", error_type = self.error_type(), "Request rejected");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.response_code().to_string(),
                message: self.to_string(),
            },
        };

        let mut response = (self.status_code(), Json(body)).into_response();

        let challenge = if matches!(self, AuthError::HeaderMissing) {
            "Bearer"
        } else {
            "Bearer error=\"invalid_token\""
        };
        if let Ok(header_value) = challenge.parse() {
            response
                .headers_mut()
                .insert("WWW-Authenticate", header_value);
        }

        response
    }
}
