//! Compact JWT parsing.
//!
//! Splits a bearer token into its three segments and decodes header and
//! payload. Nothing here is trusted: a well-formed token with a forged
//! signature parses successfully and is rejected later by signature
//! verification.

use crate::auth::claims::Claims;
use crate::errors::AuthError;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;
use std::fmt;

/// Maximum accepted token size in bytes (8KB).
///
/// Checked before any decoding so oversized input costs nothing.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Base64url engine that tolerates (but does not require) trailing padding.
const BASE64URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// The three encoded segments of a compact JWT, exactly as received.
#[derive(Clone, PartialEq, Eq)]
pub struct RawToken {
    header: String,
    payload: String,
    signature: String,
}

impl RawToken {
    /// Split a compact token into its segments.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MalformedToken` if the token is larger than
    /// [`MAX_TOKEN_SIZE_BYTES`] or does not consist of exactly three
    /// non-empty dot-separated segments.
    pub fn new(token: &str) -> Result<Self, AuthError> {
        if token.len() > MAX_TOKEN_SIZE_BYTES {
            tracing::debug!(
                target: "auth.jwt",
                token_size = token.len(),
                max_size = MAX_TOKEN_SIZE_BYTES,
                "Token rejected: size exceeds maximum allowed"
            );
            return Err(AuthError::malformed());
        }

        let mut parts = token.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(header), Some(payload), Some(signature), None)
                if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
            {
                Ok(Self {
                    header: header.to_string(),
                    payload: payload.to_string(),
                    signature: signature.to_string(),
                })
            }
            _ => {
                tracing::debug!(
                    target: "auth.jwt",
                    parts = token.split('.').count(),
                    "Token rejected: invalid JWT format"
                );
                Err(AuthError::malformed())
            }
        }
    }

    pub fn header_segment(&self) -> &str {
        &self.header
    }

    pub fn payload_segment(&self) -> &str {
        &self.payload
    }

    pub fn signature_segment(&self) -> &str {
        &self.signature
    }

    /// The bytes covered by the signature: `header.payload`.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.payload)
    }

    /// The compact serialization, e.g. for forwarding the token downstream.
    pub fn compact(&self) -> String {
        format!("{}.{}.{}", self.header, self.payload, self.signature)
    }
}

impl fmt::Debug for RawToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawToken")
            .field("header", &self.header)
            .field("payload", &"[REDACTED]")
            .field("signature", &"[REDACTED]")
            .finish()
    }
}

/// JOSE header fields the pipeline uses.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    /// Signing algorithm, e.g. `RS256`.
    pub alg: String,

    /// Key ID used to select the verification key.
    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default)]
    pub typ: Option<String>,

    /// Token key URL advertised by legacy-family issuers. Informational only;
    /// keys are always fetched from the configured endpoint.
    #[serde(default)]
    pub jku: Option<String>,
}

/// A parsed, not yet trusted, token.
#[derive(Clone)]
pub struct DecodedToken {
    raw: RawToken,
    header: TokenHeader,
    claims: Claims,
    signature: Vec<u8>,
}

impl DecodedToken {
    /// Parse a compact JWT.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MalformedToken` if the structure is invalid, a
    /// segment is not base64url, or header/payload are not JSON objects.
    pub fn parse(token: &str) -> Result<Self, AuthError> {
        let raw = RawToken::new(token)?;

        let header_bytes = decode_segment(raw.header_segment(), "header")?;
        let header: TokenHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
            tracing::debug!(target: "auth.jwt", error = %e, "Failed to parse JWT header JSON");
            AuthError::MalformedToken("JWT header is not a valid JSON object".to_string())
        })?;

        let payload_bytes = decode_segment(raw.payload_segment(), "payload")?;
        let claims: Claims = serde_json::from_slice(&payload_bytes).map_err(|e| {
            tracing::debug!(target: "auth.jwt", error = %e, "Failed to parse JWT payload JSON");
            AuthError::MalformedToken("JWT payload is not a valid JSON object".to_string())
        })?;

        let signature = decode_segment(raw.signature_segment(), "signature")?;

        Ok(Self {
            raw,
            header,
            claims,
            signature,
        })
    }

    pub fn raw(&self) -> &RawToken {
        &self.raw
    }

    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Raw signature bytes.
    pub fn signature_bytes(&self) -> &[u8] {
        &self.signature
    }

    /// Key ID from the header, if present and non-empty.
    pub fn key_id(&self) -> Option<&str> {
        self.header.kid.as_deref().filter(|kid| !kid.is_empty())
    }
}

impl fmt::Debug for DecodedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedToken")
            .field("header", &self.header)
            .field("claims", &self.claims)
            .field("signature", &"[REDACTED]")
            .finish()
    }
}

fn decode_segment(segment: &str, name: &'static str) -> Result<Vec<u8>, AuthError> {
    BASE64URL.decode(segment).map_err(|e| {
        tracing::debug!(target: "auth.jwt", segment = name, error = %e, "Failed to decode JWT segment base64");
        AuthError::MalformedToken(format!("JWT {} is not valid base64url", name))
    })
}
