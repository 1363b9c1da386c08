//! Signature verification against the keys of the candidate issuers.

use crate::auth::jwks::JwksCache;
use crate::auth::token::DecodedToken;
use crate::auth::trust::TrustConfiguration;
use crate::errors::AuthError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{crypto, Algorithm};
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

/// Verifies token signatures with keys from the signing-key cache.
#[derive(Clone)]
pub struct SignatureValidator {
    cache: Arc<JwksCache>,
}

impl SignatureValidator {
    pub fn new(cache: Arc<JwksCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<JwksCache> {
        &self.cache
    }

    /// Verify the signature of `token` against each candidate in order and
    /// return the first candidate whose key verifies it.
    ///
    /// Tokens without a key id, unsigned tokens, and tokens using symmetric
    /// algorithms are rejected without contacting any key endpoint. A
    /// candidate whose keys cannot be retrieved is skipped.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SignatureInvalid` if no candidate verifies the token.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn verify<'a>(
        &self,
        token: &DecodedToken,
        candidates: &[&'a TrustConfiguration],
    ) -> Result<&'a TrustConfiguration, AuthError> {
        let alg = signing_algorithm(&token.header().alg)?;

        let kid = token.key_id().ok_or_else(|| {
            tracing::debug!(target: "auth.jwt", "Token rejected: missing kid in header");
            AuthError::SignatureInvalid("token header has no key id".to_string())
        })?;

        let signing_input = token.raw().signing_input();
        let signature = URL_SAFE_NO_PAD.encode(token.signature_bytes());
        let mut last_failure = None;

        for &candidate in candidates {
            let endpoint = candidate.key_endpoint();

            let key = match self.cache.get_key(endpoint, kid, alg).await {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!(
                        target: "auth.jwt",
                        issuer_domain = %endpoint.issuer_domain,
                        error = %e,
                        "No usable key for candidate configuration"
                    );
                    last_failure = Some(e);
                    continue;
                }
            };

            match crypto::verify(&signature, signing_input.as_bytes(), key.decoding_key(), alg) {
                Ok(true) => {
                    tracing::debug!(
                        target: "auth.jwt",
                        issuer_domain = %endpoint.issuer_domain,
                        kid = %kid,
                        "Token signature verified"
                    );
                    return Ok(candidate);
                }
                Ok(false) => {
                    tracing::debug!(
                        target: "auth.jwt",
                        issuer_domain = %endpoint.issuer_domain,
                        kid = %kid,
                        "Token signature does not match key"
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        target: "auth.jwt",
                        issuer_domain = %endpoint.issuer_domain,
                        error = %e,
                        "Token signature verification failed"
                    );
                }
            }
        }

        let message = match last_failure {
            Some(AuthError::KeyRetrievalFailure(cause)) => {
                format!("no verification key available ({})", cause)
            }
            Some(AuthError::UnknownKey { kid }) => {
                format!("key id '{}' is unknown to the trusted issuers", kid)
            }
            _ => "signature does not match any trusted key".to_string(),
        };
        Err(AuthError::SignatureInvalid(message))
    }
}

/// Parse the header algorithm, accepting asymmetric JWS algorithms only.
fn signing_algorithm(alg: &str) -> Result<Algorithm, AuthError> {
    if alg.eq_ignore_ascii_case("none") {
        tracing::debug!(target: "auth.jwt", "Token rejected: unsigned token");
        return Err(AuthError::SignatureInvalid(
            "unsigned tokens are not accepted".to_string(),
        ));
    }

    match Algorithm::from_str(alg) {
        Ok(Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) => {
            tracing::debug!(target: "auth.jwt", alg = %alg, "Token rejected: symmetric algorithm");
            Err(AuthError::SignatureInvalid(format!(
                "algorithm {} is not accepted",
                alg
            )))
        }
        Ok(algorithm) => Ok(algorithm),
        Err(_) => {
            tracing::debug!(target: "auth.jwt", alg = %alg, "Token rejected: unsupported algorithm");
            Err(AuthError::SignatureInvalid(format!(
                "algorithm {} is not supported",
                alg
            )))
        }
    }
}
