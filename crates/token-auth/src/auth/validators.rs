//! Claim validation.
//!
//! Independent checks run in a fixed order after the signature has been
//! verified; the first failing check rejects the token. All time checks take
//! `now` explicitly so they can be tested deterministically.

use crate::auth::token::DecodedToken;
use crate::auth::trust::TrustConfiguration;
use crate::errors::AuthError;
use chrono::Utc;
use url::Url;

/// A single check of a token's claims against the configuration that
/// verified its signature.
pub trait ClaimValidator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn validate(
        &self,
        token: &DecodedToken,
        configuration: &TrustConfiguration,
        now: i64,
    ) -> Result<(), AuthError>;
}

/// `exp` must be present and in the future.
#[derive(Debug, Clone, Copy)]
pub struct ExpirationValidator {
    leeway_seconds: i64,
}

impl ExpirationValidator {
    pub fn new(leeway_seconds: i64) -> Self {
        Self { leeway_seconds }
    }
}

impl ClaimValidator for ExpirationValidator {
    fn name(&self) -> &'static str {
        "expiration"
    }

    fn validate(
        &self,
        token: &DecodedToken,
        _configuration: &TrustConfiguration,
        now: i64,
    ) -> Result<(), AuthError> {
        // A token without exp never expires; treat it as expired.
        let exp = token.claims().expiration().unwrap_or(0);

        if exp.saturating_add(self.leeway_seconds) <= now {
            return Err(AuthError::Expired { exp, now });
        }
        Ok(())
    }
}

/// `nbf`, if present, must not be in the future.
#[derive(Debug, Clone, Copy)]
pub struct NotBeforeValidator {
    leeway_seconds: i64,
}

impl NotBeforeValidator {
    pub fn new(leeway_seconds: i64) -> Self {
        Self { leeway_seconds }
    }
}

impl ClaimValidator for NotBeforeValidator {
    fn name(&self) -> &'static str {
        "not_before"
    }

    fn validate(
        &self,
        token: &DecodedToken,
        _configuration: &TrustConfiguration,
        now: i64,
    ) -> Result<(), AuthError> {
        match token.claims().not_before() {
            Some(nbf) if nbf > now.saturating_add(self.leeway_seconds) => {
                Err(AuthError::NotYetValid { nbf, now })
            }
            _ => Ok(()),
        }
    }
}

/// `iss` must name the configuration's issuer domain or a subdomain of it.
#[derive(Debug, Clone, Copy, Default)]
pub struct IssuerValidator;

impl ClaimValidator for IssuerValidator {
    fn name(&self) -> &'static str {
        "issuer"
    }

    fn validate(
        &self,
        token: &DecodedToken,
        configuration: &TrustConfiguration,
        _now: i64,
    ) -> Result<(), AuthError> {
        let issuer = token.claims().issuer().unwrap_or_default();
        let domain = configuration.issuer_domain();

        let matches = issuer_host(issuer)
            .map(|host| host == domain || host.ends_with(&format!(".{}", domain)))
            .unwrap_or(false);

        if matches {
            Ok(())
        } else {
            Err(AuthError::IssuerMismatch {
                issuer: issuer.to_string(),
                domain: domain.to_string(),
            })
        }
    }
}

/// Host part of an `iss` value that is either a bare host or an https URL.
fn issuer_host(issuer: &str) -> Option<String> {
    if issuer.is_empty() {
        return None;
    }

    let url = if issuer.contains("://") {
        Url::parse(issuer).ok().filter(|url| url.scheme() == "https")?
    } else {
        Url::parse(&format!("https://{}", issuer)).ok()?
    };

    url.host_str().map(str::to_ascii_lowercase)
}

/// The token must be issued to, or intended for, this service: `cid`/`azp`
/// equals the client id, or `aud` lists the client id or application id.
#[derive(Debug, Clone, Copy, Default)]
pub struct AudienceValidator;

impl ClaimValidator for AudienceValidator {
    fn name(&self) -> &'static str {
        "audience"
    }

    fn validate(
        &self,
        token: &DecodedToken,
        configuration: &TrustConfiguration,
        _now: i64,
    ) -> Result<(), AuthError> {
        let claims = token.claims();
        let client_id = configuration.client_id();

        if claims.client_id() == Some(client_id) {
            return Ok(());
        }

        let audiences = claims.audiences();
        let listed = audiences.iter().any(|aud| {
            *aud == client_id || configuration.application_id() == Some(*aud)
        });

        if listed {
            Ok(())
        } else {
            Err(AuthError::AudienceMismatch)
        }
    }
}

/// If the configuration is bound to a zone, the token's tenant claim must
/// name the same zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZoneValidator;

impl ClaimValidator for ZoneValidator {
    fn name(&self) -> &'static str {
        "zone"
    }

    fn validate(
        &self,
        token: &DecodedToken,
        configuration: &TrustConfiguration,
        _now: i64,
    ) -> Result<(), AuthError> {
        match configuration.zone_id() {
            Some(zone) if token.claims().tenant_id(configuration.family()) != Some(zone) => {
                Err(AuthError::ZoneMismatch)
            }
            _ => Ok(()),
        }
    }
}

/// Ordered, fail-fast sequence of claim validators.
pub struct ClaimValidatorChain {
    validators: Vec<Box<dyn ClaimValidator>>,
}

impl ClaimValidatorChain {
    /// The standard chain: expiration, not-before, issuer, audience, zone.
    ///
    /// `clock_skew_seconds` is the leeway applied to `exp` and `nbf`.
    pub fn new(clock_skew_seconds: i64) -> Self {
        Self {
            validators: vec![
                Box::new(ExpirationValidator::new(clock_skew_seconds)),
                Box::new(NotBeforeValidator::new(clock_skew_seconds)),
                Box::new(IssuerValidator),
                Box::new(AudienceValidator),
                Box::new(ZoneValidator),
            ],
        }
    }

    /// Append a check that runs after the standard ones.
    pub fn with_validator(mut self, validator: impl ClaimValidator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Validate against the current time.
    pub fn validate(
        &self,
        token: &DecodedToken,
        configuration: &TrustConfiguration,
    ) -> Result<(), AuthError> {
        self.validate_at(token, configuration, Utc::now().timestamp())
    }

    /// Validate with an explicit `now` (seconds since epoch).
    pub fn validate_at(
        &self,
        token: &DecodedToken,
        configuration: &TrustConfiguration,
        now: i64,
    ) -> Result<(), AuthError> {
        for validator in &self.validators {
            if let Err(e) = validator.validate(token, configuration, now) {
                tracing::debug!(
                    target: "auth.jwt",
                    validator = validator.name(),
                    error_type = e.error_type(),
                    "Token rejected by claim validation"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ClaimValidatorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.validators.iter().map(|v| v.name()))
            .finish()
    }
}
