//! Trust configuration resolution.
//!
//! Picks the bound service instance(s) a token may belong to, ordered by
//! preference. Supports a single legacy instance, multiple legacy instances
//! told apart by zone, a single modern instance, and both families at once.

use crate::auth::token::DecodedToken;
use crate::auth::trust::{ServiceFamily, TrustConfiguration};
use crate::config::ConfigError;
use crate::errors::AuthError;
use std::collections::HashSet;

/// Resolves candidate trust configurations for a token.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationResolver {
    legacy: Vec<TrustConfiguration>,
    modern: Option<TrustConfiguration>,
}

impl ConfigurationResolver {
    /// Build a resolver over the bound service instances.
    ///
    /// An empty set is accepted; every resolution then fails with
    /// `AuthError::NoConfiguration`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MultipleModernConfigurations` if more than one
    /// modern instance is bound, and `ConfigError::DuplicateZone` if two legacy
    /// instances share a zone.
    pub fn new(configurations: Vec<TrustConfiguration>) -> Result<Self, ConfigError> {
        let mut legacy = Vec::new();
        let mut modern = None;
        let mut zones = HashSet::new();

        for configuration in configurations {
            match configuration.family() {
                ServiceFamily::Modern => {
                    if modern.is_some() {
                        return Err(ConfigError::MultipleModernConfigurations);
                    }
                    modern = Some(configuration);
                }
                ServiceFamily::Legacy => {
                    if let Some(zone) = configuration.zone_id() {
                        if !zones.insert(zone.to_string()) {
                            return Err(ConfigError::DuplicateZone(zone.to_string()));
                        }
                    }
                    legacy.push(configuration);
                }
            }
        }

        tracing::info!(
            target: "auth.resolver",
            legacy_instances = legacy.len(),
            modern_instance = modern.is_some(),
            "Trust configurations bound"
        );

        Ok(Self { legacy, modern })
    }

    pub fn is_empty(&self) -> bool {
        self.legacy.is_empty() && self.modern.is_none()
    }

    /// Candidate configurations for `token`, most preferred first.
    ///
    /// Hybrid preference policy: a token that signals the modern family
    /// (modern-only claim present, or no `zid`) tries the modern instance
    /// first; any other token tries the legacy instance first. This ordering
    /// is a deployment policy, not a protocol guarantee.
    ///
    /// # Errors
    ///
    /// - `AuthError::NoConfiguration` if nothing is bound
    /// - `AuthError::AmbiguousConfiguration` if several legacy instances are
    ///   bound and the token's zone does not single one out
    pub fn resolve<'a>(
        &'a self,
        token: &DecodedToken,
    ) -> Result<Vec<&'a TrustConfiguration>, AuthError> {
        if self.is_empty() {
            return Err(AuthError::NoConfiguration);
        }

        let mut candidates = Vec::with_capacity(2);

        if token.claims().indicates_modern_family() {
            match (&self.modern, self.resolve_legacy(token)) {
                (Some(modern), legacy) => {
                    candidates.push(modern);
                    if let Ok(Some(legacy)) = legacy {
                        candidates.push(legacy);
                    }
                }
                (None, legacy) => candidates.extend(legacy?),
            }
        } else {
            candidates.extend(self.resolve_legacy(token)?);
            candidates.extend(self.modern.as_ref());
        }

        tracing::debug!(
            target: "auth.resolver",
            candidates = candidates.len(),
            first_family = candidates.first().map(|c| c.family().as_str()),
            "Resolved trust configurations"
        );

        Ok(candidates)
    }

    fn resolve_legacy(
        &self,
        token: &DecodedToken,
    ) -> Result<Option<&TrustConfiguration>, AuthError> {
        let zone = token.claims().zone_id();

        if let Some(zone) = zone {
            if let Some(matching) = self
                .legacy
                .iter()
                .find(|configuration| configuration.zone_id() == Some(zone))
            {
                return Ok(Some(matching));
            }
        }

        match self.legacy.as_slice() {
            [] => Ok(None),
            [only] => Ok(Some(only)),
            bound => {
                let message = match zone {
                    Some(zone) => format!(
                        "Token zone '{}' matches none of the {} bound service instances",
                        zone,
                        bound.len()
                    ),
                    None => format!(
                        "Token has no zone claim to choose between {} bound service instances",
                        bound.len()
                    ),
                };
                tracing::debug!(target: "auth.resolver", %message, "Ambiguous trust configuration");
                Err(AuthError::AmbiguousConfiguration(message))
            }
        }
    }
}
