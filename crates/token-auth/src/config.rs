//! Token authentication configuration.
//!
//! Tuning knobs are loaded from environment variables. Trust configurations
//! are normally handed over by the service-binding loader; they can also be
//! supplied as a JSON array in `AUTH_TRUST_CONFIGURATIONS`.

use crate::auth::trust::{TrustConfiguration, TrustSettings};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default JWKS cache TTL in seconds (10 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 600;

/// Default timeout for a single JWKS fetch in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 5;

/// Upper bound for the JWKS fetch timeout in seconds.
pub const MAX_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Default clock skew leeway for `exp`/`nbf` in seconds.
pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 0;

/// Upper bound for the clock skew leeway in seconds (10 minutes).
pub const MAX_CLOCK_SKEW_SECONDS: i64 = 600;

/// Token authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// How long a fetched key set stays valid.
    pub jwks_cache_ttl: Duration,

    /// Upper bound for a single key set fetch.
    pub jwks_fetch_timeout: Duration,

    /// Leeway applied to `exp` and `nbf` checks.
    pub clock_skew_seconds: i64,

    /// Bound service instances. May be empty; every request is then rejected.
    pub trust_configurations: Vec<TrustConfiguration>,
}

/// Custom Debug implementation that omits client ids.
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let domains: Vec<&str> = self
            .trust_configurations
            .iter()
            .map(TrustConfiguration::issuer_domain)
            .collect();
        f.debug_struct("AuthConfig")
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("jwks_fetch_timeout", &self.jwks_fetch_timeout)
            .field("clock_skew_seconds", &self.clock_skew_seconds)
            .field("trust_domains", &domains)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_cache_ttl: Duration::from_secs(DEFAULT_JWKS_CACHE_TTL_SECONDS),
            jwks_fetch_timeout: Duration::from_secs(DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS),
            clock_skew_seconds: DEFAULT_CLOCK_SKEW_SECONDS,
            trust_configurations: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JWKS cache TTL configuration: {0}")]
    InvalidCacheTtl(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidFetchTimeout(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidClockSkew(String),

    #[error("Invalid trust configuration: {0}")]
    InvalidTrustConfiguration(String),

    #[error("At most one modern-family service instance may be bound")]
    MultipleModernConfigurations,

    #[error("More than one legacy service instance is bound to zone '{0}'")]
    DuplicateZone(String),
}

impl AuthConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwks_cache_ttl_seconds = if let Some(value_str) = vars.get("JWKS_CACHE_TTL_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidCacheTtl(format!(
                    "JWKS_CACHE_TTL_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidCacheTtl(
                    "JWKS_CACHE_TTL_SECONDS must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_JWKS_CACHE_TTL_SECONDS
        };

        let jwks_fetch_timeout_seconds =
            if let Some(value_str) = vars.get("JWKS_FETCH_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidFetchTimeout(format!(
                        "JWKS_FETCH_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 || value > MAX_JWKS_FETCH_TIMEOUT_SECONDS {
                    return Err(ConfigError::InvalidFetchTimeout(format!(
                        "JWKS_FETCH_TIMEOUT_SECONDS must be between 1 and {}, got {}",
                        MAX_JWKS_FETCH_TIMEOUT_SECONDS, value
                    )));
                }

                value
            } else {
                DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS
            };

        let clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value < 0 {
                return Err(ConfigError::InvalidClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not be negative, got {}",
                    value
                )));
            }

            if value > MAX_CLOCK_SKEW_SECONDS {
                return Err(ConfigError::InvalidClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW_SECONDS, value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW_SECONDS
        };

        let trust_configurations = match vars.get("AUTH_TRUST_CONFIGURATIONS") {
            Some(json) => parse_trust_configurations(json)?,
            None => Vec::new(),
        };

        let config = Self {
            jwks_cache_ttl: Duration::from_secs(jwks_cache_ttl_seconds),
            jwks_fetch_timeout: Duration::from_secs(jwks_fetch_timeout_seconds),
            clock_skew_seconds,
            trust_configurations,
        };

        tracing::debug!(target: "auth.config", config = ?config, "Loaded authentication configuration");

        Ok(config)
    }
}

fn parse_trust_configurations(json: &str) -> Result<Vec<TrustConfiguration>, ConfigError> {
    let settings: Vec<TrustSettings> = serde_json::from_str(json).map_err(|e| {
        ConfigError::InvalidTrustConfiguration(format!(
            "AUTH_TRUST_CONFIGURATIONS must be a JSON array of trust settings: {}",
            e
        ))
    })?;

    settings
        .into_iter()
        .map(TrustConfiguration::try_from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::trust::ServiceFamily;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config.jwks_cache_ttl, Duration::from_secs(600));
        assert_eq!(config.jwks_fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.clock_skew_seconds, 0);
        assert!(config.trust_configurations.is_empty());
    }

    #[test]
    fn test_custom_values() {
        let config = AuthConfig::from_vars(&vars(&[
            ("JWKS_CACHE_TTL_SECONDS", "60"),
            ("JWKS_FETCH_TIMEOUT_SECONDS", "2"),
            ("JWT_CLOCK_SKEW_SECONDS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.jwks_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.jwks_fetch_timeout, Duration::from_secs(2));
        assert_eq!(config.clock_skew_seconds, 30);
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let result = AuthConfig::from_vars(&vars(&[("JWKS_CACHE_TTL_SECONDS", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidCacheTtl(_))));
    }

    #[test]
    fn test_rejects_non_numeric_ttl() {
        let result = AuthConfig::from_vars(&vars(&[("JWKS_CACHE_TTL_SECONDS", "ten")]));
        assert!(matches!(result, Err(ConfigError::InvalidCacheTtl(msg)) if msg.contains("ten")));
    }

    #[test]
    fn test_rejects_out_of_range_timeout() {
        for value in ["0", "61"] {
            let result = AuthConfig::from_vars(&vars(&[("JWKS_FETCH_TIMEOUT_SECONDS", value)]));
            assert!(matches!(result, Err(ConfigError::InvalidFetchTimeout(_))));
        }
    }

    #[test]
    fn test_clock_skew_bounds() {
        let result = AuthConfig::from_vars(&vars(&[("JWT_CLOCK_SKEW_SECONDS", "-1")]));
        assert!(matches!(result, Err(ConfigError::InvalidClockSkew(_))));

        let result = AuthConfig::from_vars(&vars(&[("JWT_CLOCK_SKEW_SECONDS", "601")]));
        assert!(matches!(result, Err(ConfigError::InvalidClockSkew(msg)) if msg.contains("600")));

        let config = AuthConfig::from_vars(&vars(&[("JWT_CLOCK_SKEW_SECONDS", "600")])).unwrap();
        assert_eq!(config.clock_skew_seconds, 600);
    }

    #[test]
    fn test_trust_configurations_from_json() {
        let json = r#"[
            {"family": "legacy", "client_id": "clientId", "issuer_domain": "auth.com", "application_id": "appId"},
            {"family": "modern", "client_id": "ias-client", "issuer_domain": "ias.example.com"}
        ]"#;

        let config = AuthConfig::from_vars(&vars(&[("AUTH_TRUST_CONFIGURATIONS", json)])).unwrap();

        assert_eq!(config.trust_configurations.len(), 2);
        let legacy = config.trust_configurations.first().unwrap();
        assert_eq!(legacy.family(), ServiceFamily::Legacy);
        assert_eq!(legacy.application_id(), Some("appId"));
    }

    #[test]
    fn test_trust_configurations_invalid_json() {
        let result = AuthConfig::from_vars(&vars(&[("AUTH_TRUST_CONFIGURATIONS", "{")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidTrustConfiguration(_))
        ));
    }

    #[test]
    fn test_debug_omits_client_ids() {
        let json = r#"[{"family": "legacy", "client_id": "sb-secret-client", "issuer_domain": "auth.com"}]"#;
        let config = AuthConfig::from_vars(&vars(&[("AUTH_TRUST_CONFIGURATIONS", json)])).unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("sb-secret-client"));
        assert!(debug.contains("auth.com"));
    }
}
