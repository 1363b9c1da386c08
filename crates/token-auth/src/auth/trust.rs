//! Trust anchors: the bound service instances tokens are validated against.

use crate::config::ConfigError;
use serde::Deserialize;
use std::fmt;
use url::Url;

/// Issuer family of a bound service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceFamily {
    /// Authorization-server family; zone-bound, possibly many instances.
    Legacy,
    /// Identity-provider family; at most one instance.
    Modern,
}

impl ServiceFamily {
    /// Path of the key set endpoint relative to the issuer domain.
    pub fn jwks_path(self) -> &'static str {
        match self {
            ServiceFamily::Legacy => "/token_keys",
            ServiceFamily::Modern => "/oauth2/certs",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceFamily::Legacy => "legacy",
            ServiceFamily::Modern => "modern",
        }
    }
}

impl fmt::Display for ServiceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unvalidated settings of one service instance, as handed over by the
/// binding loader.
#[derive(Debug, Clone, Deserialize)]
pub struct TrustSettings {
    pub family: ServiceFamily,
    pub client_id: String,
    pub issuer_domain: String,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub zone_id: Option<String>,
    /// Explicit key set endpoint; derived from the issuer domain if absent.
    #[serde(default)]
    pub jwks_url: Option<String>,
}

/// Where the signing keys of an issuer are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEndpoint {
    /// Domain the endpoint belongs to; `JwksCache::invalidate` drops by it.
    pub issuer_domain: String,
    /// Cache key: key sets are cached per URL.
    pub url: String,
}

/// Validated, immutable configuration of one bound service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustConfiguration {
    family: ServiceFamily,
    client_id: String,
    issuer_domain: String,
    application_id: Option<String>,
    zone_id: Option<String>,
    key_endpoint: KeyEndpoint,
}

impl TrustConfiguration {
    pub fn family(&self) -> ServiceFamily {
        self.family
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn issuer_domain(&self) -> &str {
        &self.issuer_domain
    }

    pub fn application_id(&self) -> Option<&str> {
        self.application_id.as_deref()
    }

    pub fn zone_id(&self) -> Option<&str> {
        self.zone_id.as_deref()
    }

    pub fn key_endpoint(&self) -> &KeyEndpoint {
        &self.key_endpoint
    }
}

impl TryFrom<TrustSettings> for TrustConfiguration {
    type Error = ConfigError;

    fn try_from(settings: TrustSettings) -> Result<Self, Self::Error> {
        let client_id = settings.client_id.trim().to_string();
        if client_id.is_empty() {
            return Err(ConfigError::InvalidTrustConfiguration(
                "client_id must not be empty".to_string(),
            ));
        }

        let issuer_domain = settings.issuer_domain.trim().to_ascii_lowercase();
        if issuer_domain.is_empty() {
            return Err(ConfigError::InvalidTrustConfiguration(
                "issuer_domain must not be empty".to_string(),
            ));
        }
        if issuer_domain.contains("://") || issuer_domain.contains('/') {
            return Err(ConfigError::InvalidTrustConfiguration(format!(
                "issuer_domain must be a bare domain, got '{}'",
                issuer_domain
            )));
        }

        let url = match settings.jwks_url {
            Some(jwks_url) => {
                let parsed = Url::parse(&jwks_url).map_err(|e| {
                    ConfigError::InvalidTrustConfiguration(format!(
                        "jwks_url '{}' is not a valid URL: {}",
                        jwks_url, e
                    ))
                })?;
                if !matches!(parsed.scheme(), "https" | "http") {
                    return Err(ConfigError::InvalidTrustConfiguration(format!(
                        "jwks_url must use http or https, got '{}'",
                        parsed.scheme()
                    )));
                }
                jwks_url
            }
            None => format!("https://{}{}", issuer_domain, settings.family.jwks_path()),
        };

        let non_empty = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            family: settings.family,
            client_id,
            key_endpoint: KeyEndpoint {
                issuer_domain: issuer_domain.clone(),
                url,
            },
            issuer_domain,
            application_id: non_empty(settings.application_id),
            zone_id: non_empty(settings.zone_id),
        })
    }
}
