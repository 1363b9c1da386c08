//! JWT claims of a parsed token.
//!
//! Claims are kept as the raw JSON object so issuer-specific claims stay
//! reachable. Accessors cover the standard claims and the tenant claims of
//! both issuer families. User identifiers are redacted in Debug output.

use crate::auth::trust::ServiceFamily;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Claims that only modern-family (identity provider) tokens carry.
pub const MODERN_FAMILY_CLAIMS: [&str; 3] = ["ias_iss", "app_tid", "zone_uuid"];

/// Claims whose values are redacted in Debug output.
const REDACTED_CLAIMS: [&str; 6] = ["sub", "user_name", "user_id", "email", "given_name", "family_name"];

/// Token payload.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String claim, `None` if absent or not a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// NumericDate claim in epoch seconds. Fractional values are truncated.
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_timestamp(&self, name: &str) -> Option<i64> {
        let value = self.0.get(name)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|seconds| seconds as i64))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn expiration(&self) -> Option<i64> {
        self.get_timestamp("exp")
    }

    pub fn not_before(&self) -> Option<i64> {
        self.get_timestamp("nbf")
    }

    pub fn issued_at(&self) -> Option<i64> {
        self.get_timestamp("iat")
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get_str("iss")
    }

    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    /// Client the token was issued to: `cid`, falling back to `azp`.
    pub fn client_id(&self) -> Option<&str> {
        self.get_str("cid").or_else(|| self.get_str("azp"))
    }

    /// Audiences; `aud` may be a single string or a list.
    pub fn audiences(&self) -> Vec<&str> {
        match self.0.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Legacy-family zone claim.
    pub fn zone_id(&self) -> Option<&str> {
        self.get_str("zid")
    }

    /// Tenant binding claim for the given family.
    ///
    /// Legacy tokens bind via `zid`; modern tokens via `app_tid`, falling back
    /// to `zone_uuid`.
    pub fn tenant_id(&self, family: ServiceFamily) -> Option<&str> {
        match family {
            ServiceFamily::Legacy => self.zone_id(),
            ServiceFamily::Modern => self
                .get_str("app_tid")
                .or_else(|| self.get_str("zone_uuid")),
        }
    }

    /// Whether the token looks like it was issued by the modern family.
    ///
    /// True when a modern-only claim is present or the legacy `zid` is absent.
    pub fn indicates_modern_family(&self) -> bool {
        MODERN_FAMILY_CLAIMS.iter().any(|claim| self.contains(claim)) || !self.contains("zid")
    }

    /// Space-separated `scope` or list-valued `scope`.
    pub fn scopes(&self) -> Vec<&str> {
        match self.0.get("scope") {
            Some(Value::String(scope)) => scope.split_whitespace().collect(),
            Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(&scope)
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.0 {
            if REDACTED_CLAIMS.contains(&name.as_str()) {
                map.entry(name, &"[REDACTED]");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}
