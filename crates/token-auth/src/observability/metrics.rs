//! Metrics definitions for token authentication.
//!
//! All metrics follow Prometheus naming conventions:
//! - `auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: 2 values (success, error) or 3 for fetches (success, error, timeout)
//! - `error_type`: bounded by `AuthError` variants
//! - `result`: 2 values (hit, miss)
//!
//! Issuer domains and key ids are never used as labels.

use metrics::{counter, histogram};
use std::time::Duration;

/// Record the outcome of one token validation
///
/// Metric: `auth_token_validations_total`, `auth_token_validation_duration_seconds`
/// Labels: `status`, `error_type`
pub fn record_token_validation(status: &str, error_type: Option<&str>, duration: Duration) {
    histogram!("auth_token_validation_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("auth_token_validations_total",
        "status" => status.to_string(),
        "error_type" => error_type.unwrap_or("none").to_string()
    )
    .increment(1);
}

/// Record one key set fetch
///
/// Metric: `auth_jwks_fetch_total`, `auth_jwks_fetch_duration_seconds`
/// Labels: `status`
pub fn record_jwks_fetch(status: &str, duration: Duration) {
    histogram!("auth_jwks_fetch_duration_seconds").record(duration.as_secs_f64());

    counter!("auth_jwks_fetch_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a key lookup against the cache
///
/// Metric: `auth_jwks_cache_total`
/// Labels: `result` (hit, miss)
pub fn record_jwks_cache(result: &str) {
    counter!("auth_jwks_cache_total",
        "result" => result.to_string()
    )
    .increment(1);
}
