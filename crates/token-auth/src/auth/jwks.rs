//! Signing-key cache.
//!
//! Fetches JSON Web Key Sets from each issuer's token key endpoint and caches
//! them per key endpoint URL with a TTL. A refresh replaces the whole key set
//! of an endpoint. Endpoints of one issuer domain (legacy and modern paths, or
//! an explicit override) are cached independently.
//!
//! # Concurrency
//!
//! - Warm lookups only take short read locks; no lock is held across I/O.
//! - Concurrent misses for one endpoint share a single in-flight fetch.
//! - The fetch runs in its own task, so a caller that is dropped mid-fetch
//!   does not cancel it; the result still lands in the cache.
//! - Domains are independent of each other.

use crate::auth::trust::KeyEndpoint;
use crate::config::AuthConfig;
use crate::errors::AuthError;
use crate::observability::metrics::{record_jwks_cache, record_jwks_fetch};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::instrument;

/// JSON Web Key as published by a token key endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type: `RSA`, `EC` or `OKP`.
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    /// Key use; `enc` keys are never used for signature verification.
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    #[serde(default)]
    pub crv: Option<String>,

    #[serde(default)]
    pub x: Option<String>,

    #[serde(default)]
    pub y: Option<String>,

    /// PEM-encoded public key, as published by legacy-family issuers.
    #[serde(default)]
    pub value: Option<String>,
}

/// Key set document: `{"keys": [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// Kind of public key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    EcP256,
    EcP384,
    Ed25519,
}

/// A public key usable for signature verification.
#[derive(Clone)]
pub struct SigningKey {
    key_id: String,
    algorithm: Option<Algorithm>,
    key_type: KeyType,
    decoding_key: DecodingKey,
}

impl SigningKey {
    /// Convert a published JWK into a verification key.
    ///
    /// Returns a description of the problem if the JWK lacks a key id, names
    /// an unsupported key type, curve or algorithm, or carries unusable
    /// key material.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, String> {
        let key_id = jwk
            .kid
            .clone()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| "key has no kid".to_string())?;

        let algorithm = jwk
            .alg
            .as_deref()
            .map(|alg| Algorithm::from_str(alg).map_err(|_| format!("unsupported alg '{}'", alg)))
            .transpose()?;

        let (key_type, decoding_key) = match jwk.kty.as_str() {
            "RSA" => {
                let decoding_key = match (&jwk.n, &jwk.e, &jwk.value) {
                    (Some(n), Some(e), _) => DecodingKey::from_rsa_components(n, e),
                    (_, _, Some(pem)) => DecodingKey::from_rsa_pem(pem.as_bytes()),
                    _ => return Err("RSA key has neither n/e nor a PEM value".to_string()),
                }
                .map_err(|e| format!("invalid RSA key material: {}", e))?;
                (KeyType::Rsa, decoding_key)
            }
            "EC" => {
                let key_type = match jwk.crv.as_deref() {
                    Some("P-256") => KeyType::EcP256,
                    Some("P-384") => KeyType::EcP384,
                    other => return Err(format!("unsupported EC curve {:?}", other)),
                };
                let decoding_key = match (&jwk.x, &jwk.y) {
                    (Some(x), Some(y)) => DecodingKey::from_ec_components(x, y)
                        .map_err(|e| format!("invalid EC key material: {}", e))?,
                    _ => return Err("EC key is missing x or y".to_string()),
                };
                (key_type, decoding_key)
            }
            "OKP" => {
                if jwk.crv.as_deref() != Some("Ed25519") {
                    return Err(format!("unsupported OKP curve {:?}", jwk.crv));
                }
                let x = jwk
                    .x
                    .as_deref()
                    .ok_or_else(|| "OKP key is missing x".to_string())?;
                let decoding_key = DecodingKey::from_ed_components(x)
                    .map_err(|e| format!("invalid Ed25519 key material: {}", e))?;
                (KeyType::Ed25519, decoding_key)
            }
            other => return Err(format!("unsupported key type '{}'", other)),
        };

        let key = Self {
            key_id,
            algorithm,
            key_type,
            decoding_key,
        };

        if let Some(alg) = key.algorithm {
            if !key.key_type_supports(alg) {
                return Err(format!("alg {:?} does not fit key type {:?}", alg, key_type));
            }
        }

        Ok(key)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithm the key is restricted to, if the JWK declared one.
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Whether this key may verify a signature made with `alg`.
    pub fn supports(&self, alg: Algorithm) -> bool {
        match self.algorithm {
            Some(declared) => declared == alg,
            None => self.key_type_supports(alg),
        }
    }

    fn key_type_supports(&self, alg: Algorithm) -> bool {
        match self.key_type {
            KeyType::Rsa => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            KeyType::EcP256 => alg == Algorithm::ES256,
            KeyType::EcP384 => alg == Algorithm::ES384,
            KeyType::Ed25519 => alg == Algorithm::EdDSA,
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("key_type", &self.key_type)
            .finish_non_exhaustive()
    }
}

/// Verification keys of one issuer domain, by key id.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
}

impl KeySet {
    /// Build a key set from a fetched document.
    ///
    /// Encryption keys and keys that cannot be converted are skipped with a
    /// warning; one bad key does not invalidate the others.
    pub fn from_response(response: JwksResponse, issuer_domain: &str) -> Self {
        let mut keys = HashMap::new();

        for jwk in response.keys {
            if jwk.key_use.as_deref() == Some("enc") {
                continue;
            }
            match SigningKey::from_jwk(&jwk) {
                Ok(key) => {
                    keys.insert(key.key_id.clone(), Arc::new(key));
                }
                Err(reason) => {
                    tracing::warn!(
                        target: "auth.jwks",
                        issuer_domain = %issuer_domain,
                        kid = ?jwk.kid,
                        reason = %reason,
                        "Skipping unusable key in key set"
                    );
                }
            }
        }

        Self { keys }
    }

    /// Key with id `kid` that supports `alg`.
    pub fn find(&self, kid: &str, alg: Algorithm) -> Option<Arc<SigningKey>> {
        self.keys
            .get(kid)
            .filter(|key| key.supports(alg))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// A fetched key set with its lifetime. Replaced, never mutated.
#[derive(Debug)]
pub struct CacheEntry {
    keys: KeySet,
    fetched_at: Instant,
    ttl: Duration,
    generation: u64,
}

impl CacheEntry {
    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    pub fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.ttl
    }
}

/// Source of key set documents.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self, endpoint: &KeyEndpoint) -> Result<JwksResponse, AuthError>;
}

/// Fetches key sets over HTTP(S).
pub struct HttpKeySetFetcher {
    http_client: reqwest::Client,
}

impl HttpKeySetFetcher {
    pub fn new(timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self { http_client }
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, endpoint: &KeyEndpoint) -> Result<JwksResponse, AuthError> {
        tracing::debug!(target: "auth.jwks", url = %endpoint.url, "Fetching token keys");

        let response = self
            .http_client
            .get(&endpoint.url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "auth.jwks", url = %endpoint.url, error = %e, "Failed to fetch token keys");
                AuthError::KeyRetrievalFailure(format!("request to {} failed: {}", endpoint.url, e))
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "auth.jwks",
                url = %endpoint.url,
                status = %response.status(),
                "Token key endpoint returned error"
            );
            return Err(AuthError::KeyRetrievalFailure(format!(
                "{} returned HTTP {}",
                endpoint.url,
                response.status().as_u16()
            )));
        }

        response.json::<JwksResponse>().await.map_err(|e| {
            tracing::error!(target: "auth.jwks", url = %endpoint.url, error = %e, "Failed to parse token key response");
            AuthError::KeyRetrievalFailure(format!(
                "{} returned an invalid key set: {}",
                endpoint.url, e
            ))
        })
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<CacheEntry>, AuthError>>>;

/// Per-endpoint cache state.
struct EndpointSlot {
    issuer_domain: String,
    current: RwLock<Option<Arc<CacheEntry>>>,
    in_flight: Mutex<Option<SharedFetch>>,
    generation: AtomicU64,
}

impl EndpointSlot {
    fn new(issuer_domain: &str) -> Self {
        Self {
            issuer_domain: issuer_domain.to_string(),
            current: RwLock::new(None),
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    fn current(&self) -> Option<Arc<CacheEntry>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, keys: KeySet, ttl: Duration) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry {
            keys,
            fetched_at: Instant::now(),
            ttl,
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        });
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&entry));
        entry
    }

    fn reset(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Outcome of asking a slot for a refresh.
enum Refresh {
    /// Another caller already replaced the entry the requester saw.
    Done(Arc<CacheEntry>),
    Pending(SharedFetch),
}

/// Clears the in-flight marker when the fetch task ends, however it ends.
struct FetchGuard(Arc<EndpointSlot>);

impl Drop for FetchGuard {
    fn drop(&mut self) {
        *self.0.in_flight.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Signing-key cache shared by all requests.
///
/// Construct once and share via `Arc`.
pub struct JwksCache {
    fetcher: Arc<dyn KeySetFetcher>,
    ttl: Duration,
    fetch_timeout: Duration,
    /// Keyed by endpoint URL.
    endpoints: RwLock<HashMap<String, Arc<EndpointSlot>>>,
}

impl JwksCache {
    pub fn new(fetcher: Arc<dyn KeySetFetcher>, ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            fetch_timeout,
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Cache backed by [`HttpKeySetFetcher`], with TTL and timeout from `config`.
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            Arc::new(HttpKeySetFetcher::new(config.jwks_fetch_timeout)),
            config.jwks_cache_ttl,
            config.jwks_fetch_timeout,
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the key `kid` of the issuer behind `endpoint`, usable with `alg`.
    ///
    /// Serves from cache while the endpoint's key set is fresh. On a miss, an
    /// expired entry, or a fresh entry lacking `kid`, the key set is fetched
    /// once and the lookup retried.
    ///
    /// # Errors
    ///
    /// - `AuthError::KeyRetrievalFailure` if the key set cannot be fetched
    /// - `AuthError::UnknownKey` if the fetched set has no matching key
    #[instrument(skip_all, fields(issuer_domain = %endpoint.issuer_domain, kid = %kid))]
    pub async fn get_key(
        &self,
        endpoint: &KeyEndpoint,
        kid: &str,
        alg: Algorithm,
    ) -> Result<Arc<SigningKey>, AuthError> {
        let slot = self.slot(endpoint);
        let observed = slot.current();

        if let Some(entry) = observed.as_ref().filter(|entry| entry.is_fresh()) {
            if let Some(key) = entry.keys().find(kid, alg) {
                tracing::debug!(target: "auth.jwks", kid = %kid, "Token key cache hit");
                record_jwks_cache("hit");
                return Ok(key);
            }
            tracing::debug!(target: "auth.jwks", kid = %kid, "Key not found in cached key set, forcing refresh");
        }
        record_jwks_cache("miss");

        let observed_generation = observed.map(|entry| entry.generation);
        let entry = match self.begin_refresh(&slot, endpoint, observed_generation) {
            Refresh::Done(entry) => entry,
            Refresh::Pending(fetch) => fetch.await?,
        };

        entry.keys().find(kid, alg).ok_or_else(|| {
            tracing::warn!(
                target: "auth.jwks",
                issuer_domain = %endpoint.issuer_domain,
                kid = %kid,
                "Key not found in key set after refresh"
            );
            AuthError::UnknownKey {
                kid: kid.to_string(),
            }
        })
    }

    /// Drop the cached key sets of every endpoint of `issuer_domain`.
    pub fn invalidate(&self, issuer_domain: &str) {
        let endpoints = self.endpoints.read().unwrap_or_else(PoisonError::into_inner);
        let mut dropped = 0;
        for slot in endpoints
            .values()
            .filter(|slot| slot.issuer_domain == issuer_domain)
        {
            slot.reset();
            dropped += 1;
        }
        if dropped > 0 {
            tracing::info!(
                target: "auth.jwks",
                issuer_domain = %issuer_domain,
                endpoints = dropped,
                "Token key cache invalidated"
            );
        }
    }

    /// Drop all cached key sets.
    pub fn clear(&self) {
        let endpoints = self.endpoints.read().unwrap_or_else(PoisonError::into_inner);
        for slot in endpoints.values() {
            slot.reset();
        }
        tracing::info!(target: "auth.jwks", endpoints = endpoints.len(), "Token key cache cleared");
    }

    /// Currently cached entry of `endpoint`, fresh or not.
    pub fn cached_entry(&self, endpoint: &KeyEndpoint) -> Option<Arc<CacheEntry>> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&endpoint.url)
            .and_then(|slot| slot.current())
    }

    fn slot(&self, endpoint: &KeyEndpoint) -> Arc<EndpointSlot> {
        if let Some(slot) = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&endpoint.url)
        {
            return Arc::clone(slot);
        }

        let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            endpoints
                .entry(endpoint.url.clone())
                .or_insert_with(|| Arc::new(EndpointSlot::new(&endpoint.issuer_domain))),
        )
    }

    /// Join the slot's in-flight fetch, or start one.
    ///
    /// If the entry was replaced since the caller looked (`observed`), the
    /// replacement is returned instead of fetching again.
    fn begin_refresh(
        &self,
        slot: &Arc<EndpointSlot>,
        endpoint: &KeyEndpoint,
        observed: Option<u64>,
    ) -> Refresh {
        let mut in_flight = slot.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(fetch) = in_flight.as_ref() {
            tracing::debug!(target: "auth.jwks", url = %endpoint.url, "Joining in-flight key set fetch");
            return Refresh::Pending(fetch.clone());
        }

        if let Some(entry) = slot.current() {
            if Some(entry.generation) != observed && entry.is_fresh() {
                return Refresh::Done(entry);
            }
        }

        let task = tokio::spawn(fetch_into_slot(
            Arc::clone(slot),
            Arc::clone(&self.fetcher),
            endpoint.clone(),
            self.ttl,
            self.fetch_timeout,
        ));

        let fetch = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(AuthError::UnexpectedInternalFault(format!(
                    "key set fetch task failed: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared();

        *in_flight = Some(fetch.clone());
        Refresh::Pending(fetch)
    }
}

/// Fetch the key set of `endpoint` and store it in `slot`.
async fn fetch_into_slot(
    slot: Arc<EndpointSlot>,
    fetcher: Arc<dyn KeySetFetcher>,
    endpoint: KeyEndpoint,
    ttl: Duration,
    fetch_timeout: Duration,
) -> Result<Arc<CacheEntry>, AuthError> {
    let _guard = FetchGuard(Arc::clone(&slot));
    let start = std::time::Instant::now();

    let response = match tokio::time::timeout(fetch_timeout, fetcher.fetch(&endpoint)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            record_jwks_fetch("error", start.elapsed());
            return Err(e);
        }
        Err(_) => {
            record_jwks_fetch("timeout", start.elapsed());
            tracing::error!(
                target: "auth.jwks",
                url = %endpoint.url,
                timeout_ms = fetch_timeout.as_millis() as u64,
                "Token key fetch timed out"
            );
            return Err(AuthError::KeyRetrievalFailure(format!(
                "request to {} timed out after {}s",
                endpoint.url,
                fetch_timeout.as_secs()
            )));
        }
    };
    record_jwks_fetch("success", start.elapsed());

    let keys = KeySet::from_response(response, &endpoint.issuer_domain);

    tracing::info!(
        target: "auth.jwks",
        issuer_domain = %endpoint.issuer_domain,
        url = %endpoint.url,
        key_count = keys.len(),
        "Token key cache refreshed"
    );

    Ok(slot.store(keys, ttl))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    // Ed25519 public key of the RFC 8032 test vector 1.
    const ED25519_X: &str = "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo";

    /// Serves a fixed key set, counting calls.
    struct CountingFetcher {
        calls: AtomicUsize,
        delay: Duration,
        keys: Mutex<serde_json::Value>,
        fail: Mutex<bool>,
    }

    impl CountingFetcher {
        fn new(keys: serde_json::Value) -> Arc<Self> {
            Self::with_delay(keys, Duration::ZERO)
        }

        fn with_delay(keys: serde_json::Value, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                keys: Mutex::new(keys),
                fail: Mutex::new(false),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn set_failing(&self, fail: bool) {
            *self.fail.lock().unwrap() = fail;
        }

        fn set_keys(&self, keys: serde_json::Value) {
            *self.keys.lock().unwrap() = keys;
        }
    }

    #[async_trait]
    impl KeySetFetcher for CountingFetcher {
        async fn fetch(&self, endpoint: &KeyEndpoint) -> Result<JwksResponse, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if *self.fail.lock().unwrap() {
                return Err(AuthError::KeyRetrievalFailure(format!(
                    "{} unreachable",
                    endpoint.url
                )));
            }
            let keys = self.keys.lock().unwrap().clone();
            Ok(serde_json::from_value(keys).unwrap())
        }
    }

    fn ed_jwk(kid: &str) -> serde_json::Value {
        json!({"kty": "OKP", "crv": "Ed25519", "kid": kid, "x": ED25519_X, "alg": "EdDSA"})
    }

    fn key_set(kids: &[&str]) -> serde_json::Value {
        json!({ "keys": kids.iter().map(|kid| ed_jwk(kid)).collect::<Vec<_>>() })
    }

    fn endpoint(domain: &str) -> KeyEndpoint {
        KeyEndpoint {
            issuer_domain: domain.to_string(),
            url: format!("https://{}/token_keys", domain),
        }
    }

    fn cache(fetcher: Arc<CountingFetcher>, ttl: Duration) -> JwksCache {
        JwksCache::new(fetcher, ttl, Duration::from_secs(5))
    }

    #[test]
    fn test_jwk_deserialization() {
        let json = r#"{
            "kty": "RSA",
            "kid": "key-1",
            "alg": "RS256",
            "use": "sig",
            "n": "AQAB",
            "e": "AQAB",
            "value": "-----BEGIN PUBLIC KEY-----"
        }"#;

        let jwk: Jwk = serde_json::from_str(json).unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid.as_deref(), Some("key-1"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
        assert!(jwk.value.is_some());
        assert!(jwk.crv.is_none());
    }

    #[test]
    fn test_signing_key_supports_declared_alg_only() {
        let jwk: Jwk = serde_json::from_value(ed_jwk("k")).unwrap();
        let key = SigningKey::from_jwk(&jwk).unwrap();

        assert_eq!(key.key_type(), KeyType::Ed25519);
        assert!(key.supports(Algorithm::EdDSA));
        assert!(!key.supports(Algorithm::RS256));
    }

    #[test]
    fn test_rsa_key_without_alg_supports_rsa_family() {
        let jwk: Jwk = serde_json::from_value(json!({
            "kty": "RSA", "kid": "k", "n": "AQAB", "e": "AQAB"
        }))
        .unwrap();
        let key = SigningKey::from_jwk(&jwk).unwrap();

        assert!(key.supports(Algorithm::RS256));
        assert!(key.supports(Algorithm::PS512));
        assert!(!key.supports(Algorithm::ES256));
        assert!(!key.supports(Algorithm::HS256));
    }

    #[test]
    fn test_key_set_skips_unusable_keys() {
        let response: JwksResponse = serde_json::from_value(json!({
            "keys": [
                ed_jwk("good"),
                {"kty": "OKP", "crv": "Ed25519", "x": ED25519_X},
                {"kty": "oct", "kid": "symmetric", "k": "c2VjcmV0"},
                {"kty": "EC", "kid": "no-y", "crv": "P-256", "x": "AQAB"},
                {"kty": "OKP", "crv": "Ed25519", "kid": "enc-key", "x": ED25519_X, "use": "enc"},
                {"kty": "OKP", "crv": "Ed25519", "kid": "mismatched", "x": ED25519_X, "alg": "RS256"}
            ]
        }))
        .unwrap();

        let keys = KeySet::from_response(response, "auth.com");

        assert_eq!(keys.len(), 1);
        assert!(keys.find("good", Algorithm::EdDSA).is_some());
        assert!(keys.find("good", Algorithm::ES256).is_none());
    }

    #[tokio::test]
    async fn test_warm_cache_does_not_refetch() {
        let fetcher = CountingFetcher::new(key_set(&["key-1"]));
        let cache = cache(Arc::clone(&fetcher), Duration::from_secs(600));

        for _ in 0..3 {
            let key = cache
                .get_key(&endpoint("auth.com"), "key-1", Algorithm::EdDSA)
                .await
                .unwrap();
            assert_eq!(key.key_id(), "key-1");
        }

        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let fetcher = CountingFetcher::with_delay(key_set(&["key-1"]), Duration::from_millis(50));
        let cache = cache(Arc::clone(&fetcher), Duration::from_secs(600));
        let endpoint = endpoint("auth.com");

        let lookups = (0..16).map(|_| cache.get_key(&endpoint, "key-1", Algorithm::EdDSA));
        let results = futures::future::join_all(lookups).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_kid_forces_exactly_one_refresh() {
        let fetcher = CountingFetcher::new(key_set(&["key-1"]));
        let cache = cache(Arc::clone(&fetcher), Duration::from_secs(600));
        let endpoint = endpoint("auth.com");

        cache
            .get_key(&endpoint, "key-1", Algorithm::EdDSA)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 1);

        let err = cache
            .get_key(&endpoint, "key-2", Algorithm::EdDSA)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::UnknownKey {
                kid: "key-2".to_string()
            }
        );
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_rotated_key_is_picked_up_by_forced_refresh() {
        let fetcher = CountingFetcher::new(key_set(&["key-1"]));
        let cache = cache(Arc::clone(&fetcher), Duration::from_secs(600));
        let endpoint = endpoint("auth.com");

        cache
            .get_key(&endpoint, "key-1", Algorithm::EdDSA)
            .await
            .unwrap();

        fetcher.set_keys(key_set(&["key-2"]));
        let key = cache
            .get_key(&endpoint, "key-2", Algorithm::EdDSA)
            .await
            .unwrap();
        assert_eq!(key.key_id(), "key-2");

        // Full-set replace: the old key is gone.
        assert!(cache
            .cached_entry(&endpoint)
            .unwrap()
            .keys()
            .find("key-1", Algorithm::EdDSA)
            .is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        tokio::time::pause();
        let fetcher = CountingFetcher::new(key_set(&["key-1"]));
        let cache = cache(Arc::clone(&fetcher), Duration::from_secs(60));
        let endpoint = endpoint("auth.com");

        cache
            .get_key(&endpoint, "key-1", Algorithm::EdDSA)
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        cache
            .get_key(&endpoint, "key-1", Algorithm::EdDSA)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        cache
            .get_key(&endpoint, "key-1", Algorithm::EdDSA)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_and_not_cached() {
        let fetcher = CountingFetcher::new(key_set(&["key-1"]));
        fetcher.set_failing(true);
        let cache = cache(Arc::clone(&fetcher), Duration::from_secs(600));
        let endpoint = endpoint("auth.com");

        let err = cache
            .get_key(&endpoint, "key-1", Algorithm::EdDSA)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::KeyRetrievalFailure(msg) if msg.contains("unreachable")));
        assert!(cache.cached_entry(&endpoint).is_none());

        fetcher.set_failing(false);
        cache
            .get_key(&endpoint, "key-1", Algorithm::EdDSA)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let fetcher = CountingFetcher::with_delay(key_set(&["key-1"]), Duration::from_secs(5));
        let cache = JwksCache::new(
            fetcher,
            Duration::from_secs(600),
            Duration::from_millis(20),
        );

        let err = cache
            .get_key(&endpoint("auth.com"), "key-1", Algorithm::EdDSA)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::KeyRetrievalFailure(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_domains_are_independent() {
        let fetcher = CountingFetcher::new(key_set(&["key-1"]));
        let cache = cache(Arc::clone(&fetcher), Duration::from_secs(600));

        cache
            .get_key(&endpoint("a.auth.com"), "key-1", Algorithm::EdDSA)
            .await
            .unwrap();
        cache
            .get_key(&endpoint("b.auth.com"), "key-1", Algorithm::EdDSA)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 2);

        cache.invalidate("a.auth.com");
        assert!(cache.cached_entry(&endpoint("a.auth.com")).is_none());
        assert!(cache.cached_entry(&endpoint("b.auth.com")).is_some());
    }

    /// Serves a different key set per endpoint URL, counting calls.
    struct PerUrlFetcher {
        calls: AtomicUsize,
        by_url: HashMap<String, serde_json::Value>,
    }

    #[async_trait]
    impl KeySetFetcher for PerUrlFetcher {
        async fn fetch(&self, endpoint: &KeyEndpoint) -> Result<JwksResponse, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let keys = self.by_url.get(&endpoint.url).cloned().ok_or_else(|| {
                AuthError::KeyRetrievalFailure(format!("{} unreachable", endpoint.url))
            })?;
            Ok(serde_json::from_value(keys).unwrap())
        }
    }

    fn legacy_and_modern_endpoints() -> (KeyEndpoint, KeyEndpoint, Arc<PerUrlFetcher>) {
        let legacy = endpoint("auth.com");
        let modern = KeyEndpoint {
            issuer_domain: "auth.com".to_string(),
            url: "https://auth.com/oauth2/certs".to_string(),
        };
        let fetcher = Arc::new(PerUrlFetcher {
            calls: AtomicUsize::new(0),
            by_url: HashMap::from([
                (legacy.url.clone(), key_set(&["legacy-key"])),
                (modern.url.clone(), key_set(&["modern-key"])),
            ]),
        });
        (legacy, modern, fetcher)
    }

    #[tokio::test]
    async fn test_endpoints_of_one_domain_are_cached_separately() {
        let (legacy, modern, fetcher) = legacy_and_modern_endpoints();
        let cache = JwksCache::new(
            Arc::clone(&fetcher) as Arc<dyn KeySetFetcher>,
            Duration::from_secs(600),
            Duration::from_secs(5),
        );

        let (legacy_key, modern_key) = tokio::join!(
            cache.get_key(&legacy, "legacy-key", Algorithm::EdDSA),
            cache.get_key(&modern, "modern-key", Algorithm::EdDSA),
        );
        assert_eq!(legacy_key.unwrap().key_id(), "legacy-key");
        assert_eq!(modern_key.unwrap().key_id(), "modern-key");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);

        for _ in 0..5 {
            cache
                .get_key(&legacy, "legacy-key", Algorithm::EdDSA)
                .await
                .unwrap();
            cache
                .get_key(&modern, "modern-key", Algorithm::EdDSA)
                .await
                .unwrap();
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_drops_every_endpoint_of_domain() {
        let (legacy, modern, fetcher) = legacy_and_modern_endpoints();
        let cache = JwksCache::new(
            fetcher as Arc<dyn KeySetFetcher>,
            Duration::from_secs(600),
            Duration::from_secs(5),
        );

        cache
            .get_key(&legacy, "legacy-key", Algorithm::EdDSA)
            .await
            .unwrap();
        cache
            .get_key(&modern, "modern-key", Algorithm::EdDSA)
            .await
            .unwrap();

        cache.invalidate("auth.com");

        assert!(cache.cached_entry(&legacy).is_none());
        assert!(cache.cached_entry(&modern).is_none());
    }

    #[tokio::test]
    async fn test_clear_drops_all_endpoints() {
        let fetcher = CountingFetcher::new(key_set(&["key-1"]));
        let cache = cache(Arc::clone(&fetcher), Duration::from_secs(600));
        let endpoint = endpoint("auth.com");

        cache
            .get_key(&endpoint, "key-1", Algorithm::EdDSA)
            .await
            .unwrap();
        cache.clear();
        cache
            .get_key(&endpoint, "key-1", Algorithm::EdDSA)
            .await
            .unwrap();

        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_fetch() {
        let fetcher = CountingFetcher::with_delay(key_set(&["key-1"]), Duration::from_millis(50));
        let cache = Arc::new(cache(Arc::clone(&fetcher), Duration::from_secs(600)));

        let caller = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_key(&endpoint("auth.com"), "key-1", Algorithm::EdDSA)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.cached_entry(&endpoint("auth.com")).is_some());
        cache
            .get_key(&endpoint("auth.com"), "key-1", Algorithm::EdDSA)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 1);
    }
}
