//! Self-refreshing cache of token verification keys.
//!
//! Keys are fetched from a JWKS endpoint and merged additively: a key id that
//! is already cached is never replaced or removed. Two intervals govern
//! refreshes:
//!
//! - `max_refresh_interval` (throttle): a refresh within this long of the last
//!   successful one is a no-op. This protects the publisher from callers that
//!   present unknown key ids.
//! - `min_refresh_interval` (staleness): once the cache is older than this, a
//!   lookup refreshes even when the key is present.
//!
//! Refreshes are single-flight per instance. A caller that waited on an
//! in-flight refresh reuses its result instead of fetching again.

use crate::config::{
    DEFAULT_JWKS_FETCH_TIMEOUT_MS, DEFAULT_JWKS_MAX_REFRESH_INTERVAL_SECONDS,
    DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS, DEFAULT_JWKS_URL,
};
use crate::errors::KeyCacheError;
use crate::observability::metrics;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::instrument;

/// Key cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCacheConfig {
    /// JWKS endpoint.
    pub jwks_url: String,

    /// Timeout for one fetch of the key set.
    pub fetch_timeout: Duration,

    /// Throttle: minimum time between two successful fetches.
    pub max_refresh_interval: Duration,

    /// Staleness: age after which a lookup refreshes regardless of outcome.
    pub min_refresh_interval: Duration,
}

impl Default for KeyCacheConfig {
    fn default() -> Self {
        Self {
            jwks_url: DEFAULT_JWKS_URL.to_string(),
            fetch_timeout: Duration::from_millis(DEFAULT_JWKS_FETCH_TIMEOUT_MS),
            max_refresh_interval: Duration::from_secs(DEFAULT_JWKS_MAX_REFRESH_INTERVAL_SECONDS),
            min_refresh_interval: Duration::from_secs(DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS),
        }
    }
}

/// JSON Web Key as published by the directory's key endpoint.
///
/// Only RSA signing keys carrying `n`/`e` are usable; other entries are
/// skipped during a merge.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Key type ("RSA").
    pub kty: String,

    /// Key use ("sig" when present).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Certificate chain; kept for diagnostics only.
    #[serde(default)]
    pub x5c: Vec<String>,

    /// Issuer the key is published for.
    #[serde(default)]
    pub issuer: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// A cached verification key. Immutable once cached.
pub struct VerificationKey {
    key_id: String,
    material: DecodingKey,
    source: Option<String>,
}

impl VerificationKey {
    /// Build a key from RSA modulus and exponent (base64url, as in a JWK).
    ///
    /// # Errors
    ///
    /// `KeyParse` when the components are not valid base64url.
    pub fn from_rsa_components(
        key_id: impl Into<String>,
        n: &str,
        e: &str,
        source: Option<String>,
    ) -> Result<Self, KeyCacheError> {
        let material = DecodingKey::from_rsa_components(n, e)
            .map_err(|err| KeyCacheError::KeyParse(err.to_string()))?;
        Ok(Self {
            key_id: key_id.into(),
            material,
            source,
        })
    }

    fn from_jwk(jwk: &Jwk) -> Result<Self, KeyCacheError> {
        if jwk.kty != "RSA" {
            return Err(KeyCacheError::KeyParse(format!(
                "unsupported key type '{}'",
                jwk.kty
            )));
        }
        if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err(KeyCacheError::KeyParse("key is not a signing key".to_string()));
        }
        let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
            return Err(KeyCacheError::KeyParse(
                "RSA key is missing modulus or exponent".to_string(),
            ));
        };
        Self::from_rsa_components(jwk.kid.clone(), n, e, jwk.issuer.clone())
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn material(&self) -> &DecodingKey {
        &self.material
    }

    /// Issuer the key was published for, if the publisher said.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("key_id", &self.key_id)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// What a refresh call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The key set was fetched; `added` keys were new.
    Fetched { added: usize },
    /// Within the throttle interval; nothing fetched.
    Throttled,
    /// Another caller refreshed while this one waited; its result was reused.
    Joined,
}

struct KeySet {
    keys: HashMap<String, Arc<VerificationKey>>,
    last_refreshed_at: Option<Instant>,
}

/// Held for the duration of a fetch; remembers how the last one ended.
struct RefreshGate {
    last_error: Option<KeyCacheError>,
}

/// Verification key cache backed by a JWKS endpoint.
///
/// Thread-safe; share it behind an `Arc`.
pub struct KeyCache {
    config: KeyCacheConfig,
    http_client: reqwest::Client,
    state: RwLock<KeySet>,
    gate: Mutex<RefreshGate>,
    /// Completed fetches; a waiter that sees this move while queued joins
    /// the finished refresh.
    completed_fetches: AtomicU64,
}

impl KeyCache {
    /// Create an empty cache. Nothing is fetched until the first lookup or
    /// an explicit [`KeyCache::refresh`].
    pub fn new(config: KeyCacheConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "admin_check.key_cache", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            config,
            http_client,
            state: RwLock::new(KeySet {
                keys: HashMap::new(),
                last_refreshed_at: None,
            }),
            gate: Mutex::new(RefreshGate { last_error: None }),
            completed_fetches: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &KeyCacheConfig {
        &self.config
    }

    /// Look up a key by id.
    ///
    /// A miss refreshes once (subject to the throttle) before reporting
    /// `None`; a hit on a stale cache refreshes once and still returns the
    /// cached key. Refresh errors are logged and never returned from here.
    #[instrument(skip_all, fields(kid = %key_id))]
    pub async fn lookup(&self, key_id: &str) -> Option<Arc<VerificationKey>> {
        let (cached, stale) = {
            let state = self.state.read().await;
            (
                state.keys.get(key_id).cloned(),
                self.is_stale(state.last_refreshed_at),
            )
        };

        if let Some(key) = cached {
            if stale {
                tracing::debug!(target: "admin_check.key_cache", kid = %key_id, "Key cache is stale, refreshing on hit");
                self.refresh_swallowing_errors().await;
            }
            metrics::record_key_lookup("hit");
            return Some(key);
        }

        tracing::debug!(target: "admin_check.key_cache", kid = %key_id, stale, "Key not cached, refreshing");
        self.refresh_swallowing_errors().await;

        let key = self.state.read().await.keys.get(key_id).cloned();
        if key.is_some() {
            metrics::record_key_lookup("hit");
        } else {
            tracing::warn!(target: "admin_check.key_cache", kid = %key_id, "Key not found after refresh");
            metrics::record_key_lookup("miss");
        }
        key
    }

    /// Fetch the key set and merge new keys.
    ///
    /// # Errors
    ///
    /// `KeyFetch` on transport failure or timeout, `KeyPublisher` on a
    /// non-success status, `KeyParse` on an undecodable document. The cache
    /// is unchanged on error.
    pub async fn refresh(&self) -> Result<(), KeyCacheError> {
        self.refresh_with_outcome().await.map(|_| ())
    }

    /// [`KeyCache::refresh`], reporting whether a fetch happened.
    #[instrument(skip_all)]
    pub async fn refresh_with_outcome(&self) -> Result<RefreshOutcome, KeyCacheError> {
        let seen = self.completed_fetches.load(Ordering::SeqCst);
        let mut gate = self.gate.lock().await;

        if self.completed_fetches.load(Ordering::SeqCst) != seen {
            tracing::debug!(target: "admin_check.key_cache", "Joined a concurrent key refresh");
            return match &gate.last_error {
                Some(err) => Err(err.clone()),
                None => Ok(RefreshOutcome::Joined),
            };
        }

        // Re-evaluated under the gate so queued callers see the latest timestamp
        let last_refreshed_at = self.state.read().await.last_refreshed_at;
        if let Some(at) = last_refreshed_at {
            if at.elapsed() < self.config.max_refresh_interval {
                tracing::debug!(target: "admin_check.key_cache", "Key refresh throttled");
                metrics::record_key_refresh("throttled");
                return Ok(RefreshOutcome::Throttled);
            }
        }

        let result = self.fetch_and_merge().await;
        gate.last_error = result.as_ref().err().cloned();
        self.completed_fetches.fetch_add(1, Ordering::SeqCst);

        match &result {
            Ok(_) => metrics::record_key_refresh("success"),
            Err(_) => metrics::record_key_refresh("error"),
        }

        result.map(|added| RefreshOutcome::Fetched { added })
    }

    /// Number of cached keys.
    pub async fn len(&self) -> usize {
        self.state.read().await.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Time since the last successful fetch, `None` if never fetched.
    pub async fn age(&self) -> Option<Duration> {
        self.state
            .read()
            .await
            .last_refreshed_at
            .map(|at| at.elapsed())
    }

    fn is_stale(&self, last_refreshed_at: Option<Instant>) -> bool {
        match last_refreshed_at {
            Some(at) => at.elapsed() >= self.config.min_refresh_interval,
            None => true,
        }
    }

    async fn refresh_swallowing_errors(&self) {
        if let Err(e) = self.refresh_with_outcome().await {
            tracing::warn!(
                target: "admin_check.key_cache",
                error = %e,
                error_kind = e.kind(),
                "Key refresh failed during lookup"
            );
        }
    }

    async fn fetch_and_merge(&self) -> Result<usize, KeyCacheError> {
        tracing::debug!(target: "admin_check.key_cache", url = %self.config.jwks_url, "Fetching key set");

        let response = self
            .http_client
            .get(&self.config.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "admin_check.key_cache", error = %e, "Failed to fetch key set");
                KeyCacheError::KeyFetch(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "admin_check.key_cache",
                status = %status,
                "Key publisher returned error"
            );
            return Err(KeyCacheError::KeyPublisher {
                status: status.as_u16(),
            });
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "admin_check.key_cache", error = %e, "Failed to parse key set");
            if e.is_decode() {
                KeyCacheError::KeyParse(e.to_string())
            } else {
                KeyCacheError::KeyFetch(e.to_string())
            }
        })?;

        Ok(self.merge(jwks).await)
    }

    /// Add keys whose id is not cached yet; existing entries are untouched.
    async fn merge(&self, jwks: JwksResponse) -> usize {
        let mut state = self.state.write().await;
        let published = jwks.keys.len();
        let mut added = 0;

        for jwk in &jwks.keys {
            if jwk.kid.is_empty() || state.keys.contains_key(&jwk.kid) {
                continue;
            }
            match VerificationKey::from_jwk(jwk) {
                Ok(key) => {
                    state.keys.insert(jwk.kid.clone(), Arc::new(key));
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        target: "admin_check.key_cache",
                        kid = %jwk.kid,
                        error = %e,
                        "Skipping unusable published key"
                    );
                }
            }
        }
        state.last_refreshed_at = Some(Instant::now());

        tracing::info!(
            target: "admin_check.key_cache",
            published,
            added,
            cached = state.keys.len(),
            "Key cache refreshed"
        );

        added
    }
}
