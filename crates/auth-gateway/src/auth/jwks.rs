//! JWKS client for fetching and caching the IdP's public signing keys.
//!
//! Keys are fetched from the configured JWKS URL and cached with a TTL.
//!
//! # Key rollover
//!
//! A token signed with a `kid` missing from the cache triggers one refetch.
//! Concurrent misses wait on a single refresh lock so only one request goes
//! to the IdP, and a refetch for an unknown `kid` is rate limited by a
//! minimum refresh interval. Every key the IdP still publishes stays valid,
//! so old and new keys verify side by side during a rotation.
//!
//! Keys published without a `kid` are kept; they are only reachable through
//! [`JwksClient::signing_keys`], for tokens that carry no `kid` either.

use crate::observability::metrics::record_jwks_fetch;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL in seconds (5 minutes).
const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Minimum time between two refetches triggered by an unknown `kid`.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Default HTTP timeout for fetching the key set.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON Web Key from the JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID used to select the key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is intended for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// EC x coordinate, or the OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// Errors from key lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JwksError {
    /// The key set could not be fetched or parsed.
    #[error("Signing key set unavailable")]
    Unavailable,

    /// No published signing key has the requested ID.
    #[error("Unknown signing key")]
    UnknownKey,
}

struct CachedJwks {
    keys: Vec<Jwk>,
    fetched_at: Instant,
}

impl CachedJwks {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }

    fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid.as_deref() == Some(kid))
    }
}

/// JWKS client for fetching and caching public keys.
///
/// Shared by the access- and refresh-token validators.
pub struct JwksClient {
    jwks_url: String,
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedJwks>>,
    refresh_lock: Mutex<()>,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
}

impl JwksClient {
    /// Create a new JWKS client with the default TTL and timeout.
    pub fn new(jwks_url: String) -> Self {
        Self::with_settings(
            jwks_url,
            Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            DEFAULT_TIMEOUT,
        )
    }

    /// Create a new JWKS client with custom cache TTL and HTTP timeout.
    pub fn with_settings(jwks_url: String, cache_ttl: Duration, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gw.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            cache_ttl,
            min_refresh_interval: MIN_REFRESH_INTERVAL,
        }
    }

    /// Override the minimum interval between unknown-`kid` refetches.
    #[must_use]
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Get a signing key by key ID.
    ///
    /// Serves from cache while it is fresh. A stale or empty cache, or an
    /// unknown `kid` outside the minimum refresh interval, triggers one
    /// refetch shared by all concurrent callers.
    ///
    /// # Errors
    ///
    /// - `JwksError::Unavailable` if the key set cannot be fetched
    /// - `JwksError::UnknownKey` if no published key has this ID
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, JwksError> {
        let observed = {
            let cache = self.cache.read().await;
            match cache.as_ref() {
                Some(cached) if cached.is_fresh(self.cache_ttl) => {
                    if let Some(key) = cached.find(kid) {
                        tracing::debug!(target: "gw.auth.jwks", "JWKS cache hit");
                        return Ok(key.clone());
                    }
                    if cached.fetched_at.elapsed() < self.min_refresh_interval {
                        tracing::debug!(target: "gw.auth.jwks", "Unknown kid, key set fetched too recently to refetch");
                        return Err(JwksError::UnknownKey);
                    }
                    Some(cached.fetched_at)
                }
                Some(cached) => Some(cached.fetched_at),
                None => None,
            }
        };

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if Some(cached.fetched_at) != observed {
                    return cached.find(kid).cloned().ok_or_else(|| {
                        tracing::debug!(target: "gw.auth.jwks", "Key not found in concurrently refreshed JWKS");
                        JwksError::UnknownKey
                    });
                }
            }
        }

        self.refresh_cache().await?;

        let cache = self.cache.read().await;
        cache
            .as_ref()
            .and_then(|cached| cached.find(kid))
            .cloned()
            .ok_or_else(|| {
                tracing::warn!(target: "gw.auth.jwks", "Key not found in JWKS after refresh");
                JwksError::UnknownKey
            })
    }

    /// Every published signing key, with or without a `kid`.
    ///
    /// Serves from cache while it is fresh; otherwise refetches once,
    /// shared by all concurrent callers.
    ///
    /// # Errors
    ///
    /// `JwksError::Unavailable` if the key set cannot be fetched.
    pub async fn signing_keys(&self) -> Result<Vec<Jwk>, JwksError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(self.cache_ttl)) {
                return Ok(cached.keys.clone());
            }
        }

        let _guard = self.refresh_lock.lock().await;

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh(self.cache_ttl)) {
                return Ok(cached.keys.clone());
            }
        }

        self.refresh_cache().await?;

        let cache = self.cache.read().await;
        Ok(cache.as_ref().map(|cached| cached.keys.clone()).unwrap_or_default())
    }

    /// Make sure a fresh key set is cached; returns the number of keys.
    ///
    /// Used by the readiness probe.
    pub async fn ensure_loaded(&self) -> Result<usize, JwksError> {
        Ok(self.signing_keys().await?.len())
    }

    /// Fetch the key set and replace the cache.
    #[instrument(skip(self))]
    async fn refresh_cache(&self) -> Result<(), JwksError> {
        tracing::debug!(target: "gw.auth.jwks", url = %self.jwks_url, "Fetching JWKS");
        let start = Instant::now();

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "gw.auth.jwks", error = %e, "Failed to fetch JWKS");
                record_jwks_fetch("error", start.elapsed());
                JwksError::Unavailable
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "gw.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            record_jwks_fetch("error", start.elapsed());
            return Err(JwksError::Unavailable);
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "gw.auth.jwks", error = %e, "Failed to parse JWKS response");
            record_jwks_fetch("error", start.elapsed());
            JwksError::Unavailable
        })?;

        // Only keys usable for signature verification
        let keys: Vec<Jwk> = jwks
            .keys
            .into_iter()
            .filter(|key| key.key_use.as_deref().map_or(true, |u| u == "sig"))
            .collect();

        tracing::info!(
            target: "gw.auth.jwks",
            key_count = keys.len(),
            "JWKS cache refreshed"
        );
        record_jwks_fetch("success", start.elapsed());

        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }
}
