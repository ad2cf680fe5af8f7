//! Remote JWKS with a per-kid cache and a fetch budget
//!
//! - Cached keys are served for [`JWKS_CACHE_TTL`] without touching the network
//! - At most [`JWKS_CACHE_SIZE`] keys are held
//! - On a miss the endpoint is fetched at most [`JWKS_FETCHES_PER_MINUTE`] times
//!   per rolling minute; beyond that the lookup fails with
//!   [`KeyNotFoundError::RateLimited`]
//!
//! The state lock is never held across the network call. Cache hits for other key
//! ids are served while a miss is being fetched; concurrent misses each fetch and
//! the last write wins. Only RSA keys not marked `use=enc` are considered.

use crate::clock::Clock;
use crate::error::KeyNotFoundError;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, PublicKeyUse};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// How long a fetched key is trusted
pub const JWKS_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Maximum number of cached keys
pub const JWKS_CACHE_SIZE: usize = 10;

/// Fetch budget per rolling minute
pub const JWKS_FETCHES_PER_MINUTE: usize = 10;

const FETCH_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedKey {
    jwk: Jwk,
    cached_at: SystemTime,
}

impl CachedKey {
    fn is_valid(&self, now: SystemTime, ttl: Duration) -> bool {
        match now.duration_since(self.cached_at) {
            Ok(age) => age < ttl,
            Err(_) => false,
        }
    }
}

/// Sliding window of fetch timestamps
#[derive(Debug)]
struct FetchBudget {
    limit: usize,
    window: Duration,
    timestamps: Vec<SystemTime>,
}

impl FetchBudget {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            timestamps: Vec::with_capacity(limit),
        }
    }

    /// Record a fetch if the window has room
    fn try_acquire(&mut self, now: SystemTime) -> bool {
        let window = self.window;
        self.timestamps.retain(|&t| match now.duration_since(t) {
            Ok(age) => age < window,
            // Clock went backwards; keep the entry
            Err(_) => true,
        });

        if self.timestamps.len() >= self.limit {
            return false;
        }

        self.timestamps.push(now);
        true
    }
}

#[derive(Debug)]
struct JwksState {
    keys: HashMap<String, CachedKey>,
    budget: FetchBudget,
}

/// Verification keys of one issuer
#[derive(Debug, Clone)]
pub struct RemoteJwks {
    jwks_uri: String,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    capacity: usize,
    state: Arc<Mutex<JwksState>>,
}

impl RemoteJwks {
    /// Create a key source for `jwks_uri` with the default cache and fetch limits
    pub fn new(jwks_uri: impl Into<String>, client: reqwest::Client, clock: Arc<dyn Clock>) -> Self {
        Self::with_limits(
            jwks_uri,
            client,
            clock,
            JWKS_CACHE_TTL,
            JWKS_CACHE_SIZE,
            JWKS_FETCHES_PER_MINUTE,
        )
    }

    /// Create a key source with custom limits
    pub fn with_limits(
        jwks_uri: impl Into<String>,
        client: reqwest::Client,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        capacity: usize,
        fetches_per_minute: usize,
    ) -> Self {
        Self {
            jwks_uri: jwks_uri.into(),
            client,
            clock,
            ttl,
            capacity,
            state: Arc::new(Mutex::new(JwksState {
                keys: HashMap::new(),
                budget: FetchBudget::new(fetches_per_minute, FETCH_WINDOW),
            })),
        }
    }

    /// JWKS endpoint
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Look up the verification key for `kid`
    ///
    /// # Errors
    ///
    /// - [`KeyNotFoundError::RateLimited`] on a miss when the fetch budget is spent
    /// - [`KeyNotFoundError::Fetch`] if the endpoint is unreachable or returns garbage
    /// - [`KeyNotFoundError::UnknownKeyId`] if the fresh JWKS lacks a usable key for `kid`
    pub async fn get(&self, kid: &str) -> Result<Jwk, KeyNotFoundError> {
        {
            let mut state = self.state.lock();
            let now = self.clock.now();

            if let Some(cached) = state.keys.get(kid)
                && cached.is_valid(now, self.ttl)
            {
                debug!(jwks_uri = %self.jwks_uri, kid = %kid, "Using cached JWK");
                return Ok(cached.jwk.clone());
            }

            if !state.budget.try_acquire(now) {
                warn!(jwks_uri = %self.jwks_uri, kid = %kid, "JWKS fetch rate limited");
                return Err(KeyNotFoundError::RateLimited {
                    kid: kid.to_string(),
                });
            }
        }

        let jwks = self.fetch().await?;

        let mut usable: Vec<(String, Jwk)> = jwks
            .keys
            .into_iter()
            .filter(is_rsa_signing_key)
            .filter_map(|jwk| jwk.common.key_id.clone().map(|key_id| (key_id, jwk)))
            .collect();

        let requested = usable
            .iter()
            .position(|(key_id, _)| key_id == kid)
            .map(|position| usable.swap_remove(position).1);

        let mut state = self.state.lock();
        let now = self.clock.now();
        state.keys.retain(|_, cached| cached.is_valid(now, self.ttl));

        if let Some(jwk) = &requested {
            if !state.keys.contains_key(kid) && state.keys.len() >= self.capacity {
                evict_oldest(&mut state.keys);
            }
            state.keys.insert(
                kid.to_string(),
                CachedKey {
                    jwk: jwk.clone(),
                    cached_at: now,
                },
            );
        }

        // Remaining keys only fill free slots; they never displace anything
        for (key_id, jwk) in usable {
            if state.keys.len() >= self.capacity && !state.keys.contains_key(&key_id) {
                continue;
            }
            state.keys.insert(
                key_id,
                CachedKey {
                    jwk,
                    cached_at: now,
                },
            );
        }

        requested.ok_or_else(|| {
            warn!(jwks_uri = %self.jwks_uri, kid = %kid, "Key id not published by issuer");
            KeyNotFoundError::UnknownKeyId {
                kid: kid.to_string(),
                jwks_uri: self.jwks_uri.clone(),
            }
        })
    }

    async fn fetch(&self) -> Result<JwkSet, KeyNotFoundError> {
        info!(jwks_uri = %self.jwks_uri, "Fetching JWKS from endpoint");

        let fetch_error = |reason: String| KeyNotFoundError::Fetch {
            jwks_uri: self.jwks_uri.clone(),
            reason,
        };

        let response = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| {
                error!(jwks_uri = %self.jwks_uri, error = %e, "Failed to fetch JWKS");
                fetch_error(e.to_string())
            })?;

        if !response.status().is_success() {
            error!(
                jwks_uri = %self.jwks_uri,
                status = %response.status(),
                "JWKS endpoint returned error status"
            );
            return Err(fetch_error(format!("HTTP {}", response.status())));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| fetch_error(format!("invalid JWKS: {e}")))?;

        debug!(jwks_uri = %self.jwks_uri, key_count = jwks.keys.len(), "Fetched JWKS");
        Ok(jwks)
    }
}

/// RSA keys that are not marked for encryption
fn is_rsa_signing_key(jwk: &Jwk) -> bool {
    matches!(jwk.algorithm, AlgorithmParameters::RSA(_))
        && !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
}

fn evict_oldest(keys: &mut HashMap<String, CachedKey>) {
    if let Some(oldest) = keys
        .iter()
        .min_by_key(|(_, cached)| cached.cached_at)
        .map(|(kid, _)| kid.clone())
    {
        keys.remove(&oldest);
    }
}
