//! Subject-keyed credential cache
//!
//! Holds at most one access token per subject. Entries expire on the injected
//! [`Clock`]; a miss is never an error, the caller simply exchanges again.
//! Concurrent writers for the same subject race and the last write wins.

use crate::clock::{self, Clock};
use crate::exchange::AccessTokenResponse;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Subtracted from `expires_in` so a cached token is not handed out moments before
/// it expires
pub const CACHE_SAFETY_MARGIN: Duration = Duration::from_secs(10);

/// Default bound on the number of subjects held
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct CachedCredential {
    access_token: String,
    expires_at: SystemTime,
}

/// Process-local, time-bounded access token cache
#[derive(Debug, Clone)]
pub struct CredentialCache {
    entries: Arc<DashMap<String, CachedCredential>>,
    clock: Arc<dyn Clock>,
    capacity: usize,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(clock::system())
    }
}

impl CredentialCache {
    /// Create a cache with [`DEFAULT_CACHE_CAPACITY`]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `capacity` subjects
    pub fn with_capacity(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
            capacity: capacity.max(1),
        }
    }

    /// Cached token for `subject`, if still valid
    pub fn get(&self, subject: &str) -> Option<String> {
        let now = self.clock.now();

        if let Some(entry) = self.entries.get(subject) {
            if entry.expires_at > now {
                return Some(entry.access_token.clone());
            }
        } else {
            return None;
        }

        // Expired; drop it unless a writer replaced it meanwhile
        self.entries
            .remove_if(subject, |_, entry| entry.expires_at <= now);
        None
    }

    /// Store `token` for `subject` for `ttl`, replacing any previous entry
    ///
    /// A zero `ttl` stores nothing.
    pub fn put(&self, subject: impl Into<String>, token: impl Into<String>, ttl: Duration) {
        let subject = subject.into();
        if ttl.is_zero() {
            debug!(subject = %subject, "Not caching token with zero lifetime");
            return;
        }

        let now = self.clock.now();
        if !self.entries.contains_key(&subject) && self.entries.len() >= self.capacity {
            self.make_room(now);
        }

        self.entries.insert(
            subject,
            CachedCredential {
                access_token: token.into(),
                expires_at: now + ttl,
            },
        );
    }

    /// Store a token-endpoint response, less [`CACHE_SAFETY_MARGIN`]
    ///
    /// Returns the lifetime used.
    pub fn put_response(&self, subject: impl Into<String>, response: &AccessTokenResponse) -> Duration {
        let ttl = Duration::from_secs(response.expires_in).saturating_sub(CACHE_SAFETY_MARGIN);
        self.put(subject, response.access_token.clone(), ttl);
        ttl
    }

    /// Drop the entry for `subject`
    pub fn invalidate(&self, subject: &str) {
        self.entries.remove(subject);
    }

    /// Number of entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn make_room(&self, now: SystemTime) {
        self.entries.retain(|_, entry| entry.expires_at > now);
        if self.entries.len() < self.capacity {
            return;
        }

        let soonest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());
        if let Some(subject) = soonest {
            debug!(subject = %subject, "Evicting credential to stay within capacity");
            self.entries.remove(&subject);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn cache(capacity: usize) -> (CredentialCache, ManualClock) {
        let clock = ManualClock::new();
        let cache = CredentialCache::with_capacity(Arc::new(clock.clone()), capacity);
        (cache, clock)
    }

    #[test]
    fn test_put_then_get_until_expiry() {
        let (cache, clock) = cache(16);
        cache.put("user1", "tokA", Duration::from_secs(60));
        assert_eq!(cache.get("user1").as_deref(), Some("tokA"));

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get("user1").as_deref(), Some("tokA"));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("user1"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_overwrites_existing_subject() {
        let (cache, _) = cache(16);
        cache.put("user1", "tokA", Duration::from_secs(60));
        cache.put("user1", "tokB", Duration::from_secs(60));
        assert_eq!(cache.get("user1").as_deref(), Some("tokB"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_ttl_is_not_cached() {
        let (cache, _) = cache(16);
        cache.put("user1", "tokA", Duration::ZERO);
        assert_eq!(cache.get("user1"), None);
    }

    #[test]
    fn test_response_ttl_subtracts_margin() {
        let (cache, clock) = cache(16);
        let response = AccessTokenResponse {
            access_token: "abc".to_string(),
            issued_token_type: None,
            token_type: "Bearer".to_string(),
            expires_in: 200,
        };

        let ttl = cache.put_response("user1", &response);
        assert_eq!(ttl, Duration::from_secs(190));

        clock.advance(Duration::from_secs(189));
        assert_eq!(cache.get("user1").as_deref(), Some("abc"));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("user1"), None);
    }

    #[test]
    fn test_short_lived_response_is_not_cached() {
        let (cache, _) = cache(16);
        let response = AccessTokenResponse {
            access_token: "abc".to_string(),
            issued_token_type: None,
            token_type: "Bearer".to_string(),
            expires_in: 5,
        };
        assert_eq!(cache.put_response("user1", &response), Duration::ZERO);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_capacity_evicts_expired_then_soonest() {
        let (cache, clock) = cache(2);
        cache.put("a", "1", Duration::from_secs(10));
        cache.put("b", "2", Duration::from_secs(100));

        // "c" displaces the entry closest to expiry
        cache.put("c", "3", Duration::from_secs(100));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b").as_deref(), Some("2"));

        clock.advance(Duration::from_secs(150));
        cache.put("d", "4", Duration::from_secs(10));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("d").as_deref(), Some("4"));
    }

    #[test]
    fn test_invalidate() {
        let (cache, _) = cache(16);
        cache.put("user1", "tokA", Duration::from_secs(60));
        cache.invalidate("user1");
        assert_eq!(cache.get("user1"), None);
    }
}
