//! Time-bounded cache of directory listings.
//!
//! Listing an SFTP directory costs a full authenticate-and-open-session round
//! trip, so repeated listings of the same directory are served from memory
//! for a short window. Entries are not invalidated by writes: a listing may
//! be up to one TTL stale.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::adapter::Listing;

/// Default time-to-live for cached listings.
pub const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(60);

/// Cache key identifying one remote directory.
///
/// Built from host, port, user and path only. Two credential sets that share
/// those four values share one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from connection identity and path.
    pub fn new(host: &str, port: u16, user: &str, path: &str) -> Self {
        Self(format!("{}@{}:{}:{}", user, host, port, path))
    }

    /// Serialized form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Listing cache contract.
pub trait ListingCache: Send + Sync {
    /// Fetch a fresh entry, evicting it if it has expired.
    fn get(&self, key: &CacheKey) -> Option<Listing>;

    /// Store a listing, overwriting any previous entry.
    fn put(&self, key: CacheKey, listing: Listing);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    timestamp: Instant,
    payload: Listing,
}

/// In-memory listing cache with lazy expiry.
#[derive(Debug)]
pub struct TtlListingCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl TtlListingCache {
    /// Create a cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for TtlListingCache {
    fn default() -> Self {
        Self::new(DEFAULT_LISTING_TTL)
    }
}

impl ListingCache for TtlListingCache {
    fn get(&self, key: &CacheKey) -> Option<Listing> {
        let stale_at = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            let entry = entries.get(key)?;
            if entry.timestamp.elapsed() < self.ttl {
                debug!(key = key.as_str(), "Listing cache hit");
                return Some(entry.payload.clone());
            }
            entry.timestamp
        };

        // A concurrent put may have refreshed the entry since the read lock
        // was released; only evict the entry that was seen as stale.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).is_some_and(|e| e.timestamp == stale_at) {
            entries.remove(key);
            debug!(key = key.as_str(), "Evicted expired listing");
        }
        None
    }

    fn put(&self, key: CacheKey, listing: Listing) {
        let entry = CacheEntry {
            timestamp: Instant::now(),
            payload: listing,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
    }
}

/// Cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListingCache;

impl ListingCache for NoopListingCache {
    fn get(&self, _key: &CacheKey) -> Option<Listing> {
        None
    }

    fn put(&self, _key: CacheKey, _listing: Listing) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;
    use stowage_common::FileEntry;

    fn modified() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn listing(name: &str) -> Listing {
        Listing {
            files: vec![FileEntry::file(name, name, 1, modified())],
            folders: Vec::new(),
        }
    }

    fn key() -> CacheKey {
        CacheKey::new("sftp.example.com", 22, "drop", "/incoming")
    }

    #[test]
    fn test_key_format() {
        assert_eq!(key().as_str(), "drop@sftp.example.com:22:/incoming");
        assert_ne!(key(), CacheKey::new("sftp.example.com", 2222, "drop", "/incoming"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl() {
        let cache = TtlListingCache::new(Duration::from_secs(60));
        cache.put(key(), listing("a.csv"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get(&key()), Some(listing("a.csv")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_and_evict_at_ttl() {
        let cache = TtlListingCache::new(Duration::from_secs(60));
        cache.put(key(), listing("a.csv"));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(cache.get(&key()), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_overwrites_and_restarts_ttl() {
        let cache = TtlListingCache::new(Duration::from_secs(60));
        cache.put(key(), listing("old.csv"));

        tokio::time::advance(Duration::from_secs(45)).await;
        cache.put(key(), listing("new.csv"));

        tokio::time::advance(Duration::from_secs(45)).await;
        assert_eq!(cache.get(&key()), Some(listing("new.csv")));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_independently() {
        let cache = TtlListingCache::default();
        let other = CacheKey::new("sftp.example.com", 22, "drop", "/outgoing");
        cache.put(key(), listing("a"));
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.put(other.clone(), listing("b"));
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(cache.get(&key()), None);
        assert_eq!(cache.get(&other), Some(listing("b")));
    }

    #[test]
    fn test_noop_cache_always_misses() {
        let cache = NoopListingCache;
        cache.put(key(), listing("a"));
        assert_eq!(cache.get(&key()), None);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let cache = Arc::new(TtlListingCache::default());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = CacheKey::new("h", 22, "u", &format!("/dir{}", i % 4));
                cache.put(key.clone(), listing(&format!("f{}", i)));
                cache.get(&key).is_some()
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(cache.len(), 4);
    }
}
