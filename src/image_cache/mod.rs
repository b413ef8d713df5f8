//! ImageCache - In-Memory Image Cache with TTL
//!
//! ## Responsibilities
//!
//! - Store recent camera frames keyed by "facility/camera_id"
//! - Expiry-on-read: an entry past its expiry is never returned and is
//!   purged by the next get for that key
//! - Coarse statistics for the health endpoint
//!
//! There is no background sweep. Memory for expired-but-unread entries is
//! reclaimed only on a subsequent get or clear. Readers pay the eviction
//! cost instead of a background scheduler.

use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Cached frame entry
struct CacheEntry {
    /// Image data (JPEG bytes)
    data: Vec<u8>,
    /// Absolute expiry deadline
    expires_at: Instant,
}

/// Point-in-time cache statistics
///
/// `expired_entries` counts entries whose expiry has passed but that have
/// not yet been lazily purged by a get.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub ttl_seconds: u64,
}

/// Thread-safe in-memory image cache
pub struct ImageCache {
    /// Default time-to-live for entries stored via [`set`](Self::set)
    default_ttl: Duration,
    /// key -> entry, all operations serialized through this one lock
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ImageCache {
    /// Create a cache with the given default TTL
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            default_ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get cached image if present and not expired
    ///
    /// Deletes the entry as a side effect when it is found but expired.
    /// No side effect on a true miss.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            None => None,
            Some(entry) if Instant::now() > entry.expires_at => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.data.clone()),
        }
    }

    /// Store image with the default TTL, overwriting any existing entry
    pub async fn set(&self, key: &str, data: Vec<u8>) {
        self.set_with_ttl(key, data, self.default_ttl).await;
    }

    /// Store image with an explicit TTL
    pub async fn set_with_ttl(&self, key: &str, data: Vec<u8>, ttl: Duration) {
        let size = data.len();
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                expires_at: Instant::now() + ttl,
            },
        );

        tracing::trace!(key = %key, size = size, ttl_sec = ttl.as_secs(), "Cached frame");
    }

    /// Remove entry, reporting whether removal occurred
    pub async fn invalidate(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        entries.remove(key).is_some()
    }

    /// Remove all entries regardless of expiry state
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        entries.clear();
    }

    /// Snapshot of cache statistics
    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        let total = entries.len();
        let expired = entries.values().filter(|e| now > e.expires_at).count();

        CacheStats {
            total_entries: total,
            valid_entries: total - expired,
            expired_entries: expired,
            ttl_seconds: self.default_ttl.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_then_get_returns_data() {
        let cache = ImageCache::new(Duration::from_secs(30));
        cache.set("lodge/bagel", b"jpg1".to_vec()).await;
        assert_eq!(cache.get("lodge/bagel").await, Some(b"jpg1".to_vec()));
    }

    #[tokio::test]
    async fn test_get_on_true_miss() {
        let cache = ImageCache::new(Duration::from_secs(30));
        assert_eq!(cache.get("lodge/nothing").await, None);
    }

    #[tokio::test]
    async fn test_set_overwrites_existing_entry() {
        let cache = ImageCache::new(Duration::from_secs(30));
        cache.set("lodge/bagel", b"jpg1".to_vec()).await;
        cache.set("lodge/bagel", b"jpg2".to_vec()).await;
        assert_eq!(cache.get("lodge/bagel").await, Some(b"jpg2".to_vec()));
    }

    #[tokio::test]
    async fn test_expired_entry_not_returned_and_purged() {
        let cache = ImageCache::new(Duration::from_secs(30));
        cache
            .set_with_ttl("lodge/bagel", b"jpg1".to_vec(), Duration::from_millis(20))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get("lodge/bagel").await, None);

        // The expired entry was purged by the get, not just hidden
        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.expired_entries, 0);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let cache = ImageCache::new(Duration::from_secs(30));
        assert!(!cache.invalidate("lodge/bagel").await);

        cache.set("lodge/bagel", b"jpg1".to_vec()).await;
        assert!(cache.invalidate("lodge/bagel").await);
        assert_eq!(cache.get("lodge/bagel").await, None);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let cache = ImageCache::new(Duration::from_secs(30));
        cache.set("lodge/bagel", b"jpg1".to_vec()).await;
        cache.set("lodge/donut", b"jpg2".to_vec()).await;
        cache.clear().await;

        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 0);
    }

    #[tokio::test]
    async fn test_stats_counts_expired_but_unpurged() {
        let cache = ImageCache::new(Duration::from_secs(30));
        cache
            .set_with_ttl("lodge/bagel", b"jpg1".to_vec(), Duration::from_millis(20))
            .await;

        let before = cache.stats().await;
        assert_eq!(before.valid_entries, 1);
        assert_eq!(before.expired_entries, 0);
        assert_eq!(before.ttl_seconds, 30);

        tokio::time::sleep(Duration::from_millis(50)).await;

        // No get has run yet, so the entry is still resident but expired
        let after = cache.stats().await;
        assert_eq!(after.total_entries, 1);
        assert_eq!(after.valid_entries, 0);
        assert_eq!(after.expired_entries, 1);
    }
}
