//! TTL cache of resolved links
//!
//! Keyed by the submitted link. Entries expire a fixed time after they were
//! written and are never bounded by count, so memory grows with the number
//! of distinct links seen within one TTL.

use crate::resolution::ResolvedLink;
use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

/// Cache of successful resolutions
#[derive(Clone)]
pub struct ResolutionCache {
    /// Moka cache storing link -> result with automatic TTL
    cache: Cache<String, ResolvedLink>,
    ttl: Duration,
}

impl ResolutionCache {
    /// Creates a cache whose entries live for `ttl`
    ///
    /// # Examples
    ///
    /// ```
    /// use bypass_relay::cache::ResolutionCache;
    /// use std::time::Duration;
    ///
    /// let cache = ResolutionCache::new(Duration::from_secs(30 * 60));
    /// assert_eq!(cache.ttl(), Duration::from_secs(1800));
    /// ```
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).build();
        Self { cache, ttl }
    }

    /// Returns an owned copy of a fresh entry; expired entries read as absent.
    pub async fn get(&self, link: &str) -> Option<ResolvedLink> {
        let hit = self.cache.get(link).await;
        if hit.is_some() {
            debug!(link = %link, "Resolution cache hit");
        }
        hit
    }

    /// Stores `result`, replacing any previous entry and restarting its TTL.
    pub async fn set(&self, link: &str, result: ResolvedLink) {
        self.cache.insert(link.to_string(), result).await;
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    /// Configured time-to-live
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }
}
