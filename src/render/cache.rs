//! In-memory render cache
//!
//! Keyed by the SHA-256 of the canonical URL, LRU-bounded and
//! TTL-expiring. Per-process only; nothing persists across runs.

use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use url::Url;

use crate::fingerprint::content_hash;

struct CachedRender {
    body: String,
    fingerprint: String,
    inserted_at: Instant,
}

/// LRU render cache with TTL expiry
pub struct RenderCache {
    entries: LruCache<String, CachedRender>,
    ttl: Duration,
}

impl RenderCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: LruCache::new(capacity),
            ttl,
        }
    }

    fn cache_key(url: &Url) -> String {
        format!("{:x}", Sha256::digest(url.as_str().as_bytes()))
    }

    /// Returns the cached body if present and fresh
    pub fn get(&mut self, url: &Url) -> Option<String> {
        let key = Self::cache_key(url);

        let expired = match self.entries.get(&key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => return None,
        };

        if expired {
            self.entries.pop(&key);
            return None;
        }

        self.entries.get(&key).map(|entry| entry.body.clone())
    }

    /// Stores a rendered body; evicts the least-recently-used entry when full
    pub fn put(&mut self, url: &Url, body: &str) {
        self.entries.put(
            Self::cache_key(url),
            CachedRender {
                body: body.to_string(),
                fingerprint: content_hash(body),
                inserted_at: Instant::now(),
            },
        );
    }

    /// Fingerprint of a cached body, if present (ignores TTL)
    pub fn fingerprint(&mut self, url: &Url) -> Option<String> {
        let key = Self::cache_key(url);
        self.entries.get(&key).map(|e| e.fingerprint.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let mut cache = RenderCache::new(4, Duration::from_secs(60));
        cache.put(&url("https://x.test/a"), "<html>a</html>");

        assert_eq!(
            cache.get(&url("https://x.test/a")),
            Some("<html>a</html>".to_string())
        );
        assert_eq!(cache.get(&url("https://x.test/b")), None);
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = RenderCache::new(4, Duration::from_millis(0));
        cache.put(&url("https://x.test/a"), "<html>a</html>");

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&url("https://x.test/a")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = RenderCache::new(2, Duration::from_secs(60));
        cache.put(&url("https://x.test/1"), "one");
        cache.put(&url("https://x.test/2"), "two");
        cache.put(&url("https://x.test/3"), "three");

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&url("https://x.test/1")), None);
        assert_eq!(cache.get(&url("https://x.test/3")), Some("three".to_string()));
    }

    #[test]
    fn test_fingerprint_matches_content_hash() {
        let mut cache = RenderCache::new(4, Duration::from_secs(60));
        cache.put(&url("https://x.test/a"), "body text");

        assert_eq!(
            cache.fingerprint(&url("https://x.test/a")),
            Some(content_hash("body text"))
        );
    }
}
