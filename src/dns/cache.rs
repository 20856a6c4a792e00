//! TTL-bounded DNS resolution cache (spec §4.O).
//!
//! Directly grounded on `primp-reqwest`'s `dns::cache::DnsCache`
//! (`crates/primp-reqwest/src/dns/cache.rs`): a `RwLock<HashMap<..>>` of
//! host to resolved addresses plus an expiry instant, with the same
//! get/insert/purge_expired shape. The teacher wraps an async `Resolve`
//! trait; this crate has no async runtime, so resolution itself happens
//! off-loop via `rayon` (see `dns::resolver`) and this cache is purely
//! synchronous.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

struct CachedEntry {
    addrs: Vec<SocketAddr>,
    expires_at: Instant,
}

struct Inner {
    entries: RwLock<HashMap<String, CachedEntry>>,
}

/// A shared, cloneable TTL cache of resolved addresses.
#[derive(Clone)]
pub struct DnsCache {
    inner: Arc<Inner>,
    ttl: Duration,
}

impl DnsCache {
    pub fn new(ttl: Duration) -> Self {
        Self { inner: Arc::new(Inner { entries: RwLock::new(HashMap::new()) }), ttl }
    }

    /// Returns cached addresses for `host` if present and not expired.
    pub fn get(&self, host: &str) -> Option<Vec<SocketAddr>> {
        let entries = self.inner.entries.read();
        let entry = entries.get(host)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.addrs.clone())
    }

    pub fn insert(&self, host: &str, addrs: Vec<SocketAddr>) {
        let mut entries = self.inner.entries.write();
        entries.insert(host.to_string(), CachedEntry { addrs, expires_at: Instant::now() + self.ttl });
    }

    pub fn clear(&self) {
        self.inner.entries.write().clear();
    }

    /// Drops every expired entry; called periodically by the owning
    /// reactor so the cache doesn't grow unbounded over a long-lived
    /// process.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.inner.entries.write().retain(|_, e| e.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[test]
    fn cache_hit_returns_inserted_addresses() {
        let cache = DnsCache::new(Duration::from_secs(60));
        cache.insert("example.com", vec![addr(443)]);
        assert_eq!(cache.get("example.com"), Some(vec![addr(443)]));
    }

    #[test]
    fn cache_miss_for_unknown_host() {
        let cache = DnsCache::new(Duration::from_secs(60));
        assert!(cache.get("unknown.example").is_none());
    }

    #[test]
    fn cache_expiry_invalidates_entries() {
        let cache = DnsCache::new(Duration::from_millis(1));
        cache.insert("example.com", vec![addr(443)]);
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("example.com").is_none());
    }

    #[test]
    fn purge_expired_removes_stale_entries_but_keeps_fresh_ones() {
        let cache = DnsCache::new(Duration::from_millis(1));
        cache.insert("stale.example", vec![addr(1)]);
        std::thread::sleep(Duration::from_millis(10));
        cache.insert("fresh.example", vec![addr(2)]);
        cache.inner.entries.write().get_mut("fresh.example").unwrap().expires_at =
            Instant::now() + Duration::from_secs(60);
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clone_shares_the_same_underlying_cache() {
        let cache = DnsCache::new(Duration::from_secs(60));
        let clone = cache.clone();
        cache.insert("example.com", vec![addr(443)]);
        assert_eq!(clone.get("example.com"), Some(vec![addr(443)]));
    }
}
