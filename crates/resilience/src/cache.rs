//! TTL + LRU cache, and a named registry with first-call-binding sizing.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use sa_domain::config::CacheConfig;

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

struct Slot<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, Slot<V>>,
    order: VecDeque<K>,
    stats: CacheStats,
}

/// Least-recently-used cache where every entry also carries a TTL. Mirrors
/// the original service's `OrderedDict`-backed cache: eviction makes room
/// before insertion, and a stale hit is treated as a miss.
pub struct TTLCache<K, V> {
    maxsize: usize,
    ttl: Duration,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> TTLCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(maxsize: usize, ttl_seconds: u64) -> Self {
        Self {
            maxsize: maxsize.max(1),
            ttl: Duration::from_secs(ttl_seconds),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let expired = match inner.entries.get(key) {
            Some(slot) => slot.expires_at <= Instant::now(),
            None => {
                inner.stats.misses += 1;
                return None;
            }
        };

        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            inner.stats.misses += 1;
            inner.stats.expirations += 1;
            return None;
        }

        let value = inner.entries.get(key).map(|s| s.value.clone());
        inner.stats.hits += 1;
        inner.order.retain(|k| k != key);
        inner.order.push_back(key.clone());
        value
    }

    pub fn set(&self, key: K, value: V) {
        let mut inner = self.inner.lock();
        inner.order.retain(|k| k != &key);

        while inner.entries.len() >= self.maxsize {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                    inner.stats.evictions += 1;
                }
                None => break,
            }
        }

        inner.entries.insert(
            key.clone(),
            Slot {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
        inner.order.push_back(key);
    }

    pub fn invalidate(&self, key: &K) {
        let mut inner = self.inner.lock();
        inner.entries.remove(key);
        inner.order.retain(|k| k != key);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }
}

/// Named registry of `TTLCache`s. A cache's size and TTL are bound on its
/// first request and held fixed thereafter — later callers asking for the
/// same name get the already-sized cache back, even if they pass different
/// parameters.
pub struct CacheRegistry<V> {
    default: CacheConfig,
    caches: Mutex<HashMap<String, Arc<TTLCache<String, V>>>>,
}

impl<V> CacheRegistry<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(default: CacheConfig) -> Self {
        Self {
            default,
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Get (or lazily create with the registry's default sizing) the named
    /// cache.
    pub fn get(&self, name: &str) -> Arc<TTLCache<String, V>> {
        self.get_or_create(name, self.default.maxsize, self.default.ttl_seconds)
    }

    /// Get (or lazily create with explicit sizing) the named cache. Sizing
    /// only takes effect the first time `name` is requested.
    pub fn get_or_create(&self, name: &str, maxsize: usize, ttl_seconds: u64) -> Arc<TTLCache<String, V>> {
        let mut caches = self.caches.lock();
        if let Some(existing) = caches.get(name) {
            return existing.clone();
        }
        let cache = Arc::new(TTLCache::new(maxsize, ttl_seconds));
        caches.insert(name.to_string(), cache.clone());
        cache
    }

    pub fn names(&self) -> Vec<String> {
        self.caches.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let cache: TTLCache<String, i32> = TTLCache::new(10, 60);
        assert_eq!(cache.get(&"a".to_string()), None);
        cache.set("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn evicts_lru_when_over_capacity() {
        let cache: TTLCache<String, i32> = TTLCache::new(2, 60);
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        cache.set("c".into(), 3);
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(2));
        assert_eq!(cache.get(&"c".to_string()), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn get_refreshes_recency() {
        let cache: TTLCache<String, i32> = TTLCache::new(2, 60);
        cache.set("a".into(), 1);
        cache.set("b".into(), 2);
        cache.get(&"a".to_string());
        cache.set("c".into(), 3);
        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
    }

    #[test]
    fn expires_past_ttl() {
        let cache: TTLCache<String, i32> = TTLCache::new(10, 0);
        cache.set("a".into(), 1);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn registry_binds_size_on_first_call() {
        let registry: CacheRegistry<i32> = CacheRegistry::new(CacheConfig { maxsize: 5, ttl_seconds: 60 });
        let first = registry.get_or_create("embeddings", 2, 60);
        first.set("x".into(), 1);
        first.set("y".into(), 2);
        let second = registry.get_or_create("embeddings", 100, 60);
        second.set("z".into(), 3);
        assert_eq!(second.get(&"x".to_string()), None);
    }
}
