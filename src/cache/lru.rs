//! Bounded LRU cache
//!
//! A thread-safe least-recently-used cache with hit/miss statistics.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// A cache entry with value and metadata
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    /// Number of times this entry was read or written
    pub access_count: u64,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            access_count: 1,
        }
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently held
    pub entries: usize,
    /// Maximum entries before eviction
    pub capacity: usize,
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries dropped to make room
    pub evictions: u64,
    /// `hits / (hits + misses)`, 0 before any lookup
    pub hit_rate: f64,
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Front is least recently used
    order: VecDeque<K>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

/// LRU cache holding at most `capacity` entries
pub struct LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache; a capacity of zero is raised to one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Get an entry, marking it most recently used
    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match inner.entries.get_mut(key) {
            Some(entry) => {
                entry.access_count += 1;
                let value = entry.value.clone();
                inner.hits += 1;
                inner.touch(key);
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert or replace an entry, evicting the least recently used one when full
    pub fn insert(&self, key: K, value: V) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = value;
            entry.access_count += 1;
            inner.touch(&key);
            return;
        }

        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                    inner.evictions += 1;
                }
                None => break,
            }
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, CacheEntry::new(value));
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.remove(key)?;
        inner.order.retain(|k| k != key);
        Some(entry.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            entries: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate: if lookups > 0 {
                inner.hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_cache_basic() {
        let cache: LruCache<String, i32> = LruCache::new(10);

        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);

        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), Some(2));
        assert_eq!(cache.get(&"c".to_string()), None);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache: LruCache<i32, i32> = LruCache::new(2);

        cache.insert(1, 10);
        cache.insert(2, 20);
        // 1 becomes most recently used, so 2 is evicted next
        assert_eq!(cache.get(&1), Some(10));
        cache.insert(3, 30);

        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert!(cache.contains(&3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_replace_does_not_evict() {
        let cache: LruCache<i32, i32> = LruCache::new(2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        cache.insert(1, 11);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&1), Some(11));
    }

    #[test]
    fn test_stats() {
        let cache: LruCache<i32, i32> = LruCache::new(4);
        cache.insert(1, 1);
        cache.get(&1);
        cache.get(&2);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < 1e-12);

        assert_eq!(cache.remove(&1), Some(1));
        assert!(cache.is_empty());
    }
}
