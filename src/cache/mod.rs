//! Caching for fitted models

mod lru;

pub use lru::{CacheEntry, CacheStats, LruCache};
