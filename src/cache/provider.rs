use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use parking_lot::Mutex;
use crate::core::error::Result;
use crate::core::types::{Poly, PolyList};

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Poly(Poly),
    List(PolyList),
    Count(u64),
}

/// Key/value cache the overlay talks to. Every call may fail; the overlay
/// treats failures as misses.
pub trait CacheProvider: Send + Sync {
    fn name(&self) -> &str;

    fn get(&self, key: &str) -> Result<Option<CachedValue>>;

    fn put(&self, key: &str, value: CachedValue) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

struct CacheSlot {
    value: CachedValue,
    stored_at: Instant,
}

/// Bounded in-process cache with optional per-entry TTL
pub struct LruCacheProvider {
    pub name: String,
    cache: Mutex<LruCache<String, CacheSlot>>,
    pub capacity: usize,
    pub ttl: Option<Duration>,
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
}

impl LruCacheProvider {
    pub fn new(name: &str, capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = capacity.max(1);
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        LruCacheProvider {
            name: name.to_string(),
            cache: Mutex::new(LruCache::new(cap)),
            capacity,
            ttl,
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            size: self.cache.lock().len(),
            capacity: self.capacity,
        }
    }

    fn expired(&self, slot: &CacheSlot) -> bool {
        self.ttl.is_some_and(|ttl| slot.stored_at.elapsed() >= ttl)
    }
}

impl CacheProvider for LruCacheProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Result<Option<CachedValue>> {
        let mut cache = self.cache.lock();
        let expired = match cache.get(key) {
            Some(slot) if !self.expired(slot) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                return Ok(Some(slot.value.clone()));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(key);
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    fn put(&self, key: &str, value: CachedValue) -> Result<()> {
        let slot = CacheSlot {
            value,
            stored_at: Instant::now(),
        };
        self.cache.lock().put(key.to_string(), slot);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.cache.lock().pop(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.cache.lock().clear();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
