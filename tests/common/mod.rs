//! Shared fixtures for the integration tests.

#![allow(dead_code)] // Not every test file uses every helper

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

use polydex::storage::kv::KvStore;
use polydex::{
    Backend, CacheProvider, CachedValue, CachingBackend, Error, InsertRequest, KvBackend,
    LruCacheProvider, MemoryBackend, MemoryKvStore, Poly, PolyList, Result,
};

static TRACING: Once = Once::new();

/// Route engine logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Every adapter that accepts writes, with and without the cache overlay.
pub fn writable_backends() -> Vec<(&'static str, Arc<dyn Backend>)> {
    init_tracing();
    let memory: Arc<dyn Backend> = Arc::new(MemoryBackend::default());
    let kv: Arc<dyn Backend> = Arc::new(KvBackend::<MemoryKvStore>::default());
    let cached_memory: Arc<dyn Backend> = Arc::new(CachingBackend::new(
        Arc::new(MemoryBackend::default()),
        Arc::new(LruCacheProvider::new("test", 1024, None)),
    ));
    let cached_kv: Arc<dyn Backend> = Arc::new(CachingBackend::new(
        Arc::new(KvBackend::<MemoryKvStore>::default()),
        Arc::new(LruCacheProvider::new("test", 1024, None)),
    ));
    vec![
        ("memory", memory),
        ("kv", kv),
        ("cached-memory", cached_memory),
        ("cached-kv", cached_kv),
    ]
}

pub fn post(i: usize) -> Poly {
    Poly::new(format!("post{}", i))
        .with("title", format!("Post number {}", i))
        .with("n", i as u64)
}

/// `post1..=postN`, alternating `author_a` / `author_b`.
pub fn blog_requests(n: usize) -> Vec<InsertRequest> {
    (1..=n)
        .map(|i| {
            let author = if i % 2 == 1 { "author_a" } else { "author_b" };
            InsertRequest::new(post(i)).tag(author)
        })
        .collect()
}

pub fn ids(list: &PolyList) -> Vec<String> {
    list.iter().map(|p| p.id().to_string()).collect()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn count_of(index: &Poly, tag: &str) -> u64 {
    index.fetch(tag)
        .and_then(|entry| entry.get("count"))
        .and_then(|count| count.as_u64())
        .unwrap_or(0)
}

/// Provider whose every call fails.
pub struct BrokenCache {
    pub calls: AtomicUsize,
}

impl BrokenCache {
    pub fn new() -> Self {
        BrokenCache { calls: AtomicUsize::new(0) }
    }

    fn fail<T>(&self) -> Result<T> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(Error::cache("connection refused"))
    }
}

impl CacheProvider for BrokenCache {
    fn name(&self) -> &str {
        "broken"
    }

    fn get(&self, _key: &str) -> Result<Option<CachedValue>> {
        self.fail()
    }

    fn put(&self, _key: &str, _value: CachedValue) -> Result<()> {
        self.fail()
    }

    fn remove(&self, _key: &str) -> Result<()> {
        self.fail()
    }

    fn clear(&self) -> Result<()> {
        self.fail()
    }
}

/// Key-value store whose document writes start failing after a budget is spent.
pub struct FlakyKvStore {
    inner: MemoryKvStore,
    document_puts_left: AtomicUsize,
    scans_failing: AtomicUsize,
}

impl FlakyKvStore {
    pub fn new(document_puts: usize) -> Self {
        FlakyKvStore {
            inner: MemoryKvStore::new(),
            document_puts_left: AtomicUsize::new(document_puts),
            scans_failing: AtomicUsize::new(0),
        }
    }

    pub fn fail_scans(&self, scans: usize) {
        self.scans_failing.store(scans, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.document_puts_left.store(usize::MAX, Ordering::Relaxed);
    }
}

impl KvStore for FlakyKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if key.contains("/doc/") {
            let spent = self.document_puts_left.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            });
            if spent.is_err() {
                return Err(Error::backend("store went away"));
            }
        }
        self.inner.put(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let failing = self.scans_failing.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
            left.checked_sub(1)
        });
        if failing.is_ok() {
            return Err(Error::backend("scan interrupted"));
        }
        self.inner.scan_prefix(prefix)
    }
}
