mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use common::*;
use polydex::{
    Backend, CachingBackend, InsertRequest, KvBackend, LruCacheProvider, MemoryBackend, MemoryKvStore,
    Poly, QuerySpec,
};

fn populate(backend: &dyn Backend) {
    backend.create("blog").unwrap();
    backend.insert("blog", blog_requests(30)).unwrap();
}

#[test]
fn overlay_answers_like_the_bare_backend() {
    init_tracing();
    let bare = MemoryBackend::default();
    let cache = Arc::new(LruCacheProvider::new("test", 256, None));
    let cached = CachingBackend::new(Arc::new(MemoryBackend::default()), cache.clone());
    populate(&bare);
    populate(&cached);

    for _ in 0..2 {
        for page in 0..4 {
            let spec = QuerySpec::pages().tag("author_b").page(page);
            assert_eq!(ids(&bare.query("blog", &spec).unwrap()), ids(&cached.query("blog", &spec).unwrap()));
            assert_eq!(bare.count("blog", &spec).unwrap(), cached.count("blog", &spec).unwrap());
        }
        assert_eq!(bare.index("blog").unwrap(), cached.index("blog").unwrap());
        let wanted = strings(&["post9", "post1", "missing", "post30"]);
        assert_eq!(ids(&bare.read("blog", &wanted).unwrap()), ids(&cached.read("blog", &wanted).unwrap()));
    }
    assert!(cache.stats().hit_count > 0);
}

#[test]
fn broken_provider_never_fails_an_operation() {
    init_tracing();
    let broken = Arc::new(BrokenCache::new());
    let kv: Arc<dyn Backend> = Arc::new(KvBackend::<MemoryKvStore>::default());
    let backend = CachingBackend::new(kv, broken.clone());

    populate(&backend);
    assert_eq!(backend.config("blog").unwrap().unwrap().fetch_u64("item_per_page"), Some(10));
    assert!(backend.metadata("blog").unwrap().is_some());
    assert_eq!(backend.query("blog", &QuerySpec::pages()).unwrap().len(), 10);
    assert_eq!(backend.query("blog", &QuerySpec::random(4)).unwrap().len(), 4);
    assert_eq!(backend.count("blog", &QuerySpec::pages()).unwrap(), 30);
    assert_eq!(count_of(&backend.index("blog").unwrap(), "author_a"), 15);
    assert!(backend.tag_data("blog", "author_a").unwrap().is_some());
    assert_eq!(backend.read("blog", &strings(&["post2"])).unwrap().len(), 1);
    assert_eq!(backend.remove("blog", &strings(&["post2"])).unwrap().len(), 1);
    backend.close().unwrap();

    assert!(broken.calls.load(Ordering::Relaxed) > 0);
}

#[test]
fn written_documents_are_served_from_cache() {
    let cache = Arc::new(LruCacheProvider::new("test", 64, None));
    let backend = CachingBackend::new(Arc::new(MemoryBackend::default()), cache.clone());
    backend.create("blog").unwrap();
    backend.insert("blog", vec![InsertRequest::new(Poly::new("p1").with("v", 1))]).unwrap();

    let before = cache.stats();
    let read = backend.read("blog", &strings(&["p1"])).unwrap();
    assert_eq!(read.get("p1").unwrap().fetch_u64("v"), Some(1));
    assert_eq!(cache.stats().hit_count, before.hit_count + 1);

    backend.update("blog", vec![InsertRequest::new(Poly::new("p1").with("v", 2))]).unwrap();
    let read = backend.read("blog", &strings(&["p1"])).unwrap();
    assert_eq!(read.get("p1").unwrap().fetch_u64("v"), Some(2));
}

#[test]
fn random_queries_bypass_the_cache() {
    let cache = Arc::new(LruCacheProvider::new("test", 64, None));
    let backend = CachingBackend::new(Arc::new(MemoryBackend::default()), cache.clone());
    populate(&backend);

    let before = cache.stats();
    for _ in 0..5 {
        backend.query("blog", &QuerySpec::random(3)).unwrap();
    }
    let after = cache.stats();
    assert_eq!(after.hit_count, before.hit_count);
    assert_eq!(after.miss_count, before.miss_count);
}

#[test]
fn close_empties_the_cache() {
    let cache = Arc::new(LruCacheProvider::new("test", 64, None));
    let backend = CachingBackend::new(Arc::new(MemoryBackend::default()), cache.clone());
    populate(&backend);
    backend.query("blog", &QuerySpec::pages()).unwrap();
    assert!(cache.stats().size > 0);

    backend.close().unwrap();
    assert_eq!(cache.stats().size, 0);
}
