use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use crate::cache::key;
use crate::cache::provider::{CacheProvider, CachedValue};
use crate::core::error::Result;
use crate::core::types::{InsertOptions, InsertRequest, Poly, PolyList};
use crate::index::rebuild::RebuildReport;
use crate::query::types::{QuerySpec, QueryType};
use crate::storage::adapter::Backend;

/// Cache in front of any backend.
///
/// Configuration, metadata and documents by id are written through, so this
/// engine never reads back a stale copy of its own writes. Index snapshots,
/// tag data, query pages and counts are read through and only leave the
/// cache by LRU or TTL. RANDOM results are never cached. Provider failures
/// are logged and the call goes to the backend.
pub struct CachingBackend {
    inner: Arc<dyn Backend>,
    cache: Option<Arc<dyn CacheProvider>>,
}

impl CachingBackend {
    pub fn new(inner: Arc<dyn Backend>, cache: Arc<dyn CacheProvider>) -> Self {
        CachingBackend { inner, cache: Some(cache) }
    }

    pub fn without_cache(inner: Arc<dyn Backend>) -> Self {
        CachingBackend { inner, cache: None }
    }

    pub fn inner(&self) -> &Arc<dyn Backend> {
        &self.inner
    }

    fn lookup(&self, key: &str) -> Option<CachedValue> {
        let cache = self.cache.as_ref()?;
        match cache.get(key) {
            Ok(found) => found,
            Err(e) => {
                warn!(provider = cache.name(), key, error = %e, "cache get failed, using backend");
                None
            }
        }
    }

    fn store(&self, key: &str, value: CachedValue) {
        let Some(cache) = &self.cache else { return };
        if let Err(e) = cache.put(key, value) {
            warn!(provider = cache.name(), key, error = %e, "cache put failed");
        }
    }

    fn evict(&self, key: &str) {
        let Some(cache) = &self.cache else { return };
        if let Err(e) = cache.remove(key) {
            warn!(provider = cache.name(), key, error = %e, "cache evict failed");
        }
    }

    fn cached_poly<F>(&self, key: &str, load: F) -> Result<Option<Poly>>
    where
        F: FnOnce() -> Result<Option<Poly>>,
    {
        if let Some(CachedValue::Poly(poly)) = self.lookup(key) {
            return Ok(Some(poly));
        }
        let loaded = load()?;
        if let Some(poly) = &loaded {
            self.store(key, CachedValue::Poly(poly.clone()));
        }
        Ok(loaded)
    }
}

impl Backend for CachingBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn open(&self) -> Result<()> {
        self.inner.open()
    }

    fn close(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.clear() {
                warn!(provider = cache.name(), error = %e, "cache clear failed");
            }
        }
        self.inner.close()
    }

    fn create(&self, dataset: &str) -> Result<Poly> {
        let config = self.inner.create(dataset)?;
        self.store(&key::config_key(dataset), CachedValue::Poly(config.clone()));
        Ok(config)
    }

    fn exists(&self, dataset: &str) -> Result<bool> {
        self.inner.exists(dataset)
    }

    fn config(&self, dataset: &str) -> Result<Option<Poly>> {
        self.cached_poly(&key::config_key(dataset), || self.inner.config(dataset))
    }

    fn set_config(&self, dataset: &str, config: Poly) -> Result<Poly> {
        let key = key::config_key(dataset);
        match self.inner.set_config(dataset, config) {
            Ok(stored) => {
                self.store(&key, CachedValue::Poly(stored.clone()));
                Ok(stored)
            }
            Err(e) => {
                self.evict(&key);
                Err(e)
            }
        }
    }

    fn metadata(&self, dataset: &str) -> Result<Option<Poly>> {
        self.cached_poly(&key::metadata_key(dataset), || self.inner.metadata(dataset))
    }

    fn set_metadata(&self, dataset: &str, metadata: Poly) -> Result<Poly> {
        let key = key::metadata_key(dataset);
        match self.inner.set_metadata(dataset, metadata) {
            Ok(stored) => {
                self.store(&key, CachedValue::Poly(stored.clone()));
                Ok(stored)
            }
            Err(e) => {
                self.evict(&key);
                Err(e)
            }
        }
    }

    fn index(&self, dataset: &str) -> Result<Poly> {
        let key = key::index_key(dataset);
        if let Some(CachedValue::Poly(poly)) = self.lookup(&key) {
            return Ok(poly);
        }
        let index = self.inner.index(dataset)?;
        self.store(&key, CachedValue::Poly(index.clone()));
        Ok(index)
    }

    fn tag_data(&self, dataset: &str, tag: &str) -> Result<Option<Poly>> {
        self.cached_poly(&key::tag_key(dataset, tag), || self.inner.tag_data(dataset, tag))
    }

    fn insert_with_options(
        &self,
        dataset: &str,
        options: &InsertOptions,
        requests: Vec<InsertRequest>,
    ) -> Result<PolyList> {
        let ids: Vec<String> = requests.iter().map(|r| r.poly.id().to_string()).collect();
        match self.inner.insert_with_options(dataset, options, requests) {
            Ok(written) => {
                for poly in &written {
                    self.store(&key::read_key(dataset, poly.id()), CachedValue::Poly(poly.clone()));
                }
                Ok(written)
            }
            Err(e) => {
                // Unknown how much landed; the next read goes to the backend.
                for id in &ids {
                    self.evict(&key::read_key(dataset, id));
                }
                Err(e)
            }
        }
    }

    fn read(&self, dataset: &str, ids: &[String]) -> Result<PolyList> {
        let mut found: HashMap<&str, Poly> = HashMap::new();
        let mut missing = Vec::new();
        for id in ids {
            match self.lookup(&key::read_key(dataset, id)) {
                Some(CachedValue::Poly(poly)) => {
                    found.insert(id.as_str(), poly);
                }
                _ => missing.push(id.clone()),
            }
        }

        if !missing.is_empty() {
            for poly in self.inner.read(dataset, &missing)? {
                self.store(&key::read_key(dataset, poly.id()), CachedValue::Poly(poly.clone()));
                if let Some(id) = ids.iter().find(|id| id.as_str() == poly.id()) {
                    found.insert(id.as_str(), poly);
                }
            }
        }
        debug!(dataset, requested = ids.len(), from_backend = missing.len(), "read");

        let mut out = PolyList::new();
        for id in ids {
            if let Some(poly) = found.get(id.as_str()) {
                out.push(poly.clone());
            }
        }
        Ok(out)
    }

    fn remove(&self, dataset: &str, ids: &[String]) -> Result<PolyList> {
        let result = self.inner.remove(dataset, ids);
        for id in ids {
            self.evict(&key::read_key(dataset, id));
        }
        result
    }

    fn query(&self, dataset: &str, spec: &QuerySpec) -> Result<PolyList> {
        if spec.query_type == QueryType::Random {
            return self.inner.query(dataset, spec);
        }
        let key = key::query_key(dataset, spec);
        if let Some(CachedValue::List(list)) = self.lookup(&key) {
            return Ok(list);
        }
        let list = self.inner.query(dataset, spec)?;
        self.store(&key, CachedValue::List(list.clone()));
        Ok(list)
    }

    fn count(&self, dataset: &str, spec: &QuerySpec) -> Result<u64> {
        let key = key::count_key(dataset, spec);
        if let Some(CachedValue::Count(count)) = self.lookup(&key) {
            return Ok(count);
        }
        let count = self.inner.count(dataset, spec)?;
        self.store(&key, CachedValue::Count(count));
        Ok(count)
    }

    fn list(&self) -> Result<PolyList> {
        self.inner.list()
    }

    fn recalculate(&self, dataset: &str) -> Result<RebuildReport> {
        self.inner.recalculate(dataset)
    }
}
