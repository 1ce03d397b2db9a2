use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use crate::cache::overlay::CachingBackend;
use crate::cache::provider::{CacheProvider, LruCacheProvider};
use crate::codec::packer::codec_for;
use crate::core::config::{CacheConfig, EngineConfig};
use crate::core::error::{Error, Result};
use crate::query::planner::QueryPlanner;
use crate::storage::adapter::Backend;
use crate::storage::kv::{KvBackend, MemoryKvStore};
use crate::storage::memory::MemoryBackend;
use crate::storage::snapshot::SnapshotBackend;

/// Build and open the backend described by `config`.
pub fn open_backend(config: &EngineConfig) -> Result<Arc<dyn Backend>> {
    let planner = QueryPlanner::new(config.default_item_per_page);
    let codec = codec_for(config.codec.compression);

    let backend: Arc<dyn Backend> = match config.backend.as_str() {
        "memory" => {
            let backend = MemoryBackend::new(planner);
            match &config.root {
                Some(root) => Arc::new(backend.with_persistence(root.clone(), codec)),
                None => Arc::new(backend),
            }
        }
        "kv" => Arc::new(
            KvBackend::new(MemoryKvStore::new(), &config.key_prefix, planner).with_codec(codec),
        ),
        "snapshot" => {
            let root = config.root.clone()
                .ok_or_else(|| Error::invalid_argument("snapshot backend needs a root directory"))?;
            Arc::new(SnapshotBackend::new(root, planner))
        }
        other => return Err(Error::invalid_argument(format!("unknown backend {}", other))),
    };

    let backend = match config.cache.as_ref().and_then(cache_provider) {
        Some(cache) => Arc::new(CachingBackend::new(backend, cache)) as Arc<dyn Backend>,
        None => backend,
    };

    backend.open()?;
    info!(backend = backend.name(), cached = config.cache.is_some(), "backend opened");
    Ok(backend)
}

fn cache_provider(config: &CacheConfig) -> Option<Arc<dyn CacheProvider>> {
    match config.provider.as_str() {
        "lru" => Some(Arc::new(LruCacheProvider::new(
            &config.name,
            config.capacity,
            config.ttl_secs.map(Duration::from_secs),
        ))),
        "none" | "" => None,
        other => {
            warn!(provider = other, "unknown cache provider, running without cache");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn builds_each_backend() {
        let memory = open_backend(&EngineConfig::memory()).unwrap();
        assert_eq!(memory.name(), "memory");
        let kv = open_backend(&EngineConfig::memory().with_backend("kv")).unwrap();
        assert_eq!(kv.name(), "kv");
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = open_backend(&EngineConfig::memory().with_backend("cassandra")).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        let err = open_backend(&EngineConfig::memory().with_backend("snapshot")).err().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn unknown_cache_provider_is_not_fatal() {
        let config = EngineConfig::memory().with_cache(CacheConfig {
            provider: "memcached".to_string(),
            ..Default::default()
        });
        let backend = open_backend(&config).unwrap();
        backend.create("blog").unwrap();
        assert!(backend.exists("blog").unwrap());
    }
}
