pub mod core;
pub mod analysis;
pub mod codec;
pub mod index;
pub mod query;
pub mod cache;
pub mod storage;

pub use crate::core::{
    open_backend, CacheConfig, CodecConfig, EngineConfig, Error, ErrorKind, InsertOptions,
    InsertRequest, Poly, PolyList, Result,
};
pub use crate::core::types::{DATE_TAG, DEFAULT_ITEM_PER_PAGE};
pub use crate::cache::{CacheProvider, CachedValue, CachingBackend, LruCacheProvider};
pub use crate::index::{RebuildReport, TagIndex};
pub use crate::query::types::{QuerySpec, QueryType};
pub use crate::storage::adapter::Backend;
pub use crate::storage::kv::{KvBackend, KvStore, MemoryKvStore};
pub use crate::storage::memory::MemoryBackend;
pub use crate::storage::snapshot::SnapshotBackend;

/*
┌──────────────────────────────────────────────────────────────────────────────────┐
│                              POLYDEX ARCHITECTURE                                 │
└──────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── CALLER SURFACE ──────────────────────────────────┐
│                                                                                  │
│  open_backend(&EngineConfig) ──> Arc<dyn Backend>                                │
│                                                                                  │
│  ┌────────────────────────────────────────────────────────────────────────────┐ │
│  │ struct CachingBackend                     // optional, cache: Some(..)      │ │
│  │ • inner: Arc<dyn Backend>                                                   │ │
│  │ • cache: Option<Arc<dyn CacheProvider>>   // LruCacheProvider               │ │
│  │   write-through: config / metadata / read-by-id                             │ │
│  │   read-through:  index / tag / query pages / counts (RANDOM bypasses)       │ │
│  └────────────────────────────────────────────────────────────────────────────┘ │
└──────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────── BACKEND LAYER ───────────────────────────────────┐
│                                                                                  │
│  ┌──────────────────────┐  ┌───────────────────────┐  ┌──────────────────────┐  │
│  │ MemoryBackend        │  │ KvBackend<S: KvStore> │  │ SnapshotBackend      │  │
│  │ • DatasetRegistry    │  │ • KeySpace            │  │ • root: PathBuf      │  │
│  │ • TagIndex per ds    │  │ • TagIndex per ds     │  │ • inner: Memory      │  │
│  │   (incremental)      │  │   (rescan per batch)  │  │   (read-only)        │  │
│  │ • persist: .poly     │  │ • codec bytes         │  │ • JSON file tree     │  │
│  │ • FileLock (.lock)   │  │                       │  │                      │  │
│  └──────────────────────┘  └───────────────────────┘  └──────────────────────┘  │
└──────────────────────────────────────────────────────────────────────────────────┘

┌────────────────────────────── INDEX / QUERY LAYER ───────────────────────────────┐
│                                                                                  │
│  ┌────────────────────────────┐        ┌──────────────────────────────────────┐ │
│  │ struct TagIndex            │        │ struct QueryPlanner                   │ │
│  │ • state: RwLock<IndexState>│ <──────│ • plan(spec) -> QueryPlan             │ │
│  │   tag -> {count, members}  │        │   Page / Random / Filtered            │ │
│  │   members: BTreeSet<Key>   │        │ • execute / count                     │ │
│  │   (ts desc, seq desc, id)  │        │ • DocumentMatcher: Search | Custom    │ │
│  │ • recalculate (rayon)      │        └──────────────────────────────────────┘ │
│  └────────────────────────────┘                                                  │
└──────────────────────────────────────────────────────────────────────────────────┘

  Poly ──stored as──> StoredPoly {poly, tags, timestamp, seq} ──indexed as──> IndexEntry
  PolyCodec (Json | Compressed{LZ4,Zstd,Snappy}) ──bytes for──> .poly files / KvStore
*/
