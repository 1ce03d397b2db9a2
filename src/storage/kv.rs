use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use crate::codec::packer::{JsonCodec, PolyCodec};
use crate::core::error::{Error, Result};
use crate::core::types::{InsertOptions, InsertRequest, Poly, PolyList, CONFIG_ID, METADATA_ID};
use crate::index::rebuild::RebuildReport;
use crate::index::tag_index::{snapshot_from_counts, TagIndex};
use crate::query::planner::QueryPlanner;
use crate::query::types::{QuerySpec, QueryType};
use crate::storage::adapter::Backend;
use crate::storage::record::{now_millis, validate_ids, StoredPoly};
use crate::storage::registry::{
    default_config, default_metadata, listing_entry, missing_dataset, rebrand, validate_name,
};

/// Byte-valued store with ordered prefix scans.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// All pairs whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        MemoryKvStore::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        (**self).scan_prefix(prefix)
    }
}

/// Key layout under the configured prefix:
///
/// ```text
/// {prefix}datasets            bincode list of dataset names
/// {prefix}{dataset}/config    codec-encoded configuration
/// {prefix}{dataset}/metadata  codec-encoded metadata
/// {prefix}{dataset}/index     bincode tag -> count snapshot
/// {prefix}{dataset}/doc/{id}  codec-encoded document
/// ```
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: &str) -> Self {
        KeySpace { prefix: prefix.to_string() }
    }

    pub fn datasets(&self) -> String {
        format!("{}datasets", self.prefix)
    }

    pub fn config(&self, dataset: &str) -> String {
        format!("{}{}/config", self.prefix, dataset)
    }

    pub fn metadata(&self, dataset: &str) -> String {
        format!("{}{}/metadata", self.prefix, dataset)
    }

    pub fn index(&self, dataset: &str) -> String {
        format!("{}{}/index", self.prefix, dataset)
    }

    pub fn documents(&self, dataset: &str) -> String {
        format!("{}{}/doc/", self.prefix, dataset)
    }

    pub fn document(&self, dataset: &str, id: &str) -> String {
        format!("{}{}", self.documents(dataset), id)
    }
}

/// In-process view of one dataset. `write` serializes mutation batches so
/// rescans are applied in the order the batches finished.
#[derive(Default)]
struct KvDataset {
    index: TagIndex,
    write: Mutex<()>,
}

/// Key-value backend. The stored documents are authoritative; the tag index
/// is recomputed by rescanning them after every mutation batch.
pub struct KvBackend<S: KvStore = MemoryKvStore> {
    store: S,
    keys: KeySpace,
    codec: Box<dyn PolyCodec>,
    planner: QueryPlanner,
    datasets: RwLock<HashMap<String, Arc<KvDataset>>>,
    names: Mutex<()>,
    loading: Mutex<()>,
    sequence: AtomicU64,
}

impl<S: KvStore> KvBackend<S> {
    pub fn new(store: S, prefix: &str, planner: QueryPlanner) -> Self {
        KvBackend {
            store,
            keys: KeySpace::new(prefix),
            codec: Box::new(JsonCodec),
            planner,
            datasets: RwLock::new(HashMap::new()),
            names: Mutex::new(()),
            loading: Mutex::new(()),
            sequence: AtomicU64::new(1),
        }
    }

    pub fn with_codec(mut self, codec: Box<dyn PolyCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    fn names(&self) -> Result<BTreeSet<String>> {
        match self.store.get(&self.keys.datasets())? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(BTreeSet::new()),
        }
    }

    fn get_poly(&self, key: &str) -> Result<Option<Poly>> {
        match self.store.get(key)? {
            Some(bytes) => Ok(Some(self.codec.decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_poly(&self, key: &str, poly: &Poly) -> Result<()> {
        self.store.put(key, self.codec.encode(poly)?)
    }

    fn require(&self, dataset: &str) -> Result<()> {
        if self.store.get(&self.keys.config(dataset))?.is_none() {
            return Err(missing_dataset(dataset));
        }
        Ok(())
    }

    fn stored_documents(&self, dataset: &str) -> Result<Vec<StoredPoly>> {
        let prefix = self.keys.documents(dataset);
        let mut documents = Vec::new();
        for (key, bytes) in self.store.scan_prefix(&prefix)? {
            match self.codec.decode(&bytes).and_then(StoredPoly::from_poly) {
                Ok(stored) => documents.push(stored),
                Err(e) => warn!(dataset, key = %key, error = %e, "skipping undecodable document"),
            }
        }
        Ok(documents)
    }

    fn load_document(&self, dataset: &str, id: &str) -> Result<Option<StoredPoly>> {
        match self.store.get(&self.keys.document(dataset, id))? {
            Some(bytes) => Ok(Some(StoredPoly::from_poly(self.codec.decode(&bytes)?)?)),
            None => Ok(None),
        }
    }

    /// Dataset view with an index built from the store on first use.
    fn dataset(&self, dataset: &str) -> Result<Arc<KvDataset>> {
        if let Some(ds) = self.datasets.read().get(dataset) {
            return Ok(ds.clone());
        }
        self.require(dataset)?;

        let _loading = self.loading.lock();
        if let Some(ds) = self.datasets.read().get(dataset) {
            return Ok(ds.clone());
        }

        // Published only once the rescan succeeds, so a failed load is retried.
        let fresh = KvDataset::default();
        self.rescan(dataset, &fresh)?;
        let ds = Arc::new(fresh);
        self.datasets.write().insert(dataset.to_string(), ds.clone());
        Ok(ds)
    }

    /// Recompute the tag index from the stored documents and persist the counts.
    /// Callers hold the dataset's write lock or own it before it is published.
    fn rescan(&self, dataset: &str, ds: &KvDataset) -> Result<RebuildReport> {
        let documents = self.stored_documents(dataset)?;
        if let Some(max_seq) = documents.iter().map(|d| d.seq).max() {
            self.sequence.fetch_max(max_seq + 1, Ordering::Relaxed);
        }
        let entries = documents.iter().map(StoredPoly::index_entry).collect();
        let report = ds.index.recalculate(entries);
        let counts = ds.index.counts();
        self.store.put(&self.keys.index(dataset), bincode::serialize(&counts)?)?;
        debug!(dataset, documents = report.documents, tags = report.tags, "index rescanned");
        Ok(report)
    }

    /// Rescan after a failed batch and report how much of it landed.
    fn fail_batch(&self, dataset: &str, ds: &KvDataset, applied: usize, total: usize, cause: Error) -> Error {
        if let Err(e) = self.rescan(dataset, ds) {
            warn!(dataset, error = %e, "rescan after failed batch also failed");
        }
        warn!(dataset, applied, total, error = %cause, "batch partly applied");
        Error::partial_batch(applied, total, cause)
    }
}

impl Default for KvBackend<MemoryKvStore> {
    fn default() -> Self {
        KvBackend::new(MemoryKvStore::new(), "", QueryPlanner::default())
    }
}

impl<S: KvStore> Backend for KvBackend<S> {
    fn name(&self) -> &str {
        "kv"
    }

    fn create(&self, dataset: &str) -> Result<Poly> {
        validate_name(dataset)?;
        let _guard = self.names.lock();
        if let Some(config) = self.get_poly(&self.keys.config(dataset))? {
            return Ok(config);
        }

        let config = default_config();
        self.put_poly(&self.keys.metadata(dataset), &default_metadata())?;
        self.put_poly(&self.keys.config(dataset), &config)?;
        let mut names = self.names()?;
        names.insert(dataset.to_string());
        self.store.put(&self.keys.datasets(), bincode::serialize(&names)?)?;

        info!(dataset = %dataset, "dataset created");
        Ok(config)
    }

    fn exists(&self, dataset: &str) -> Result<bool> {
        Ok(self.store.get(&self.keys.config(dataset))?.is_some())
    }

    fn config(&self, dataset: &str) -> Result<Option<Poly>> {
        self.get_poly(&self.keys.config(dataset))
    }

    fn set_config(&self, dataset: &str, config: Poly) -> Result<Poly> {
        self.require(dataset)?;
        let config = rebrand(CONFIG_ID, config);
        self.put_poly(&self.keys.config(dataset), &config)?;
        Ok(config)
    }

    fn metadata(&self, dataset: &str) -> Result<Option<Poly>> {
        self.get_poly(&self.keys.metadata(dataset))
    }

    fn set_metadata(&self, dataset: &str, metadata: Poly) -> Result<Poly> {
        self.require(dataset)?;
        let metadata = rebrand(METADATA_ID, metadata);
        self.put_poly(&self.keys.metadata(dataset), &metadata)?;
        Ok(metadata)
    }

    fn index(&self, dataset: &str) -> Result<Poly> {
        self.dataset(dataset)?;
        match self.store.get(&self.keys.index(dataset))? {
            Some(bytes) => {
                let counts: BTreeMap<String, u64> = bincode::deserialize(&bytes)?;
                Ok(snapshot_from_counts(&counts))
            }
            None => Ok(self.dataset(dataset)?.index.snapshot()),
        }
    }

    fn tag_data(&self, dataset: &str, tag: &str) -> Result<Option<Poly>> {
        Ok(self.dataset(dataset)?.index.tag_data(tag))
    }

    fn insert_with_options(
        &self,
        dataset: &str,
        options: &InsertOptions,
        requests: Vec<InsertRequest>,
    ) -> Result<PolyList> {
        let ds = self.dataset(dataset)?;
        validate_ids(requests.iter().map(|r| r.poly.id()))?;

        let _guard = ds.write.lock();
        let timestamp = now_millis();
        let total = requests.len();
        let mut out = PolyList::new();
        for (applied, request) in requests.into_iter().enumerate() {
            let tags = request.effective_tags(options);
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let stored = StoredPoly::new(request.poly, tags, timestamp, seq);
            let poly = stored.to_poly();

            let written = self.codec.encode(&poly)
                .and_then(|bytes| self.store.put(&self.keys.document(dataset, stored.id()), bytes));
            if let Err(cause) = written {
                return Err(self.fail_batch(dataset, &ds, applied, total, cause));
            }
            out.push(poly);
        }

        self.rescan(dataset, &ds)?;
        debug!(dataset, documents = total, "insert applied");
        Ok(out)
    }

    fn read(&self, dataset: &str, ids: &[String]) -> Result<PolyList> {
        self.require(dataset)?;
        let mut out = PolyList::new();
        for id in ids {
            if let Some(stored) = self.load_document(dataset, id)? {
                out.push(stored.to_poly());
            }
        }
        Ok(out)
    }

    fn remove(&self, dataset: &str, ids: &[String]) -> Result<PolyList> {
        let ds = self.dataset(dataset)?;
        let _guard = ds.write.lock();
        let mut removed = PolyList::new();
        for (applied, id) in ids.iter().enumerate() {
            let step = self.load_document(dataset, id).and_then(|found| {
                if found.is_some() {
                    self.store.delete(&self.keys.document(dataset, id))?;
                }
                Ok(found)
            });
            match step {
                Ok(Some(stored)) => removed.push(stored.to_poly()),
                Ok(None) => {}
                Err(cause) => return Err(self.fail_batch(dataset, &ds, applied, ids.len(), cause)),
            }
        }

        self.rescan(dataset, &ds)?;
        debug!(dataset, requested = ids.len(), removed = removed.len(), "remove applied");
        Ok(removed)
    }

    fn query(&self, dataset: &str, spec: &QuerySpec) -> Result<PolyList> {
        if spec.query_type == QueryType::Search {
            return Err(Error::unsupported("SEARCH on kv backend"));
        }
        let plan = self.planner.plan(dataset, self.config(dataset)?.as_ref(), spec)?;
        let ds = self.dataset(dataset)?;
        let polys = self.planner.execute(&ds.index, &plan, |id| {
            Ok(self.load_document(dataset, id)?.map(|s| s.to_poly()))
        })?;
        Ok(polys.into())
    }

    fn count(&self, dataset: &str, spec: &QuerySpec) -> Result<u64> {
        if spec.query_type == QueryType::Search {
            return Err(Error::unsupported("SEARCH on kv backend"));
        }
        let plan = self.planner.plan(dataset, self.config(dataset)?.as_ref(), spec)?;
        let ds = self.dataset(dataset)?;
        self.planner.count(&ds.index, &plan, |id| {
            Ok(self.load_document(dataset, id)?.map(|s| s.to_poly()))
        })
    }

    fn list(&self) -> Result<PolyList> {
        let mut out = PolyList::new();
        for name in self.names()? {
            let config = self.config(&name)?.unwrap_or_else(default_config);
            let metadata = self.metadata(&name)?.unwrap_or_else(default_metadata);
            out.push(listing_entry(&name, &config, &metadata));
        }
        Ok(out)
    }

    fn recalculate(&self, dataset: &str) -> Result<RebuildReport> {
        let ds = self.dataset(dataset)?;
        let _guard = ds.write.lock();
        self.rescan(dataset, &ds)
    }
}
