use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};
use crate::codec::packer::{JsonCodec, PolyCodec};
use crate::core::error::Result;
use crate::core::types::{InsertOptions, InsertRequest, Poly, PolyList};
use crate::index::rebuild::RebuildReport;
use crate::index::tag_index::TagIndex;
use crate::query::planner::QueryPlanner;
use crate::query::types::QuerySpec;
use crate::storage::adapter::Backend;
use crate::storage::file_lock::FileLock;
use crate::storage::layout::StorageLayout;
use crate::storage::persist;
use crate::storage::record::{now_millis, validate_ids, StoredPoly};
use crate::storage::registry::{missing_dataset, DatasetRecord, DatasetRegistry};

/// Documents and tag index of one dataset.
///
/// Lock order: `documents` before the index, for readers and writers alike.
#[derive(Default)]
struct MemoryDataset {
    documents: RwLock<HashMap<String, StoredPoly>>,
    index: TagIndex,
}

impl MemoryDataset {
    fn load(&self, stored: Vec<StoredPoly>) {
        let mut documents = self.documents.write();
        let entries = stored.iter().map(StoredPoly::index_entry).collect();
        for s in stored {
            documents.insert(s.id().to_string(), s);
        }
        self.index.insert_batch(entries);
    }

    fn rebuild(&self) -> RebuildReport {
        let documents = self.documents.read();
        let entries = documents.values().map(StoredPoly::index_entry).collect();
        self.index.recalculate(entries)
    }
}

struct OpenStore {
    layout: StorageLayout,
    _lock: FileLock,
}

/// Reference backend: everything in process memory, tag index maintained
/// incrementally. With a root directory, `open` loads and `close` saves one
/// file per dataset.
pub struct MemoryBackend {
    registry: DatasetRegistry,
    datasets: RwLock<HashMap<String, Arc<MemoryDataset>>>,
    planner: QueryPlanner,
    codec: Box<dyn PolyCodec>,
    root: Option<PathBuf>,
    store: Mutex<Option<OpenStore>>,
    sequence: AtomicU64,
}

impl MemoryBackend {
    pub fn new(planner: QueryPlanner) -> Self {
        MemoryBackend {
            registry: DatasetRegistry::new(),
            datasets: RwLock::new(HashMap::new()),
            planner,
            codec: Box::new(JsonCodec),
            root: None,
            store: Mutex::new(None),
            sequence: AtomicU64::new(1),
        }
    }

    /// Persist datasets under `root` using `codec` for document bytes.
    pub fn with_persistence(mut self, root: impl Into<PathBuf>, codec: Box<dyn PolyCodec>) -> Self {
        self.root = Some(root.into());
        self.codec = codec;
        self
    }

    /// Write every dataset to disk without closing.
    pub fn flush(&self) -> Result<()> {
        let store = self.store.lock();
        let Some(store) = store.as_ref() else {
            return Ok(());
        };
        for name in self.registry.names() {
            let (Some(record), Ok(dataset)) = (self.registry.get(&name), self.dataset(&name)) else {
                continue;
            };
            let documents = dataset.documents.read();
            let path = store.layout.dataset_path(&name);
            let count = persist::save_dataset(&path, self.codec.as_ref(), &name, &record, documents.values())?;
            info!(dataset = %name, documents = count, path = %path.display(), "dataset saved");
        }
        Ok(())
    }

    /// Register a dataset with pre-built documents, keeping their timestamps.
    pub(crate) fn restore(&self, name: &str, record: DatasetRecord, documents: Vec<StoredPoly>) {
        if let Some(max_seq) = documents.iter().map(|d| d.seq).max() {
            self.sequence.fetch_max(max_seq + 1, Ordering::Relaxed);
        }
        self.registry.restore(name, record);
        let dataset = Arc::new(MemoryDataset::default());
        dataset.load(documents);
        self.datasets.write().insert(name.to_string(), dataset);
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Clamped decrements seen by the dataset's index.
    pub fn index_inconsistencies(&self, dataset: &str) -> Result<u64> {
        Ok(self.dataset(dataset)?.index.inconsistencies())
    }

    fn dataset(&self, name: &str) -> Result<Arc<MemoryDataset>> {
        self.datasets.read()
            .get(name)
            .cloned()
            .ok_or_else(|| missing_dataset(name))
    }

    fn load_all(&self, layout: &StorageLayout) -> Result<()> {
        for path in layout.dataset_files()? {
            let loaded = persist::load_dataset(&path, self.codec.as_ref())?;
            info!(
                dataset = %loaded.name,
                documents = loaded.documents.len(),
                path = %path.display(),
                "dataset loaded"
            );
            self.restore(&loaded.name, loaded.record, loaded.documents);
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend::new(QueryPlanner::default())
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&self) -> Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let mut store = self.store.lock();
        if store.is_some() {
            return Ok(());
        }
        let layout = StorageLayout::new(root.clone())?;
        let lock = FileLock::acquire(&layout)?;
        self.load_all(&layout)?;
        *store = Some(OpenStore { layout, _lock: lock });
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.flush()?;
        self.store.lock().take();
        Ok(())
    }

    fn create(&self, dataset: &str) -> Result<Poly> {
        let (config, _) = self.registry.create(dataset)?;
        // A caller that lost the registry race still needs the entry before it returns.
        self.datasets.write()
            .entry(dataset.to_string())
            .or_default();
        Ok(config)
    }

    fn exists(&self, dataset: &str) -> Result<bool> {
        Ok(self.registry.exists(dataset))
    }

    fn config(&self, dataset: &str) -> Result<Option<Poly>> {
        Ok(self.registry.config(dataset))
    }

    fn set_config(&self, dataset: &str, config: Poly) -> Result<Poly> {
        self.registry.set_config(dataset, config)
    }

    fn metadata(&self, dataset: &str) -> Result<Option<Poly>> {
        Ok(self.registry.metadata(dataset))
    }

    fn set_metadata(&self, dataset: &str, metadata: Poly) -> Result<Poly> {
        self.registry.set_metadata(dataset, metadata)
    }

    fn index(&self, dataset: &str) -> Result<Poly> {
        Ok(self.dataset(dataset)?.index.snapshot())
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

        let timestamp = now_millis();
        let total = requests.len();
        let stored: Vec<StoredPoly> = requests
            .into_iter()
            .map(|request| {
                let tags = request.effective_tags(options);
                StoredPoly::new(request.poly, tags, timestamp, self.next_seq())
            })
            .collect();

        let mut out = PolyList::new();
        let mut entries = Vec::with_capacity(stored.len());
        let mut documents = ds.documents.write();
        for s in stored {
            out.push(s.to_poly());
            if !options.defer_index {
                entries.push(s.index_entry());
            }
            documents.insert(s.id().to_string(), s);
        }

        if options.defer_index {
            let all = documents.values().map(StoredPoly::index_entry).collect();
            ds.index.recalculate(all);
        } else {
            ds.index.insert_batch(entries);
        }
        drop(documents);

        debug!(dataset, documents = total, deferred = options.defer_index, "insert applied");
        Ok(out)
    }

    fn read(&self, dataset: &str, ids: &[String]) -> Result<PolyList> {
        let ds = self.dataset(dataset)?;
        let documents = ds.documents.read();
        Ok(ids.iter()
            .filter_map(|id| documents.get(id))
            .map(StoredPoly::to_poly)
            .collect())
    }

    fn remove(&self, dataset: &str, ids: &[String]) -> Result<PolyList> {
        let ds = self.dataset(dataset)?;
        let mut documents = ds.documents.write();
        let mut removed = PolyList::new();
        for id in ids {
            if let Some(stored) = documents.remove(id) {
                removed.push(stored.to_poly());
            }
        }
        ds.index.remove_batch(removed.iter().map(Poly::id));
        drop(documents);

        debug!(dataset, requested = ids.len(), removed = removed.len(), "remove applied");
        Ok(removed)
    }

    fn query(&self, dataset: &str, spec: &QuerySpec) -> Result<PolyList> {
        let plan = self.planner.plan(dataset, self.registry.config(dataset).as_ref(), spec)?;
        let ds = self.dataset(dataset)?;
        let documents = ds.documents.read();
        let polys = self.planner.execute(&ds.index, &plan, |id| {
            Ok(documents.get(id).map(StoredPoly::to_poly))
        })?;
        Ok(polys.into())
    }

    fn count(&self, dataset: &str, spec: &QuerySpec) -> Result<u64> {
        let plan = self.planner.plan(dataset, self.registry.config(dataset).as_ref(), spec)?;
        let ds = self.dataset(dataset)?;
        let documents = ds.documents.read();
        self.planner.count(&ds.index, &plan, |id| {
            Ok(documents.get(id).map(StoredPoly::to_poly))
        })
    }

    fn list(&self) -> Result<PolyList> {
        Ok(self.registry.list())
    }

    fn recalculate(&self, dataset: &str) -> Result<RebuildReport> {
        Ok(self.dataset(dataset)?.rebuild())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::types::DATE_TAG;

    fn backend_with_blog() -> MemoryBackend {
        let backend = MemoryBackend::default();
        backend.create("blog").unwrap();
        backend
    }

    fn ids(list: &PolyList) -> Vec<String> {
        list.iter().map(|p| p.id().to_string()).collect()
    }

    #[test]
    fn insert_reports_write_metadata() {
        let backend = backend_with_blog();
        let out = backend
            .insert("blog", vec![InsertRequest::new(Poly::new("p1")).tag("rust")])
            .unwrap();
        let tags = out.get("p1").unwrap().tags();
        assert!(tags.contains("rust"));
        assert!(tags.contains(DATE_TAG));
    }

    #[test]
    fn missing_dataset_errors() {
        let backend = MemoryBackend::default();
        let err = backend.read("ghost", &["a".to_string()]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let err = backend.query("ghost", &QuerySpec::pages()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotConfigured);
    }

    #[test]
    fn batch_with_blank_id_applies_nothing() {
        let backend = backend_with_blog();
        let err = backend
            .insert("blog", vec![InsertRequest::new(Poly::new("ok")), InsertRequest::new(Poly::new(""))])
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(backend.read("blog", &["ok".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn deferred_index_matches_incremental() {
        let incremental = backend_with_blog();
        let deferred = backend_with_blog();
        let requests = || (0..20)
            .map(|i| InsertRequest::new(Poly::new(format!("d{}", i))).tag(format!("t{}", i % 3)))
            .collect::<Vec<_>>();

        incremental.insert("blog", requests()).unwrap();
        let options = InsertOptions { defer_index: true, ..Default::default() };
        deferred.insert_with_options("blog", &options, requests()).unwrap();

        assert_eq!(incremental.index("blog").unwrap(), deferred.index("blog").unwrap());
        let spec = QuerySpec::pages().tag("t1").item_per_page(50);
        assert_eq!(
            ids(&incremental.query("blog", &spec).unwrap()),
            ids(&deferred.query("blog", &spec).unwrap())
        );
    }

    #[test]
    fn remove_returns_only_present_documents() {
        let backend = backend_with_blog();
        backend.insert("blog", vec![InsertRequest::new(Poly::new("a"))]).unwrap();
        let removed = backend.remove("blog", &["a".to_string(), "zz".to_string()]).unwrap();
        assert_eq!(ids(&removed), vec!["a"]);
        assert!(backend.remove("blog", &["a".to_string()]).unwrap().is_empty());
        assert_eq!(backend.index_inconsistencies("blog").unwrap(), 0);
    }

    #[test]
    fn search_matches_all_terms() {
        let backend = backend_with_blog();
        backend.insert("blog", vec![
            InsertRequest::new(Poly::new("a").with("title", "Rust async runtimes")),
            InsertRequest::new(Poly::new("b").with("title", "Rust macros")),
        ]).unwrap();
        let found = backend.query("blog", &QuerySpec::search("rust ASYNC")).unwrap();
        assert_eq!(ids(&found), vec!["a"]);
        assert_eq!(backend.count("blog", &QuerySpec::search("rust")).unwrap(), 2);
    }
}
