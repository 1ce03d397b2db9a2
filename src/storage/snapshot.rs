use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use tracing::{error, info};
use crate::core::error::{Error, Result};
use crate::core::types::{
    InsertOptions, InsertRequest, Poly, PolyList, Value, CONFIG_ID, DATE_TAG,
};
use crate::index::rebuild::RebuildReport;
use crate::query::planner::QueryPlanner;
use crate::query::types::QuerySpec;
use crate::storage::adapter::Backend;
use crate::storage::memory::MemoryBackend;
use crate::storage::record::StoredPoly;
use crate::storage::registry::{default_config, default_metadata, validate_name, DatasetRecord};

pub const DATASET_FILE: &str = "polydata.json";
pub const DATA_DIR: &str = "data";
pub const FILE_METADATA_KEY: &str = "_metadata";
pub const FILE_INDEX_KEY: &str = "_index";
pub const FILE_TIMESTAMP_KEY: &str = "_timestamp";

/// Read-only backend over a directory tree of JSON files:
///
/// ```text
/// <root>/<dataset>/polydata.json        configuration, `_metadata` for metadata
/// <root>/<dataset>/data/**/*.json       one document per file
/// ```
///
/// A document file's `_metadata._index` lists its tags; every document is
/// also filed under the chronological tag. Write paths are unsupported.
pub struct SnapshotBackend {
    root: PathBuf,
    inner: MemoryBackend,
    loaded: Mutex<bool>,
}

impl SnapshotBackend {
    pub fn new(root: impl Into<PathBuf>, planner: QueryPlanner) -> Self {
        SnapshotBackend {
            root: root.into(),
            inner: MemoryBackend::new(planner),
            loaded: Mutex::new(false),
        }
    }

    fn load_dataset(&self, dir: &Path, name: &str) -> Result<()> {
        let mut record = DatasetRecord {
            config: default_config(),
            metadata: default_metadata(),
        };
        let dataset_file = dir.join(DATASET_FILE);
        if dataset_file.is_file() {
            let (config, metadata) = read_flat_file(&dataset_file, CONFIG_ID)?;
            record.config.data.extend(config.data);
            record.metadata.data.extend(metadata.unwrap_or_default());
        }

        let mut files = Vec::new();
        collect_json_files(&dir.join(DATA_DIR), &mut files)?;
        files.sort();

        let mut documents = Vec::with_capacity(files.len());
        for (position, path) in files.iter().enumerate() {
            let fallback_id = path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match read_flat_file(path, &fallback_id) {
                Ok((poly, file_metadata)) => {
                    let metadata = file_metadata.unwrap_or_default();
                    let mut tags: BTreeSet<String> = match metadata.get(FILE_INDEX_KEY) {
                        Some(Value::Array(items)) => items.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect(),
                        _ => BTreeSet::new(),
                    };
                    tags.insert(DATE_TAG.to_string());
                    let timestamp = poly.fetch(FILE_TIMESTAMP_KEY).and_then(Value::as_i64).unwrap_or(0);
                    let mut poly = poly;
                    poly.metadata.extend(metadata);
                    documents.push(StoredPoly::new(poly, tags, timestamp, position as u64 + 1));
                }
                Err(e) => error!(dataset = %name, path = %path.display(), error = %e, "failed to load file"),
            }
        }

        info!(dataset = %name, documents = documents.len(), "snapshot dataset loaded");
        self.inner.restore(name, record, documents);
        Ok(())
    }
}

/// A JSON object whose `_id` (or the fallback) names it and whose
/// `_metadata` object is split off.
fn read_flat_file(path: &Path, fallback_id: &str) -> Result<(Poly, Option<serde_json::Map<String, Value>>)> {
    let raw: Value = serde_json::from_slice(&fs::read(path)?)?;
    let Value::Object(mut fields) = raw else {
        return Err(Error::invalid_argument(format!("{} is not a JSON object", path.display())));
    };
    let metadata = match fields.remove(FILE_METADATA_KEY) {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    };
    let id = match fields.remove("_id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id,
        _ => fallback_id.to_string(),
    };
    let mut poly = Poly::new(id);
    poly.data.extend(fields);
    Ok((poly, metadata))
}

fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

impl Backend for SnapshotBackend {
    fn name(&self) -> &str {
        "snapshot"
    }

    /// Scan the root directory; each subdirectory is one dataset.
    fn open(&self) -> Result<()> {
        let mut loaded = self.loaded.lock();
        if *loaded {
            return Ok(());
        }
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        dirs.sort();
        for dir in dirs {
            let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if validate_name(&name).is_err() {
                continue;
            }
            self.load_dataset(&dir, &name)?;
        }
        *loaded = true;
        Ok(())
    }

    fn create(&self, _dataset: &str) -> Result<Poly> {
        Err(Error::unsupported("create on read-only snapshot"))
    }

    fn exists(&self, dataset: &str) -> Result<bool> {
        self.inner.exists(dataset)
    }

    fn config(&self, dataset: &str) -> Result<Option<Poly>> {
        self.inner.config(dataset)
    }

    fn set_config(&self, _dataset: &str, _config: Poly) -> Result<Poly> {
        Err(Error::unsupported("set_config on read-only snapshot"))
    }

    fn metadata(&self, dataset: &str) -> Result<Option<Poly>> {
        self.inner.metadata(dataset)
    }

    fn set_metadata(&self, _dataset: &str, _metadata: Poly) -> Result<Poly> {
        Err(Error::unsupported("set_metadata on read-only snapshot"))
    }

    fn index(&self, dataset: &str) -> Result<Poly> {
        self.inner.index(dataset)
    }

    fn tag_data(&self, dataset: &str, tag: &str) -> Result<Option<Poly>> {
        self.inner.tag_data(dataset, tag)
    }

    fn insert_with_options(
        &self,
        _dataset: &str,
        _options: &InsertOptions,
        _requests: Vec<InsertRequest>,
    ) -> Result<PolyList> {
        Err(Error::unsupported("insert on read-only snapshot"))
    }

    fn update(&self, _dataset: &str, _requests: Vec<InsertRequest>) -> Result<PolyList> {
        Err(Error::unsupported("update on read-only snapshot"))
    }

    fn read(&self, dataset: &str, ids: &[String]) -> Result<PolyList> {
        self.inner.read(dataset, ids)
    }

    fn remove(&self, _dataset: &str, _ids: &[String]) -> Result<PolyList> {
        Err(Error::unsupported("remove on read-only snapshot"))
    }

    fn query(&self, dataset: &str, spec: &QuerySpec) -> Result<PolyList> {
        self.inner.query(dataset, spec)
    }

    fn count(&self, dataset: &str, spec: &QuerySpec) -> Result<u64> {
        self.inner.count(dataset, spec)
    }

    fn list(&self) -> Result<PolyList> {
        self.inner.list()
    }

    fn recalculate(&self, dataset: &str) -> Result<RebuildReport> {
        self.inner.recalculate(dataset)
    }
}
