use std::path::PathBuf;
use std::fs;
use crate::core::error::Result;

pub const DATASET_EXTENSION: &str = "poly";

/// Directory holding one `<dataset>.poly` file per dataset and the lock file
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        Ok(StorageLayout { base_dir })
    }

    pub fn dataset_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{}.{}", name, DATASET_EXTENSION))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }

    /// Every dataset file currently on disk, sorted by path.
    pub fn dataset_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == DATASET_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}
