use std::collections::BTreeMap;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::json;
use tracing::info;
use crate::core::error::{Error, Result};
use crate::core::types::{
    Poly, PolyList, CONFIG_ID, CREATE_DATE_KEY, DEFAULT_ITEM_PER_PAGE, ITEM_PER_PAGE, METADATA_ID,
};

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRecord {
    pub config: Poly,
    pub metadata: Poly,
}

/// Existence, configuration and metadata of the datasets one backend holds.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    datasets: RwLock<BTreeMap<String, DatasetRecord>>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        DatasetRegistry::default()
    }

    /// Returns the dataset's configuration and whether this call created it.
    pub fn create(&self, name: &str) -> Result<(Poly, bool)> {
        validate_name(name)?;
        let mut datasets = self.datasets.write();
        if let Some(record) = datasets.get(name) {
            return Ok((record.config.clone(), false));
        }
        let record = DatasetRecord {
            config: default_config(),
            metadata: default_metadata(),
        };
        let config = record.config.clone();
        datasets.insert(name.to_string(), record);
        info!(dataset = %name, "dataset created");
        Ok((config, true))
    }

    /// Register a dataset loaded from persisted state, replacing any previous record.
    pub fn restore(&self, name: &str, record: DatasetRecord) {
        self.datasets.write().insert(name.to_string(), record);
    }

    pub fn exists(&self, name: &str) -> bool {
        self.datasets.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<DatasetRecord> {
        self.datasets.read().get(name).cloned()
    }

    pub fn config(&self, name: &str) -> Option<Poly> {
        self.datasets.read().get(name).map(|r| r.config.clone())
    }

    pub fn metadata(&self, name: &str) -> Option<Poly> {
        self.datasets.read().get(name).map(|r| r.metadata.clone())
    }

    pub fn set_config(&self, name: &str, config: Poly) -> Result<Poly> {
        let mut datasets = self.datasets.write();
        let record = datasets.get_mut(name).ok_or_else(|| missing_dataset(name))?;
        record.config = rebrand(CONFIG_ID, config);
        Ok(record.config.clone())
    }

    pub fn set_metadata(&self, name: &str, metadata: Poly) -> Result<Poly> {
        let mut datasets = self.datasets.write();
        let record = datasets.get_mut(name).ok_or_else(|| missing_dataset(name))?;
        record.metadata = rebrand(METADATA_ID, metadata);
        Ok(record.metadata.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.datasets.read().keys().cloned().collect()
    }

    pub fn list(&self) -> PolyList {
        self.datasets.read()
            .iter()
            .map(|(name, record)| listing_entry(name, &record.config, &record.metadata))
            .collect()
    }
}

pub fn default_config() -> Poly {
    Poly::new(CONFIG_ID).with(ITEM_PER_PAGE, DEFAULT_ITEM_PER_PAGE)
}

pub fn default_metadata() -> Poly {
    Poly::new(METADATA_ID)
        .with(CREATE_DATE_KEY, Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Entry returned by `Backend::list` for one dataset.
pub fn listing_entry(name: &str, config: &Poly, metadata: &Poly) -> Poly {
    Poly::new(name)
        .with("config", json!(config.data))
        .with("metadata", json!(metadata.data))
}

/// Copy of `poly` under a fixed id; configuration and metadata always carry
/// their well-known ids whatever the caller passed.
pub fn rebrand(id: &str, poly: Poly) -> Poly {
    let mut out = Poly::new(id);
    out.data = poly.data;
    out.metadata = poly.metadata;
    out
}

/// Dataset names double as path and key segments.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control)
    {
        return Err(Error::invalid_argument(format!("invalid dataset name {:?}", name)));
    }
    Ok(())
}

pub fn missing_dataset(name: &str) -> Error {
    Error::not_found(format!("dataset {} does not exist", name))
}
