use std::path::PathBuf;
use serde::{Serialize, Deserialize};
use crate::codec::packer::CompressionType;
use crate::core::error::Result;
use crate::core::types::{Value, DEFAULT_ITEM_PER_PAGE};

/// Engine wiring document.
///
/// ```json
/// {
///   "backend": "kv",
///   "key_prefix": "blog:",
///   "codec": { "compression": "Zstd" },
///   "cache": { "provider": "lru", "name": "polys", "capacity": 4096, "ttl_secs": 30 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: String,
    pub root: Option<PathBuf>,           // memory: persistence dir, snapshot: source dir
    pub key_prefix: String,              // kv only
    pub codec: CodecConfig,
    pub default_item_per_page: usize,
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    pub compression: CompressionType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub provider: String,
    pub name: String,
    pub capacity: usize,
    pub ttl_secs: Option<u64>,
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn memory() -> Self {
        EngineConfig::default()
    }

    pub fn with_backend(mut self, backend: &str) -> Self {
        self.backend = backend.to_string();
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            backend: "memory".to_string(),
            root: None,
            key_prefix: String::new(),
            codec: CodecConfig::default(),
            default_item_per_page: DEFAULT_ITEM_PER_PAGE,
            cache: None,
        }
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            compression: CompressionType::None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            provider: "lru".to_string(),
            name: "polydex".to_string(),
            capacity: 10_000,
            ttl_secs: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_document() {
        let config = EngineConfig::from_json(
            r#"{"backend": "kv", "cache": {"provider": "lru", "ttl_secs": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.backend, "kv");
        assert_eq!(config.default_item_per_page, 10);
        let cache = config.cache.unwrap();
        assert_eq!(cache.capacity, 10_000);
        assert_eq!(cache.ttl_secs, Some(5));
    }

    #[test]
    fn rejects_malformed_document() {
        assert!(EngineConfig::from_json("{\"backend\": 3}").is_err());
    }
}
