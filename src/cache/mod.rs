pub mod key;
pub mod provider;
pub mod overlay;

pub use overlay::CachingBackend;
pub use provider::{CacheProvider, CachedValue, LruCacheProvider};
