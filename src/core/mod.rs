pub mod types;
pub mod config;
pub mod error;
pub mod factory;

pub use types::{Poly, PolyList, InsertRequest, InsertOptions};
pub use config::{EngineConfig, CacheConfig, CodecConfig};
pub use error::{Error, ErrorKind, Result};
pub use factory::open_backend;
