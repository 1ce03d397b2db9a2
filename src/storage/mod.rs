pub mod adapter;
pub mod registry;
pub mod record;
pub mod layout;
pub mod file_lock;
pub mod persist;
pub mod memory;
pub mod kv;
pub mod snapshot;

pub use adapter::Backend;
