//! Shell Cache Storage Layer
//!
//! This crate provides the partitioned cache store used by the
//! orchestrator, with in-memory and local disk backends.

pub mod backend;
pub mod entry;
pub mod error;
pub mod local;
pub mod memory;

pub use backend::{CacheStorage, validate_partition_name};
pub use entry::{CachedResponse, RequestKey};
pub use error::StorageError;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
