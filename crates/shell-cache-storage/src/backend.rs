//! Cache storage trait

use async_trait::async_trait;

use crate::entry::{CachedResponse, RequestKey};
use crate::error::StorageError;

/// Partitioned cache storage
///
/// A store holds any number of independently named partitions, each a map
/// from request identity to response snapshot. Writes are atomic per key;
/// concurrent writers to the same key race and the last one wins.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open a partition, creating it if it does not exist
    async fn open(&self, partition: &str) -> Result<(), StorageError>;

    /// Look up an entry. A missing partition is a miss, not an error.
    async fn get(
        &self,
        partition: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError>;

    /// Store an entry, creating the partition if needed and replacing any
    /// previous entry for the key
    async fn put(
        &self,
        partition: &str,
        key: &RequestKey,
        response: CachedResponse,
    ) -> Result<(), StorageError>;

    /// Remove a single entry
    async fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool, StorageError>;

    /// List the keys stored in a partition
    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, StorageError>;

    /// Delete a whole partition
    async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError>;

    /// List existing partition names
    async fn list_partitions(&self) -> Result<Vec<String>, StorageError>;
}

/// Validate a partition name (must be usable as a single directory name)
pub fn validate_partition_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(StorageError::InvalidPartition(name.to_string()));
    }

    if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
    {
        return Err(StorageError::InvalidPartition(name.to_string()));
    }

    Ok(())
}
