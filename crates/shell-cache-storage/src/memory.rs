//! In-memory storage backend

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::backend::{CacheStorage, validate_partition_name};
use crate::entry::{CachedResponse, RequestKey};
use crate::error::StorageError;

type Partition = HashMap<String, (RequestKey, CachedResponse)>;

/// In-memory storage backend
///
/// Contents do not survive a restart. Useful for tests and for hosts
/// that only need offline support for the lifetime of the process.
#[derive(Default)]
pub struct MemoryStorage {
    partitions: RwLock<BTreeMap<String, Partition>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a partition (0 if it does not exist)
    pub fn len(&self, partition: &str) -> usize {
        self.partitions
            .read()
            .get(partition)
            .map(|p| p.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, partition: &str) -> Result<(), StorageError> {
        validate_partition_name(partition)?;
        self.partitions
            .write()
            .entry(partition.to_string())
            .or_default();
        Ok(())
    }

    async fn get(
        &self,
        partition: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError> {
        let partitions = self.partitions.read();
        Ok(partitions
            .get(partition)
            .and_then(|p| p.get(&key.as_string()))
            .map(|(_, response)| response.clone()))
    }

    async fn put(
        &self,
        partition: &str,
        key: &RequestKey,
        response: CachedResponse,
    ) -> Result<(), StorageError> {
        validate_partition_name(partition)?;
        debug!("Storing {} in memory partition {}", key, partition);

        self.partitions
            .write()
            .entry(partition.to_string())
            .or_default()
            .insert(key.as_string(), (key.clone(), response));
        Ok(())
    }

    async fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool, StorageError> {
        let mut partitions = self.partitions.write();
        Ok(partitions
            .get_mut(partition)
            .map(|p| p.remove(&key.as_string()).is_some())
            .unwrap_or(false))
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, StorageError> {
        let partitions = self.partitions.read();
        Ok(partitions
            .get(partition)
            .map(|p| p.values().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default())
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError> {
        debug!("Deleting memory partition {}", partition);
        Ok(self.partitions.write().remove(partition).is_some())
    }

    async fn list_partitions(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.partitions.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse(&format!("https://example.com{}", path)).unwrap())
    }

    fn response(body: &'static str) -> CachedResponse {
        CachedResponse::new("https://example.com/", 200, vec![], Bytes::from_static(body.as_bytes()))
    }

    #[tokio::test]
    async fn test_get_from_missing_partition_is_a_miss() {
        let storage = MemoryStorage::new();
        assert!(storage.get("nope", &key("/a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_creates_partition_lazily() {
        let storage = MemoryStorage::new();
        storage.put("runtime", &key("/a"), response("a")).await.unwrap();

        assert_eq!(storage.list_partitions().await.unwrap(), vec!["runtime"]);
        let stored = storage.get("runtime", &key("/a")).await.unwrap().unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"a"));
    }

    #[tokio::test]
    async fn test_put_overwrites_last_writer_wins() {
        let storage = MemoryStorage::new();
        storage.put("cdn", &key("/a"), response("old")).await.unwrap();
        storage.put("cdn", &key("/a"), response("new")).await.unwrap();

        assert_eq!(storage.len("cdn"), 1);
        let stored = storage.get("cdn", &key("/a")).await.unwrap().unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"new"));
    }

    #[tokio::test]
    async fn test_partitions_are_independent() {
        let storage = MemoryStorage::new();
        storage.put("core", &key("/a"), response("a")).await.unwrap();
        storage.open("cdn").await.unwrap();

        assert!(storage.get("cdn", &key("/a")).await.unwrap().is_none());
        assert!(storage.delete_partition("core").await.unwrap());
        assert!(!storage.delete_partition("core").await.unwrap());
        assert_eq!(storage.list_partitions().await.unwrap(), vec!["cdn"]);
    }

    #[tokio::test]
    async fn test_keys_and_delete() {
        let storage = MemoryStorage::new();
        storage.put("core", &key("/a"), response("a")).await.unwrap();
        storage.put("core", &key("/b"), response("b")).await.unwrap();

        let mut keys: Vec<String> = storage
            .keys("core")
            .await
            .unwrap()
            .iter()
            .map(|k| k.as_string())
            .collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["GET https://example.com/a", "GET https://example.com/b"]
        );

        assert!(storage.delete("core", &key("/a")).await.unwrap());
        assert!(!storage.delete("core", &key("/a")).await.unwrap());
        assert_eq!(storage.len("core"), 1);
    }
}
