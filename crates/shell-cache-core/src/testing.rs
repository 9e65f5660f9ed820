//! Test doubles shared by the unit tests

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use shell_cache_fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};
use shell_cache_storage::{CacheStorage, CachedResponse, MemoryStorage, RequestKey, StorageError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone)]
enum Outcome {
    Respond(StatusCode, Bytes),
    Fail,
}

/// Fetcher returning scripted outcomes per URL and recording every call.
/// URLs without a script fail as unreachable.
#[derive(Default)]
pub struct ScriptedFetcher {
    outcomes: Mutex<HashMap<String, Outcome>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &'static str) {
        self.outcomes.lock().insert(
            url.to_string(),
            Outcome::Respond(
                StatusCode::from_u16(status).unwrap(),
                Bytes::from_static(body.as_bytes()),
            ),
        );
    }

    pub fn fail(&self, url: &str) {
        self.outcomes.lock().insert(url.to_string(), Outcome::Fail);
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.url.to_string();
        self.calls.lock().push(url.clone());

        let outcome = self.outcomes.lock().get(&url).cloned();
        match outcome {
            Some(Outcome::Respond(status, body)) => {
                Ok(FetchResponse::new(request.url.clone(), status, body))
            }
            Some(Outcome::Fail) | None => Err(FetchError::Unreachable(url)),
        }
    }
}

/// Memory storage that counts every operation
#[derive(Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    operations: AtomicUsize,
}

impl CountingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    pub fn len(&self, partition: &str) -> usize {
        self.inner.len(partition)
    }

    fn count(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheStorage for CountingStorage {
    async fn open(&self, partition: &str) -> Result<(), StorageError> {
        self.count();
        self.inner.open(partition).await
    }

    async fn get(
        &self,
        partition: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError> {
        self.count();
        self.inner.get(partition, key).await
    }

    async fn put(
        &self,
        partition: &str,
        key: &RequestKey,
        response: CachedResponse,
    ) -> Result<(), StorageError> {
        self.count();
        self.inner.put(partition, key, response).await
    }

    async fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool, StorageError> {
        self.count();
        self.inner.delete(partition, key).await
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, StorageError> {
        self.count();
        self.inner.keys(partition).await
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError> {
        self.count();
        self.inner.delete_partition(partition).await
    }

    async fn list_partitions(&self) -> Result<Vec<String>, StorageError> {
        self.count();
        self.inner.list_partitions().await
    }
}

/// Storage where every operation fails
pub struct BrokenStorage;

fn broken() -> StorageError {
    StorageError::Io(std::io::Error::other("disk on fire"))
}

#[async_trait]
impl CacheStorage for BrokenStorage {
    async fn open(&self, _partition: &str) -> Result<(), StorageError> {
        Err(broken())
    }

    async fn get(
        &self,
        _partition: &str,
        _key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError> {
        Err(broken())
    }

    async fn put(
        &self,
        _partition: &str,
        _key: &RequestKey,
        _response: CachedResponse,
    ) -> Result<(), StorageError> {
        Err(broken())
    }

    async fn delete(&self, _partition: &str, _key: &RequestKey) -> Result<bool, StorageError> {
        Err(broken())
    }

    async fn keys(&self, _partition: &str) -> Result<Vec<RequestKey>, StorageError> {
        Err(broken())
    }

    async fn delete_partition(&self, _partition: &str) -> Result<bool, StorageError> {
        Err(broken())
    }

    async fn list_partitions(&self) -> Result<Vec<String>, StorageError> {
        Err(broken())
    }
}

/// Memory storage whose `delete_partition` fails for one partition name
pub struct StuckPartitionStorage {
    inner: MemoryStorage,
    stuck: String,
}

impl StuckPartitionStorage {
    pub fn new(stuck: &str) -> Self {
        Self {
            inner: MemoryStorage::new(),
            stuck: stuck.to_string(),
        }
    }
}

#[async_trait]
impl CacheStorage for StuckPartitionStorage {
    async fn open(&self, partition: &str) -> Result<(), StorageError> {
        self.inner.open(partition).await
    }

    async fn get(
        &self,
        partition: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError> {
        self.inner.get(partition, key).await
    }

    async fn put(
        &self,
        partition: &str,
        key: &RequestKey,
        response: CachedResponse,
    ) -> Result<(), StorageError> {
        self.inner.put(partition, key, response).await
    }

    async fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool, StorageError> {
        self.inner.delete(partition, key).await
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, StorageError> {
        self.inner.keys(partition).await
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError> {
        if partition == self.stuck {
            return Err(broken());
        }
        self.inner.delete_partition(partition).await
    }

    async fn list_partitions(&self) -> Result<Vec<String>, StorageError> {
        self.inner.list_partitions().await
    }
}
