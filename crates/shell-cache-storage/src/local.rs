//! Local disk storage backend

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{CacheStorage, validate_partition_name};
use crate::entry::{CachedResponse, RequestKey};
use crate::error::StorageError;

const ENTRY_EXTENSION: &str = "entry";

/// Metadata line written at the head of every entry file
#[derive(Debug, Serialize, Deserialize)]
struct EntryMetadata {
    key: String,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    stored_at: DateTime<Utc>,
    size: u64,
}

/// Local disk storage backend
///
/// Layout: `<base_path>/partitions/<partition>/<key digest>.entry`.
/// Each entry file is a single JSON metadata line followed by the raw
/// body, written to a temp file and renamed into place so readers never
/// observe a half-written entry.
pub struct LocalStorage {
    partitions_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        let partitions_path = base_path.join("partitions");

        fs::create_dir_all(&partitions_path).await?;

        info!("Initialized local cache storage at {:?}", base_path);

        Ok(Self { partitions_path })
    }

    fn partition_path(&self, partition: &str) -> Result<PathBuf, StorageError> {
        validate_partition_name(partition)?;
        Ok(self.partitions_path.join(partition))
    }

    fn entry_path(&self, partition: &str, key: &RequestKey) -> Result<PathBuf, StorageError> {
        Ok(self
            .partition_path(partition)?
            .join(format!("{}.{}", key.digest(), ENTRY_EXTENSION)))
    }

    /// Read only the metadata line of an entry file
    async fn read_metadata(path: &Path) -> Result<EntryMetadata, StorageError> {
        let file = File::open(path).await?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        reader.read_line(&mut line).await?;
        Ok(serde_json::from_str(line.trim_end())?)
    }
}

fn not_found_as_none<T>(result: std::io::Result<T>) -> Result<Option<T>, StorageError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

#[async_trait]
impl CacheStorage for LocalStorage {
    async fn open(&self, partition: &str) -> Result<(), StorageError> {
        let path = self.partition_path(partition)?;
        fs::create_dir_all(&path).await?;
        Ok(())
    }

    async fn get(
        &self,
        partition: &str,
        key: &RequestKey,
    ) -> Result<Option<CachedResponse>, StorageError> {
        let path = self.entry_path(partition, key)?;

        let Some(raw) = not_found_as_none(fs::read(&path).await)? else {
            return Ok(None);
        };

        debug!("Reading cache entry {} from {:?}", key, path);

        let split = raw
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| StorageError::Corrupt {
                key: key.as_string(),
                reason: "missing metadata line".to_string(),
            })?;

        let metadata: EntryMetadata = serde_json::from_slice(&raw[..split])?;
        let body = Bytes::copy_from_slice(&raw[split + 1..]);

        if metadata.key != key.as_string() {
            // Digest collision or a file copied between stores
            warn!(
                "Cache entry at {:?} belongs to {}, expected {}",
                path, metadata.key, key
            );
            return Ok(None);
        }

        if body.len() as u64 != metadata.size {
            return Err(StorageError::Corrupt {
                key: key.as_string(),
                reason: format!("expected {} body bytes, found {}", metadata.size, body.len()),
            });
        }

        Ok(Some(CachedResponse {
            url: metadata.url,
            status: metadata.status,
            headers: metadata.headers,
            body,
            stored_at: metadata.stored_at,
        }))
    }

    async fn put(
        &self,
        partition: &str,
        key: &RequestKey,
        response: CachedResponse,
    ) -> Result<(), StorageError> {
        let path = self.entry_path(partition, key)?;
        debug!("Writing cache entry {} to {:?}", key, path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let metadata = EntryMetadata {
            key: key.as_string(),
            url: response.url,
            status: response.status,
            headers: response.headers,
            stored_at: response.stored_at,
            size: response.body.len() as u64,
        };
        let mut header = serde_json::to_vec(&metadata)?;
        header.push(b'\n');

        // Unique temp name so concurrent writers to one key do not share a file
        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        let written = async {
            let mut file = File::create(&temp_path).await?;
            file.write_all(&header).await?;
            file.write_all(&response.body).await?;
            file.flush().await?;
            drop(file);
            fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            match fs::remove_file(&temp_path).await {
                Ok(()) => {}
                Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => {}
                Err(cleanup) => {
                    warn!("Failed to remove temp file {:?}: {}", temp_path, cleanup)
                }
            }
            return Err(StorageError::Io(e));
        }

        Ok(())
    }

    async fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool, StorageError> {
        let path = self.entry_path(partition, key)?;
        debug!("Deleting cache entry at {:?}", path);

        Ok(not_found_as_none(fs::remove_file(&path).await)?.is_some())
    }

    async fn keys(&self, partition: &str) -> Result<Vec<RequestKey>, StorageError> {
        let path = self.partition_path(partition)?;

        let Some(mut dir) = not_found_as_none(fs::read_dir(&path).await)? else {
            return Ok(Vec::new());
        };

        let mut keys = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let entry_path = entry.path();
            if entry_path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }

            match Self::read_metadata(&entry_path).await {
                Ok(metadata) => keys.push(RequestKey::parse(&metadata.key)?),
                Err(e) => warn!("Skipping unreadable cache entry {:?}: {}", entry_path, e),
            }
        }

        Ok(keys)
    }

    async fn delete_partition(&self, partition: &str) -> Result<bool, StorageError> {
        let path = self.partition_path(partition)?;
        debug!("Deleting partition at {:?}", path);

        Ok(not_found_as_none(fs::remove_dir_all(&path).await)?.is_some())
    }

    async fn list_partitions(&self) -> Result<Vec<String>, StorageError> {
        let mut dir = fs::read_dir(&self.partitions_path).await?;
        let mut names = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn key(path: &str) -> RequestKey {
        RequestKey::get(&Url::parse(&format!("https://example.com{}", path)).unwrap())
    }

    fn response(body: &'static [u8]) -> CachedResponse {
        CachedResponse::new(
            "https://example.com/",
            200,
            vec![("content-type".to_string(), "text/css".to_string())],
            Bytes::from_static(body),
        )
    }

    #[tokio::test]
    async fn test_put_then_get_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let stored = response(b"body {}\nline two");

        {
            let storage = LocalStorage::new(dir.path()).await.unwrap();
            storage.put("cdn", &key("/a.css"), stored.clone()).await.unwrap();
        }

        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let loaded = storage.get("cdn", &key("/a.css")).await.unwrap().unwrap();
        assert!(loaded.same_content(&stored));
        assert_eq!(loaded.stored_at, stored.stored_at);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let key = key("/a.css");

        // A directory squatting on the entry path makes the final rename fail
        let entry_path = storage.entry_path("cdn", &key).unwrap();
        fs::create_dir_all(&entry_path).await.unwrap();

        assert!(storage.put("cdn", &key, response(b"x")).await.is_err());

        let mut dir = fs::read_dir(entry_path.parent().unwrap()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec![format!("{}.entry", key.digest())]);
    }

    #[tokio::test]
    async fn test_missing_entry_and_partition_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        assert!(storage.get("cdn", &key("/a")).await.unwrap().is_none());
        storage.open("cdn").await.unwrap();
        assert!(storage.get("cdn", &key("/a")).await.unwrap().is_none());
        assert!(storage.keys("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_and_delete_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage.open("app-v1").await.unwrap();
        storage.open("app-cdn").await.unwrap();
        storage.put("app-runtime", &key("/x"), response(b"x")).await.unwrap();

        assert_eq!(
            storage.list_partitions().await.unwrap(),
            vec!["app-cdn", "app-runtime", "app-v1"]
        );

        assert!(storage.delete_partition("app-v1").await.unwrap());
        assert!(!storage.delete_partition("app-v1").await.unwrap());
        assert_eq!(
            storage.list_partitions().await.unwrap(),
            vec!["app-cdn", "app-runtime"]
        );
    }

    #[tokio::test]
    async fn test_keys_round_trip_identity() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage.put("core", &key("/index.html"), response(b"a")).await.unwrap();
        let keys = storage.keys("core").await.unwrap();
        assert_eq!(keys, vec![key("/index.html")]);

        assert!(storage.delete("core", &key("/index.html")).await.unwrap());
        assert!(storage.keys("core").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_body_is_reported_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        storage.put("core", &key("/a"), response(b"0123456789")).await.unwrap();

        let path = storage.entry_path("core", &key("/a")).unwrap();
        let raw = fs::read(&path).await.unwrap();
        fs::write(&path, &raw[..raw.len() - 3]).await.unwrap();

        assert!(matches!(
            storage.get("core", &key("/a")).await,
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal_partition() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        assert!(matches!(
            storage.open("../escape").await,
            Err(StorageError::InvalidPartition(_))
        ));
    }
}
