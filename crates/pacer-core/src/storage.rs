use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

pub const DEFAULT_QUOTA_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded { needed: u64, quota: u64 },
    #[error("write conflict on key {key}")]
    Conflict { key: String },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record for key {key}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Whether a single retry of the same write may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub bytes_in_use: u64,
    pub quota_bytes: u64,
}

impl StorageUsage {
    pub fn megabytes_in_use(&self) -> f64 {
        self.bytes_in_use as f64 / (1024.0 * 1024.0)
    }

    pub fn percent_used(&self) -> f64 {
        if self.quota_bytes == 0 {
            return 0.0;
        }
        self.bytes_in_use as f64 / self.quota_bytes as f64 * 100.0
    }
}

/// Key-value persistence with quota accounting.
pub trait StorageEngine: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<Vec<u8>>>;
    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> StorageFuture<'a, ()>;
    fn delete<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()>;
    fn keys<'a>(&'a self, prefix: &'a str) -> StorageFuture<'a, Vec<String>>;
    fn clear<'a>(&'a self) -> StorageFuture<'a, ()>;
    fn usage<'a>(&'a self) -> StorageFuture<'a, StorageUsage>;
}

fn check_quota(in_use: u64, replaced: u64, added: u64, quota: u64) -> Result<(), StorageError> {
    let needed = in_use.saturating_sub(replaced).saturating_add(added);
    if needed > quota {
        return Err(StorageError::QuotaExceeded { needed, quota });
    }
    Ok(())
}

#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    quota_bytes: u64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_BYTES)
    }
}

impl MemoryStore {
    pub fn new(quota_bytes: u64) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes,
        }
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Vec<u8>>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))?;
        f(&mut guard)
    }
}

fn entry_size(key: &str, value: &[u8]) -> u64 {
    (key.len() + value.len()) as u64
}

impl StorageEngine for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move { self.with_entries(|entries| Ok(entries.get(key).cloned())) })
    }

    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            self.with_entries(|entries| {
                let in_use: u64 = entries
                    .iter()
                    .map(|(key, value)| entry_size(key, value))
                    .sum();
                let replaced = entries
                    .get(key)
                    .map(|old| entry_size(key, old))
                    .unwrap_or(0);
                check_quota(in_use, replaced, entry_size(key, &value), self.quota_bytes)?;
                entries.insert(key.to_string(), value);
                Ok(())
            })
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            self.with_entries(|entries| {
                entries.remove(key);
                Ok(())
            })
        })
    }

    fn keys<'a>(&'a self, prefix: &'a str) -> StorageFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.with_entries(|entries| {
                Ok(entries
                    .keys()
                    .filter(|key| key.starts_with(prefix))
                    .cloned()
                    .collect())
            })
        })
    }

    fn clear<'a>(&'a self) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            self.with_entries(|entries| {
                entries.clear();
                Ok(())
            })
        })
    }

    fn usage<'a>(&'a self) -> StorageFuture<'a, StorageUsage> {
        Box::pin(async move {
            self.with_entries(|entries| {
                Ok(StorageUsage {
                    bytes_in_use: entries
                        .iter()
                        .map(|(key, value)| entry_size(key, value))
                        .sum(),
                    quota_bytes: self.quota_bytes,
                })
            })
        })
    }
}

/// One file per key, named by the hex encoding of the key.
///
/// Bytes in use are scanned once and then tracked in memory; writes made by
/// other processes show up after the store is reopened.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    quota_bytes: u64,
    bytes_in_use: Arc<tokio::sync::Mutex<Option<u64>>>,
}

const RECORD_EXT: &str = "rec";
const TEMP_EXT: &str = "tmp";
const TOMBSTONE_MARK: &str = ".cleared-";

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, quota_bytes: u64) -> Self {
        Self {
            root: root.into(),
            quota_bytes,
            bytes_in_use: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.{RECORD_EXT}", hex::encode(key.as_bytes())))
    }

    async fn ensure_root(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    async fn records(&self) -> Result<Vec<(String, u64)>, StorageError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut records = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| hex::decode(stem).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok())
            else {
                continue;
            };
            let len = entry.metadata().await?.len();
            records.push((key, len));
        }
        Ok(records)
    }

    async fn tracked_bytes(&self, tracked: &mut Option<u64>) -> Result<u64, StorageError> {
        if let Some(bytes) = *tracked {
            return Ok(bytes);
        }
        let bytes = self.records().await?.iter().map(|(_, len)| len).sum();
        *tracked = Some(bytes);
        Ok(bytes)
    }

    /// Hidden sibling directories the root is renamed to while being cleared.
    fn tombstone_prefix(&self) -> Result<String, StorageError> {
        self.root
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| format!(".{name}{TOMBSTONE_MARK}"))
            .ok_or_else(|| {
                StorageError::Unavailable(format!(
                    "store root {} has no directory name",
                    self.root.display()
                ))
            })
    }

    async fn remove_tombstones(&self, prefix: &str) {
        let Some(parent) = self.root.parent() else {
            return;
        };
        let Ok(mut dir) = tokio::fs::read_dir(parent).await else {
            return;
        };
        while let Ok(Some(entry)) = dir.next_entry().await {
            let is_tombstone = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(prefix));
            if !is_tombstone {
                continue;
            }
            let path = entry.path();
            if let Err(err) = tokio::fs::remove_dir_all(&path).await {
                warn!(path = %path.display(), error = %err, "failed to remove cleared store directory");
            }
        }
    }
}

impl StorageEngine for FileStore {
    fn get<'a>(&'a self, key: &'a str) -> StorageFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            match tokio::fs::read(self.record_path(key)).await {
                Ok(data) => Ok(Some(data)),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
    }

    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let mut tracked = self.bytes_in_use.lock().await;
            self.ensure_root().await?;
            let path = self.record_path(key);
            let replaced = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata.len(),
                Err(err) if err.kind() == ErrorKind::NotFound => 0,
                Err(err) => return Err(err.into()),
            };
            let in_use = self.tracked_bytes(&mut tracked).await?;
            let added = value.len() as u64;
            check_quota(in_use, replaced, added, self.quota_bytes)?;
            let temp = path.with_extension(TEMP_EXT);
            tokio::fs::write(&temp, &value).await?;
            if let Err(err) = tokio::fs::rename(&temp, &path).await {
                let _ = tokio::fs::remove_file(&temp).await;
                return Err(match err.kind() {
                    ErrorKind::PermissionDenied | ErrorKind::AlreadyExists => {
                        StorageError::Conflict {
                            key: key.to_string(),
                        }
                    }
                    _ => err.into(),
                });
            }
            *tracked = Some(in_use.saturating_sub(replaced).saturating_add(added));
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let mut tracked = self.bytes_in_use.lock().await;
            let path = self.record_path(key);
            let len = match tokio::fs::metadata(&path).await {
                Ok(metadata) => metadata.len(),
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(err.into()),
            };
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(err.into()),
            }
            if let Some(bytes) = tracked.as_mut() {
                *bytes = bytes.saturating_sub(len);
            }
            Ok(())
        })
    }

    fn keys<'a>(&'a self, prefix: &'a str) -> StorageFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut keys: Vec<String> = self
                .records()
                .await?
                .into_iter()
                .map(|(key, _)| key)
                .filter(|key| key.starts_with(prefix))
                .collect();
            keys.sort();
            Ok(keys)
        })
    }

    /// Renames the root aside in one step, then deletes it. Readers see either
    /// every record or none.
    fn clear<'a>(&'a self) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let mut tracked = self.bytes_in_use.lock().await;
            let prefix = self.tombstone_prefix()?;
            let tombstone = self
                .root
                .with_file_name(format!("{prefix}{}", Uuid::new_v4().simple()));
            match tokio::fs::rename(&self.root, &tombstone).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    *tracked = Some(0);
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
            *tracked = Some(0);
            self.remove_tombstones(&prefix).await;
            Ok(())
        })
    }

    fn usage<'a>(&'a self) -> StorageFuture<'a, StorageUsage> {
        Box::pin(async move {
            let mut tracked = self.bytes_in_use.lock().await;
            Ok(StorageUsage {
                bytes_in_use: self.tracked_bytes(&mut tracked).await?,
                quota_bytes: self.quota_bytes,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn file_store_roundtrip_and_keys() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("store"), DEFAULT_QUOTA_BYTES);
        store.put("activity:1", b"one".to_vec()).await.unwrap();
        store.put("activity:2", b"two".to_vec()).await.unwrap();
        store.put("sync_state", b"{}".to_vec()).await.unwrap();

        assert_eq!(store.get("activity:1").await.unwrap(), Some(b"one".to_vec()));
        assert_eq!(store.get("activity:3").await.unwrap(), None);
        assert_eq!(
            store.keys("activity:").await.unwrap(),
            vec!["activity:1".to_string(), "activity:2".to_string()]
        );
        assert_eq!(store.usage().await.unwrap().bytes_in_use, 8);
    }

    #[tokio::test]
    async fn file_store_clear_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path().join("store"), DEFAULT_QUOTA_BYTES);
        store.put("activity:1", b"one".to_vec()).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.keys("").await.unwrap().is_empty());
        assert_eq!(store.usage().await.unwrap().bytes_in_use, 0);
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn file_store_clear_swaps_root_out_whole() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store");
        let store = FileStore::new(root.clone(), DEFAULT_QUOTA_BYTES);
        store.put("activity:1", b"one".to_vec()).await.unwrap();
        store.put("sync_state", b"{}".to_vec()).await.unwrap();
        let stale = tmp.path().join(".store.cleared-leftover");
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("x.rec"), b"x").unwrap();

        store.clear().await.unwrap();

        assert!(!root.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
        assert_eq!(store.get("sync_state").await.unwrap(), None);
        store.put("activity:2", b"two".to_vec()).await.unwrap();
        assert_eq!(store.keys("").await.unwrap(), vec!["activity:2".to_string()]);
        assert_eq!(store.usage().await.unwrap().bytes_in_use, 3);
    }

    #[tokio::test]
    async fn file_store_tracks_usage_across_writes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("store");
        let store = FileStore::new(root.clone(), DEFAULT_QUOTA_BYTES);
        store.put("a", vec![0; 5]).await.unwrap();
        store.put("b", vec![0; 7]).await.unwrap();
        store.put("a", vec![0; 2]).await.unwrap();
        store.delete("b").await.unwrap();
        store.delete("missing").await.unwrap();
        assert_eq!(store.usage().await.unwrap().bytes_in_use, 2);

        let reopened = FileStore::new(root, DEFAULT_QUOTA_BYTES);
        assert_eq!(reopened.usage().await.unwrap().bytes_in_use, 2);
    }

    #[tokio::test]
    async fn file_store_enforces_quota_on_replacement_size() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::new(tmp.path(), 10);
        store.put("a", vec![0; 8]).await.unwrap();
        store.put("a", vec![0; 10]).await.unwrap();
        let err = store.put("b", vec![0; 1]).await.unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { needed: 11, quota: 10 }));
    }

    #[tokio::test]
    async fn memory_store_counts_keys_in_usage() {
        let store = MemoryStore::new(8);
        store.put("k", vec![1, 2, 3]).await.unwrap();
        let usage = store.usage().await.unwrap();
        assert_eq!(usage.bytes_in_use, 4);
        assert!(matches!(
            store.put("other", vec![0; 4]).await,
            Err(StorageError::QuotaExceeded { .. })
        ));
        store.delete("k").await.unwrap();
        assert_eq!(store.usage().await.unwrap().bytes_in_use, 0);
    }

    #[test]
    fn usage_reports_megabytes_and_percent() {
        let usage = StorageUsage {
            bytes_in_use: 2 * 1024 * 1024,
            quota_bytes: 4 * 1024 * 1024,
        };
        assert_eq!(usage.megabytes_in_use(), 2.0);
        assert_eq!(usage.percent_used(), 50.0);
    }
}
