//! Local persistent collection storage
//!
//! Collections are JSON arrays addressed by a short key, the same shape the
//! site keeps in browser local storage. [`FileStore`] keeps one `<key>.json`
//! file per collection under a base directory; [`MemoryStore`] keeps them in
//! a map and is used by tests and one-shot commands.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

/// Key/value store holding serialized collections
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Raw contents of a collection, `None` if it was never written
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// Replace the raw contents of a collection
    async fn set_item(&self, key: &str, value: String) -> StorageResult<()>;

    /// Remove a collection; missing collections are ignored
    async fn remove_item(&self, key: &str) -> StorageResult<()>;
}

/// Read a whole collection. A missing collection is empty.
pub async fn read_collection<T: DeserializeOwned>(
    store: &dyn CollectionStore,
    key: &str,
) -> StorageResult<Vec<T>> {
    match store.get_item(key).await? {
        None => Ok(Vec::new()),
        Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
        Some(raw) => serde_json::from_str(&raw).map_err(|e| StorageError::Malformed {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Overwrite a collection with the given records
pub async fn write_collection<T: Serialize>(
    store: &dyn CollectionStore,
    key: &str,
    records: &[T],
) -> StorageResult<()> {
    let raw = serde_json::to_string(records).map_err(|e| StorageError::WriteFailed {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    store.set_item(key, raw).await
}

/// Append one record, keeping existing records untouched even if their shape is unknown
pub async fn append_to_collection<T: Serialize>(
    store: &dyn CollectionStore,
    key: &str,
    record: &T,
) -> StorageResult<()> {
    let mut existing: Vec<Value> = read_collection(store, key).await?;
    let value = serde_json::to_value(record).map_err(|e| StorageError::WriteFailed {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    existing.push(value);
    write_collection(store, key, &existing).await
}

fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey { key: key.to_string() })
    }
}

/// File-backed collection store
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `base_path`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(base_path: P) -> StorageResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path).map_err(|_| StorageError::DirectoryCreationFailed {
            path: base_path.to_string_lossy().to_string(),
        })?;

        tracing::debug!("Opened collection store at {}", base_path.display());
        Ok(Self { base_path })
    }

    fn collection_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", key))
    }
}

#[async_trait]
impl CollectionStore for FileStore {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        match tokio::fs::read_to_string(self.collection_path(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::ReadFailed { key: key.to_string(), reason: e.to_string() }),
        }
    }

    async fn set_item(&self, key: &str, value: String) -> StorageResult<()> {
        validate_key(key)?;
        let path = self.collection_path(key);
        let tmp_path = self.base_path.join(format!(".{}.json.tmp", key));

        let write_failed = |e: std::io::Error| StorageError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        };

        // Write then rename so readers never see a half-written collection
        tokio::fs::write(&tmp_path, value).await.map_err(write_failed)?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(write_failed)?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        match tokio::fs::remove_file(self.collection_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::WriteFailed {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// In-memory collection store
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        validate_key(key)?;
        Ok(self.items().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> StorageResult<()> {
        validate_key(key)?;
        self.items().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.items().remove(key);
        Ok(())
    }
}
