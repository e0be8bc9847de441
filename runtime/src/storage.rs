//! Key/value storage backends.

use crate::lock;
use api_dispatch_core::environment::{KeyValueStore, StorageError};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// In-memory storage; contents are lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        lock(&self.entries).insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Directory-backed storage: one file per key.
///
/// Writes go to a temporary file that is renamed over the target, so a
/// reader never observes a partially written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StorageError {
            key: dir.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { dir })
    }

    /// Storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.store"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let target = self.path_for(key);
        let temp = target.with_extension("tmp");
        std::fs::write(&temp, value)
            .and_then(|()| std::fs::rename(&temp, &target))
            .map_err(|e| StorageError {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use expect/unwrap
mod tests {
    use super::*;

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStore::new();
        store.set("k", b"one").expect("set");
        store.set("k", b"two").expect("set");
        assert_eq!(store.get("k").expect("get"), Some(b"two".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::open(dir.path().join("nested")).expect("open");

        assert_eq!(store.get("cookieStorage").expect("get"), None);
        store.set("cookieStorage", b"[]").expect("set");
        assert_eq!(store.get("cookieStorage").expect("get"), Some(b"[]".to_vec()));

        let reopened = FileStore::open(store.dir()).expect("reopen");
        assert_eq!(reopened.get("cookieStorage").expect("get"), Some(b"[]".to_vec()));
    }

    #[test]
    fn file_store_sanitizes_keys() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = FileStore::open(dir.path()).expect("open");
        store.set("../escape", b"x").expect("set");
        assert!(dir.path().join("___escape.store").exists());
    }
}
