//! Key/value persistence for KNX manager state.
//!
//! Mirrors the NVS settings shim of the device port: every key lives under
//! the `knx/` namespace, names are bounded, and a single write is either
//! fully visible or not visible at all.
//!
//! # Example
//!
//! ```
//! use knx_cfgmgr_common::storage::{MemoryStore, PersistenceStore};
//!
//! let store = MemoryStore::new();
//! store.write("dev_knx_ia", b"1").unwrap();
//! assert_eq!(store.read("dev_knx_ia").unwrap(), Some(b"1".to_vec()));
//! store.erase("dev_knx_ia").unwrap();
//! assert_eq!(store.read("dev_knx_ia").unwrap(), None);
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// Namespace prefix for every KNX key.
pub const KNX_KEY_PREFIX: &str = "knx";

/// Maximum length of a namespaced key (`knx/<key>`).
pub const KNX_SETTINGS_MAX_NAME_LEN: usize = 32;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a persistence store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failed.
    #[error("I/O error on key '{key}': {source}")]
    Io {
        /// The namespaced key.
        key: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The namespaced key does not fit the settings name limit.
    #[error("Key '{key}' exceeds {max} characters")]
    KeyTooLong {
        /// The namespaced key.
        key: String,
        /// The limit.
        max: usize,
    },

    /// Stored bytes could not be decoded.
    #[error("Failed to decode key '{key}': {message}")]
    Decode {
        /// The namespaced key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Builds the namespaced key for `store`, enforcing the length limit.
pub fn namespaced_key(store: &str) -> StoreResult<String> {
    let key = format!("{}/{}", KNX_KEY_PREFIX, store);
    if key.len() > KNX_SETTINGS_MAX_NAME_LEN {
        return Err(StoreError::KeyTooLong {
            key,
            max: KNX_SETTINGS_MAX_NAME_LEN,
        });
    }
    Ok(key)
}

/// Durable key/value store used by the managers.
///
/// Calls are synchronous from the caller's point of view.
pub trait PersistenceStore: Send + Sync {
    /// Reads a key. Returns `Ok(None)` if the key has never been written.
    fn read(&self, store: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes a key, replacing any previous value atomically.
    fn write(&self, store: &str, data: &[u8]) -> StoreResult<()>;

    /// Erases a key. Erasing a missing key succeeds.
    fn erase(&self, store: &str) -> StoreResult<()>;

    /// Lists every stored key without its namespace, sorted.
    fn list_keys(&self) -> StoreResult<Vec<String>>;
}

/// Volatile store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the namespaced keys currently present, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A poisoned map is still structurally valid.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PersistenceStore for MemoryStore {
    fn read(&self, store: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = namespaced_key(store)?;
        Ok(self.lock().get(&key).cloned())
    }

    fn write(&self, store: &str, data: &[u8]) -> StoreResult<()> {
        let key = namespaced_key(store)?;
        self.lock().insert(key, data.to_vec());
        Ok(())
    }

    fn erase(&self, store: &str) -> StoreResult<()> {
        let key = namespaced_key(store)?;
        self.lock().remove(&key);
        Ok(())
    }

    fn list_keys(&self) -> StoreResult<Vec<String>> {
        let prefix = format!("{}/", KNX_KEY_PREFIX);
        Ok(self
            .keys()
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }
}

/// Store keeping one file per key under a root directory.
///
/// `knx/GOT_STORE_0` is stored as `<root>/knx/GOT_STORE_0`. Writes go to a
/// temporary file in the same directory which is then renamed over the
/// target, so a crash never leaves a partially written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        let dir = root.join(KNX_KEY_PREFIX);
        fs::create_dir_all(&dir).map_err(|e| StoreError::Io {
            key: dir.display().to_string(),
            source: e,
        })?;
        debug!(root = %root.display(), "Opened file store");
        Ok(Self { root })
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl PersistenceStore for FileStore {
    fn read(&self, store: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = namespaced_key(store)?;
        match fs::read(self.path_for(&key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(key = %key, "KNX key not found");
                Ok(None)
            }
            Err(e) => Err(StoreError::Io { key, source: e }),
        }
    }

    fn write(&self, store: &str, data: &[u8]) -> StoreResult<()> {
        let key = namespaced_key(store)?;
        let path = self.path_for(&key);
        let dir = path.parent().unwrap_or(self.root.as_path());
        let io_err = |source: io::Error| StoreError::Io {
            key: key.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(data).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn erase(&self, store: &str) -> StoreResult<()> {
        let key = namespaced_key(store)?;
        match fs::remove_file(self.path_for(&key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to erase KNX key");
                Err(StoreError::Io { key, source: e })
            }
        }
    }

    fn list_keys(&self) -> StoreResult<Vec<String>> {
        let dir = self.root.join(KNX_KEY_PREFIX);
        let io_err = |source: io::Error| StoreError::Io {
            key: dir.display().to_string(),
            source,
        };

        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_file() {
                continue;
            }
            // Temporary files of an interrupted write start with a dot
            match entry.file_name().to_str() {
                Some(name) if !name.starts_with('.') => keys.push(name.to_string()),
                _ => {}
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_key() {
        assert_eq!(namespaced_key("GOT_STORE_0").unwrap(), "knx/GOT_STORE_0");
        assert!(matches!(
            namespaced_key("a_key_name_that_is_much_too_long"),
            Err(StoreError::KeyTooLong { max: 32, .. })
        ));
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.read("dev_knx_iid").unwrap(), None);

        store.write("dev_knx_iid", b"42").unwrap();
        assert_eq!(store.read("dev_knx_iid").unwrap(), Some(b"42".to_vec()));
        assert_eq!(store.keys(), vec!["knx/dev_knx_iid".to_string()]);

        store.erase("dev_knx_iid").unwrap();
        store.erase("dev_knx_iid").unwrap();
        assert!(store.keys().is_empty());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        store.write("GOT_STORE_1", b"{\"id\":1}").unwrap();
        drop(store);

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(
            store.read("GOT_STORE_1").unwrap(),
            Some(b"{\"id\":1}".to_vec())
        );
        assert!(dir.path().join("knx").join("GOT_STORE_1").exists());
    }

    #[test]
    fn test_file_store_overwrite_and_erase() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.write("dev_knx_fid", b"1").unwrap();
        store.write("dev_knx_fid", b"2").unwrap();
        assert_eq!(store.read("dev_knx_fid").unwrap(), Some(b"2".to_vec()));

        store.erase("dev_knx_fid").unwrap();
        assert_eq!(store.read("dev_knx_fid").unwrap(), None);
        // Missing key is not an error
        store.erase("dev_knx_fid").unwrap();
    }

    #[test]
    fn test_memory_store_list_keys() {
        let store = MemoryStore::new();
        store.write("GOT_STORE_3", b"{}").unwrap();
        store.write("dev_knx_ia", b"1").unwrap();
        assert_eq!(
            store.list_keys().unwrap(),
            vec!["GOT_STORE_3".to_string(), "dev_knx_ia".to_string()]
        );
    }

    #[test]
    fn test_file_store_list_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.list_keys().unwrap().is_empty());

        store.write("GOT_STORE_7", b"{}").unwrap();
        store.write("dev_knx_pm", b"0").unwrap();
        fs::write(dir.path().join("knx").join(".tmpX1y2"), b"partial").unwrap();
        store.erase("dev_knx_pm").unwrap();

        assert_eq!(store.list_keys().unwrap(), vec!["GOT_STORE_7".to_string()]);
    }

    #[test]
    fn test_file_store_rejects_long_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store
            .write("a_key_name_that_is_much_too_long", b"x")
            .is_err());
    }
}
