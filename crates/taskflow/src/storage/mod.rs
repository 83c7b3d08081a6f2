//! Local persistence for taskflow.
//!
//! Durable state lives in a key-value byte store. Two backends exist:
//!
//! - **Memory**: ephemeral, shared between clones (tests and `--memory` runs)
//! - **File**: one file per key inside a data directory, replaced atomically
//!
//! On top of the store, [`snapshot::LocalPersistence`] encodes the full entity
//! set as JSON Lines under a single key.
//!
//! # Example
//!
//! ```no_run
//! use taskflow::storage::{StorageBackend, create_kv_store};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let store = create_kv_store(StorageBackend::File(".taskflow/data".into())).await?;
//!     store.set("greeting", b"hello".to_vec()).await?;
//!     assert_eq!(store.get("greeting").await?, Some(b"hello".to_vec()));
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

pub mod snapshot;

pub use snapshot::{LocalPersistence, Snapshot, DEFAULT_SNAPSHOT_KEY};

/// Durable key-value byte store.
///
/// After `set` returns, a `get` for the same key in the same process observes
/// the new value. Implementations must be `Send + Sync` so one store can be
/// shared by the issue store and the account registry.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value for `key`, `None` if absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replaces the value for `key`.
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Deletes `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryKvStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// File-backed store: each key is a file in `dir`.
///
/// Writes go through a temporary file and a rename, so a crash mid-write
/// leaves the previous value intact.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    /// Opens (and creates if needed) the data directory.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(Error::Storage(format!("invalid storage key '{key}'")));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl KeyValueStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        taskflow_jsonl::write_bytes_atomic(&path, &value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Ephemeral in-memory store
    Memory,

    /// Directory of files
    File(PathBuf),
}

/// Creates a key-value store for the given backend.
///
/// # Errors
///
/// Returns an error if the file backend's directory cannot be created.
pub async fn create_kv_store(backend: StorageBackend) -> Result<Arc<dyn KeyValueStore>> {
    match backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryKvStore::new())),
        StorageBackend::File(dir) => Ok(Arc::new(FileKvStore::open(dir).await?)),
    }
}
