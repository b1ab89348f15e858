//! Persistence port
//!
//! The store and registry never touch a concrete storage backend; they are
//! handed a [`StoragePort`] that reads and writes opaque string values under
//! string keys and broadcasts which key changed. In the browser-shaped
//! deployment that port is localStorage plus the cross-tab `storage` event;
//! here [`MemoryStorage`] plays that role for tests (two cloned handles are
//! two tabs) and [`FileStorage`] gives the CLI durable state.

use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Well-known storage keys
pub mod keys {
    pub const ACCOUNTS: &str = "accounts";
    pub const SELECTED_ACCOUNT: &str = "selected-account";
    pub const CUSTOM_NETWORKS: &str = "custom-networks";
    pub const SELECTED_NETWORK: &str = "selected-network";
    pub const TX_HISTORY: &str = "tx-history";
}

const EVENT_CAPACITY: usize = 64;

/// Key-value persistence with external-change notification
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Read the value under `key`; `None` when the key was never written.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write `value` under `key`, atomically from a reader's point of view.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete the record under `key`; deleting a missing key is a no-op.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Subscribe to change events; each event names the key that changed.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// In-memory storage; cloned handles share the same underlying map
#[derive(Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<HashMap<String, String>>>,
    events: broadcast::Sender<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoragePort for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        let _ = self.events.send(key.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.lock().await.remove(key);
        let _ = self.events.send(key.to_string());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }
}

/// File-backed storage: one JSON text file per key under a data directory
pub struct FileStorage {
    dir: PathBuf,
    events: broadcast::Sender<String>,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::Storage(format!("create {}: {e}", dir.display())))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self { dir, events })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl StoragePort for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("read {key}: {e}"))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        // Write-then-rename so a concurrent reader never sees a torn value
        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.tmp"));
        std::fs::write(&tmp, value).map_err(|e| Error::Storage(format!("write {key}: {e}")))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| Error::Storage(format!("rename {key}: {e}")))?;
        let _ = self.events.send(key.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Storage(format!("remove {key}: {e}"))),
        }
        let _ = self.events.send(key.to_string());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_round_trip_and_missing_key() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("accounts").await.unwrap(), None);

        storage.set("accounts", "[]").await.unwrap();
        assert_eq!(storage.get("accounts").await.unwrap().as_deref(), Some("[]"));

        storage.remove("accounts").await.unwrap();
        assert_eq!(storage.get("accounts").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cloned_handles_share_state_and_notify() {
        let tab_a = MemoryStorage::new();
        let tab_b = tab_a.clone();
        let mut events = tab_b.subscribe();

        tab_a.set("selected-account", "abc").await.unwrap();

        assert_eq!(
            tab_b.get("selected-account").await.unwrap().as_deref(),
            Some("abc")
        );
        assert_eq!(events.recv().await.unwrap(), "selected-account");
    }

    #[tokio::test]
    async fn file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        assert_eq!(storage.get("custom-networks").await.unwrap(), None);
        storage.set("custom-networks", "[{\"chainId\":99}]").await.unwrap();
        assert_eq!(
            storage.get("custom-networks").await.unwrap().as_deref(),
            Some("[{\"chainId\":99}]")
        );

        // Overwrite goes through the temp file
        storage.set("custom-networks", "[]").await.unwrap();
        assert_eq!(
            storage.get("custom-networks").await.unwrap().as_deref(),
            Some("[]")
        );

        storage.remove("custom-networks").await.unwrap();
        storage.remove("custom-networks").await.unwrap(); // idempotent
        assert_eq!(storage.get("custom-networks").await.unwrap(), None);
    }
}
