use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Fixed keys of the values the app persists on the device.
pub mod keys {
    /// Installation token, written once.
    pub const DEVICE_ID: &str = "deviceId";
    /// Cached backend user id for the device.
    pub const USER_ID: &str = "userId";
    /// Set once onboarding has been completed.
    pub const HAS_LAUNCHED: &str = "hasLaunched";
    /// JSON array of saved result records.
    pub const SAVED_RESULTS: &str = "savedResults";
}

/// String key-value capability injected into services that persist device state.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or overwrite the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Simple in-memory store for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.len())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        self.len().map(|len| len == 0)
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

/// Device storage behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub kv: Arc<dyn KeyValueStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        Self { kv }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let store = InMemoryStore::new();
        assert_eq!(store.get(keys::DEVICE_ID).await.unwrap(), None);

        store.set(keys::DEVICE_ID, "device-1").await.unwrap();
        assert_eq!(
            store.get(keys::DEVICE_ID).await.unwrap().as_deref(),
            Some("device-1")
        );

        store.delete(keys::DEVICE_ID).await.unwrap();
        assert_eq!(store.get(keys::DEVICE_ID).await.unwrap(), None);
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let store = InMemoryStore::new();
        store.set(keys::USER_ID, "1").await.unwrap();
        store.set(keys::USER_ID, "2").await.unwrap();
        assert_eq!(store.get(keys::USER_ID).await.unwrap().as_deref(), Some("2"));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn deleting_missing_key_is_ok() {
        let store = InMemoryStore::new();
        store.delete(keys::HAS_LAUNCHED).await.unwrap();
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let storage = Storage::in_memory();
        let other = storage.clone();
        storage.kv.set(keys::SAVED_RESULTS, "[]").await.unwrap();
        assert_eq!(
            other.kv.get(keys::SAVED_RESULTS).await.unwrap().as_deref(),
            Some("[]")
        );
    }
}
