use std::sync::Arc;

use storage::repository::{KeyValueStore, StorageError, keys};

/// First-run detection for onboarding.
#[derive(Clone)]
pub struct LaunchService {
    store: Arc<dyn KeyValueStore>,
}

impl LaunchService {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// True until onboarding has been completed once on this device.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the flag cannot be read.
    pub async fn is_first_launch(&self) -> Result<bool, StorageError> {
        Ok(self.store.get(keys::HAS_LAUNCHED).await?.is_none())
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the flag cannot be written.
    pub async fn complete_onboarding(&self) -> Result<(), StorageError> {
        self.store.set(keys::HAS_LAUNCHED, "true").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryStore;

    #[tokio::test]
    async fn onboarding_flips_first_launch() {
        let launch = LaunchService::new(Arc::new(InMemoryStore::new()));
        assert!(launch.is_first_launch().await.unwrap());

        launch.complete_onboarding().await.unwrap();
        assert!(!launch.is_first_launch().await.unwrap());

        launch.complete_onboarding().await.unwrap();
        assert!(!launch.is_first_launch().await.unwrap());
    }
}
