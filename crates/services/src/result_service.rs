use std::sync::Arc;

use psy_core::model::{DeviceId, ScoredResult, TestId};
use storage::repository::{KeyValueStore, keys};

use crate::api::PsychologyApi;
use crate::error::ResultError;

/// Fetches the backend-computed score for the device's latest attempt at a test.
#[derive(Clone)]
pub struct ResultService {
    api: Arc<dyn PsychologyApi>,
    store: Arc<dyn KeyValueStore>,
}

impl ResultService {
    #[must_use]
    pub fn new(api: Arc<dyn PsychologyApi>, store: Arc<dyn KeyValueStore>) -> Self {
        Self { api, store }
    }

    /// # Errors
    ///
    /// Returns `ResultError::MissingDevice` before the device has been
    /// provisioned, or API/storage errors.
    pub async fn fetch(&self, test_id: TestId) -> Result<ScoredResult, ResultError> {
        let device_id = self
            .store
            .get(keys::DEVICE_ID)
            .await?
            .and_then(|raw| DeviceId::new(raw).ok())
            .ok_or(ResultError::MissingDevice)?;
        Ok(self.api.scored_result(&device_id, test_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ScriptedApi;
    use psy_core::model::{Advice, TagScore};
    use storage::repository::InMemoryStore;

    #[tokio::test]
    async fn fetches_result_for_stored_device() {
        let device = DeviceId::new("device-9").unwrap();
        let scored = ScoredResult {
            tag_scores: vec![TagScore {
                tag_name: "Mood".into(),
                score: 6.0,
            }],
            advice: Some(Advice {
                title: "Keep going".into(),
                content: "You are doing fine.".into(),
                score_max: 10.0,
            }),
            num_questions: 3,
        };
        let api = ScriptedApi::new().with_result(device.clone(), TestId::new(2), scored.clone());
        let store = InMemoryStore::new();
        store.set(keys::DEVICE_ID, device.as_str()).await.unwrap();

        let service = ResultService::new(Arc::new(api), Arc::new(store));
        assert_eq!(service.fetch(TestId::new(2)).await.unwrap(), scored);
    }

    #[tokio::test]
    async fn missing_device_is_reported() {
        let service = ResultService::new(
            Arc::new(ScriptedApi::new()),
            Arc::new(InMemoryStore::new()),
        );
        assert!(matches!(
            service.fetch(TestId::new(2)).await,
            Err(ResultError::MissingDevice)
        ));
    }
}
