use std::sync::Arc;

use log::warn;

use psy_core::model::{SavedResult, ScoredResult, TestId};
use storage::repository::{KeyValueStore, keys};

use crate::Clock;
use crate::error::HistoryError;

/// Saved results kept on the device, oldest first. Entries are appended or
/// deleted, never edited.
#[derive(Clone)]
pub struct HistoryService {
    clock: Clock,
    store: Arc<dyn KeyValueStore>,
}

impl HistoryService {
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn KeyValueStore>) -> Self {
        Self { clock, store }
    }

    /// All saved results. An unreadable history is logged and shown as empty.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` if the store cannot be read.
    pub async fn list(&self) -> Result<Vec<SavedResult>, HistoryError> {
        match self.load().await {
            Err(HistoryError::Corrupt(reason)) => {
                warn!("saved results unreadable, showing none: {reason}");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Append a snapshot of `result` under `name` (blank names become `Test {id}`).
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Corrupt` rather than overwriting an unreadable
    /// history, `HistoryError::SavedResult` for an invalid name, or storage errors.
    pub async fn save(
        &self,
        name: Option<&str>,
        test_id: TestId,
        result: &ScoredResult,
    ) -> Result<SavedResult, HistoryError> {
        let saved = SavedResult::from_scored(name, test_id, result, self.clock.now())?;
        let mut entries = self.load().await?;
        entries.push(saved.clone());
        self.persist(&entries).await?;
        Ok(saved)
    }

    /// Remove the entry at `index` and return it.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::OutOfRange` for a bad index, or load/storage errors.
    pub async fn delete(&self, index: usize) -> Result<SavedResult, HistoryError> {
        let mut entries = self.load().await?;
        if index >= entries.len() {
            return Err(HistoryError::OutOfRange {
                index,
                len: entries.len(),
            });
        }
        let removed = entries.remove(index);
        self.persist(&entries).await?;
        Ok(removed)
    }

    async fn load(&self) -> Result<Vec<SavedResult>, HistoryError> {
        let Some(raw) = self.store.get(keys::SAVED_RESULTS).await? else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&raw).map_err(|err| HistoryError::Corrupt(err.to_string()))
    }

    async fn persist(&self, entries: &[SavedResult]) -> Result<(), HistoryError> {
        let raw =
            serde_json::to_string(entries).map_err(|err| HistoryError::Corrupt(err.to_string()))?;
        self.store.set(keys::SAVED_RESULTS, &raw).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use psy_core::model::{Advice, TagScore};
    use psy_core::time::fixed_now;
    use storage::repository::InMemoryStore;

    fn scored(points: &[(&str, f64)]) -> ScoredResult {
        ScoredResult {
            tag_scores: points
                .iter()
                .map(|(name, score)| TagScore {
                    tag_name: (*name).into(),
                    score: *score,
                })
                .collect(),
            advice: Some(Advice {
                title: "t".into(),
                content: "c".into(),
                score_max: 20.0,
            }),
            num_questions: 8,
        }
    }

    #[tokio::test]
    async fn save_appends_in_order() {
        let store = InMemoryStore::new();
        let mut clock = Clock::fixed(fixed_now());
        let history = HistoryService::new(clock, Arc::new(store.clone()));
        history
            .save(Some("first"), TestId::new(1), &scored(&[("A", 1.0)]))
            .await
            .unwrap();

        clock.advance(Duration::minutes(1));
        let history = HistoryService::new(clock, Arc::new(store));
        history
            .save(None, TestId::new(2), &scored(&[("A", 2.0), ("B", 3.0)]))
            .await
            .unwrap();

        let entries = history.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].result_name(), "first");
        assert_eq!(entries[1].result_name(), "Test 2");
        assert!((entries[1].total_score() - 5.0).abs() < f64::EPSILON);
        assert!(entries[0].saved_at() < entries[1].saved_at());
    }

    #[tokio::test]
    async fn delete_removes_only_the_indexed_entry() {
        let history =
            HistoryService::new(Clock::fixed(fixed_now()), Arc::new(InMemoryStore::new()));
        for name in ["a", "b", "c"] {
            history
                .save(Some(name), TestId::new(1), &scored(&[("A", 1.0)]))
                .await
                .unwrap();
        }

        let removed = history.delete(1).await.unwrap();

        assert_eq!(removed.result_name(), "b");
        let names: Vec<_> = history
            .list()
            .await
            .unwrap()
            .iter()
            .map(|entry| entry.result_name().to_owned())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn delete_out_of_range_is_rejected() {
        let history =
            HistoryService::new(Clock::fixed(fixed_now()), Arc::new(InMemoryStore::new()));
        let err = history.delete(0).await.unwrap_err();
        assert!(matches!(err, HistoryError::OutOfRange { index: 0, len: 0 }));
    }

    #[tokio::test]
    async fn corrupt_history_lists_empty_but_is_not_overwritten() {
        let store = InMemoryStore::new();
        store.set(keys::SAVED_RESULTS, "{not json").await.unwrap();
        let history = HistoryService::new(Clock::fixed(fixed_now()), Arc::new(store.clone()));

        assert!(history.list().await.unwrap().is_empty());
        let err = history
            .save(Some("x"), TestId::new(1), &scored(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::Corrupt(_)));
        assert_eq!(
            store.get(keys::SAVED_RESULTS).await.unwrap().as_deref(),
            Some("{not json")
        );
    }

    #[tokio::test]
    async fn reads_records_written_with_camel_case_keys() {
        let store = InMemoryStore::new();
        store
            .set(
                keys::SAVED_RESULTS,
                r#"[{"resultName":"Old","testId":3,"questionCount":10,
                     "tagScores":[{"label":"Calm","value":4}],"scoreMax":5,
                     "savedAt":"2024-05-01T10:00:00Z"}]"#,
            )
            .await
            .unwrap();
        let history = HistoryService::new(Clock::fixed(fixed_now()), Arc::new(store));

        let entries = history.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].test_id(), TestId::new(3));
        assert_eq!(entries[0].question_count(), 10);
        assert_eq!(entries[0].score_max(), 5.0);
    }
}
