use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::TestId;

/// Longest result name accepted for a saved record.
pub const MAX_RESULT_NAME_LEN: usize = 120;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SavedResultError {
    #[error("result name is too long: {len} characters (max {max})")]
    NameTooLong { len: usize, max: usize },
}

/// A named sub-score computed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagScore {
    pub tag_name: String,
    pub score: f64,
}

/// Backend-generated narrative attached to a scored result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advice {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub score_max: f64,
}

/// Scored outcome of a submitted test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    #[serde(default)]
    pub tag_scores: Vec<TagScore>,
    #[serde(default)]
    pub advice: Option<Advice>,
    #[serde(default)]
    pub num_questions: u32,
}

/// One axis of the radar chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

impl ScoredResult {
    /// Maximum score per tag, `0.0` when the backend gave no advice.
    #[must_use]
    pub fn score_max(&self) -> f64 {
        self.advice.as_ref().map_or(0.0, |advice| advice.score_max)
    }

    #[must_use]
    pub fn chart_points(&self) -> Vec<ChartPoint> {
        self.tag_scores
            .iter()
            .map(|tag| ChartPoint {
                label: tag.tag_name.clone(),
                value: tag.score,
            })
            .collect()
    }

    /// A radar chart needs at least one axis and a positive scale.
    #[must_use]
    pub fn has_chart(&self) -> bool {
        !self.tag_scores.is_empty() && self.score_max() > 0.0
    }
}

/// A scored result the user chose to keep in the local history.
///
/// Serialized with camelCase keys, matching records written by earlier app builds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedResult {
    result_name: String,
    test_id: TestId,
    question_count: u32,
    tag_scores: Vec<ChartPoint>,
    score_max: f64,
    saved_at: DateTime<Utc>,
}

impl SavedResult {
    /// Snapshot a scored result under a user-chosen name.
    ///
    /// A blank name falls back to `Test {test_id}`.
    ///
    /// # Errors
    ///
    /// Returns `SavedResultError::NameTooLong` if the trimmed name exceeds
    /// `MAX_RESULT_NAME_LEN` characters.
    pub fn from_scored(
        name: Option<&str>,
        test_id: TestId,
        result: &ScoredResult,
        saved_at: DateTime<Utc>,
    ) -> Result<Self, SavedResultError> {
        let name = name.map(str::trim).filter(|name| !name.is_empty());
        let result_name = match name {
            Some(name) => {
                let len = name.chars().count();
                if len > MAX_RESULT_NAME_LEN {
                    return Err(SavedResultError::NameTooLong {
                        len,
                        max: MAX_RESULT_NAME_LEN,
                    });
                }
                name.to_owned()
            }
            None => format!("Test {test_id}"),
        };

        Ok(Self {
            result_name,
            test_id,
            question_count: result.num_questions,
            tag_scores: result.chart_points(),
            score_max: result.score_max(),
            saved_at,
        })
    }

    #[must_use]
    pub fn result_name(&self) -> &str {
        &self.result_name
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    #[must_use]
    pub fn tag_scores(&self) -> &[ChartPoint] {
        &self.tag_scores
    }

    #[must_use]
    pub fn score_max(&self) -> f64 {
        self.score_max
    }

    #[must_use]
    pub fn saved_at(&self) -> DateTime<Utc> {
        self.saved_at
    }

    /// Sum of all tag scores, shown as the badge on a history entry.
    #[must_use]
    pub fn total_score(&self) -> f64 {
        self.tag_scores.iter().map(|point| point.value).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn scored() -> ScoredResult {
        ScoredResult {
            tag_scores: vec![
                TagScore {
                    tag_name: "Anxiety".into(),
                    score: 3.0,
                },
                TagScore {
                    tag_name: "Mood".into(),
                    score: 4.5,
                },
            ],
            advice: Some(Advice {
                title: "Take a break".into(),
                content: "Sleep more.".into(),
                score_max: 10.0,
            }),
            num_questions: 12,
        }
    }

    #[test]
    fn scored_result_parses_backend_payload() {
        let raw = r#"{
            "tag_scores": [{"tag_name": "Focus", "score": 7}],
            "advice": {"title": "T", "content": "C", "score_max": 10},
            "num_questions": 5
        }"#;
        let result: ScoredResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.tag_scores[0].score, 7.0);
        assert_eq!(result.score_max(), 10.0);
        assert!(result.has_chart());
    }

    #[test]
    fn missing_advice_disables_chart() {
        let mut result = scored();
        result.advice = None;
        assert_eq!(result.score_max(), 0.0);
        assert!(!result.has_chart());
    }

    #[test]
    fn saved_result_defaults_blank_name() {
        let saved = SavedResult::from_scored(Some("   "), TestId::new(4), &scored(), fixed_now())
            .unwrap();
        assert_eq!(saved.result_name(), "Test 4");

        let saved = SavedResult::from_scored(None, TestId::new(4), &scored(), fixed_now()).unwrap();
        assert_eq!(saved.result_name(), "Test 4");
    }

    #[test]
    fn saved_result_totals_tag_scores() {
        let saved =
            SavedResult::from_scored(Some("Monday"), TestId::new(1), &scored(), fixed_now())
                .unwrap();
        assert_eq!(saved.result_name(), "Monday");
        assert_eq!(saved.question_count(), 12);
        assert_eq!(saved.score_max(), 10.0);
        assert!((saved.total_score() - 7.5).abs() < f64::EPSILON);
    }

    #[test]
    fn saved_result_rejects_overlong_names() {
        let name = "x".repeat(MAX_RESULT_NAME_LEN + 1);
        let err = SavedResult::from_scored(Some(&name), TestId::new(1), &scored(), fixed_now())
            .unwrap_err();
        assert!(matches!(err, SavedResultError::NameTooLong { .. }));
    }

    #[test]
    fn saved_result_uses_camel_case_keys() {
        let saved = SavedResult::from_scored(Some("A"), TestId::new(2), &scored(), fixed_now())
            .unwrap();
        let json = serde_json::to_value(&saved).unwrap();
        assert_eq!(json["resultName"], "A");
        assert_eq!(json["testId"], 2);
        assert_eq!(json["questionCount"], 12);
        assert_eq!(json["tagScores"][0]["label"], "Anxiety");
        assert!(json.get("savedAt").is_some());
    }
}
