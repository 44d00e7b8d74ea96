use serde::{Deserialize, Serialize};

use crate::model::{AnswerId, QuestionId};

/// A question prompt as served by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub name: String,
}

/// One selectable option for a question, carrying its score weight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub question_id: QuestionId,
    pub answer: String,
    pub score: i32,
}

impl Answer {
    /// Emoji shown next to the option, keyed by its score weight.
    #[must_use]
    pub fn score_emoji(&self) -> &'static str {
        match self.score {
            1 => "😞",
            2 => "👌",
            3 => "😊",
            4 => "😄",
            5 => "🤩",
            _ => "❓",
        }
    }
}

/// The selection made for one question during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserAnswer {
    pub question_id: QuestionId,
    pub answer_id: AnswerId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_deserializes_from_backend_shape() {
        let raw = r#"{"id": 5, "question_id": 2, "answer": "Often", "score": 4}"#;
        let answer: Answer = serde_json::from_str(raw).unwrap();
        assert_eq!(answer.id, AnswerId::new(5));
        assert_eq!(answer.question_id, QuestionId::new(2));
        assert_eq!(answer.score_emoji(), "😄");
    }

    #[test]
    fn unknown_scores_get_placeholder_emoji() {
        let answer = Answer {
            id: AnswerId::new(1),
            question_id: QuestionId::new(1),
            answer: "?".into(),
            score: 9,
        };
        assert_eq!(answer.score_emoji(), "❓");
    }

    #[test]
    fn user_answer_serializes_submission_fields() {
        let ua = UserAnswer {
            question_id: QuestionId::new(1),
            answer_id: AnswerId::new(10),
        };
        let json = serde_json::to_value(ua).unwrap();
        assert_eq!(json, serde_json::json!({"question_id": 1, "answer_id": 10}));
    }
}
