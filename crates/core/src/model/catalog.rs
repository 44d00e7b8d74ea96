use serde::{Deserialize, Serialize};

use crate::model::{CategoryId, TestId};

/// A group of tests, e.g. "Stress" or "Personality".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A test as listed inside a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSummary {
    pub id: TestId,
    pub test_name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub category_id: CategoryId,
}

/// Detail view for a single test. Extra backend fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDetail {
    pub test_name: String,
    #[serde(default)]
    pub question_count: u32,
}
