use std::sync::Arc;

use psy_core::model::{Category, CategoryId, TestDetail, TestId, TestSummary};

use crate::api::PsychologyApi;
use crate::error::ApiError;

/// Read-only browsing of categories and tests.
#[derive(Clone)]
pub struct CatalogService {
    api: Arc<dyn PsychologyApi>,
}

impl CatalogService {
    #[must_use]
    pub fn new(api: Arc<dyn PsychologyApi>) -> Self {
        Self { api }
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the backend call fails.
    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        self.api.categories().await
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the backend call fails.
    pub async fn tests_in_category(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<TestSummary>, ApiError> {
        self.api.tests_in_category(category_id).await
    }

    /// # Errors
    ///
    /// Returns `ApiError` if the backend call fails or the test is unknown.
    pub async fn test_detail(&self, test_id: TestId) -> Result<TestDetail, ApiError> {
        self.api.test_detail(test_id).await
    }
}
