//! Typed contract of the psychology backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use psy_core::model::{
    Answer, Category, CategoryId, DeviceId, Question, QuestionId, ScoredResult, TestDetail, TestId,
    TestSummary, UserAnswer, UserId,
};

use crate::error::ApiError;

mod http;
mod scripted;

pub use http::HttpPsychologyApi;
pub use scripted::ScriptedApi;

/// Body of `POST /user` for a device-bound guest account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewGuestUser {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub is_active: bool,
    pub role: String,
    pub device_id: DeviceId,
    pub firebase_token: String,
}

impl NewGuestUser {
    /// Placeholder guest credentials tagged with the device id.
    ///
    /// `email_nonce` keeps repeated registrations from colliding on email.
    #[must_use]
    pub fn for_device(device_id: DeviceId, email_nonce: u32) -> Self {
        Self {
            full_name: "guest".into(),
            email: format!("{device_id}-{email_nonce}@guest.test"),
            password: "random_password".into(),
            is_active: true,
            role: "guest".into(),
            device_id,
            firebase_token: String::new(),
        }
    }
}

/// Body of `POST /psychology/test/submit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub user_id: UserId,
    pub test_id: TestId,
    pub answers: Vec<UserAnswer>,
}

/// Every backend response wraps its payload in `data`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub(crate) fn into_data(self) -> Result<T, ApiError> {
        self.data
            .ok_or_else(|| ApiError::MissingData(self.message.unwrap_or_default()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserRef {
    pub id: UserId,
}

/// Remote operations used by the app.
#[async_trait]
pub trait PsychologyApi: Send + Sync {
    /// `GET /user?device_id=`: users bound to the device, in backend order.
    async fn find_users_by_device(&self, device_id: &DeviceId) -> Result<Vec<UserId>, ApiError>;

    /// `POST /user`
    async fn create_user(&self, user: &NewGuestUser) -> Result<UserId, ApiError>;

    /// `GET /psychology/categories`
    async fn categories(&self) -> Result<Vec<Category>, ApiError>;

    /// `GET /psychology/categories/{id}/tests`
    async fn tests_in_category(&self, category_id: CategoryId)
    -> Result<Vec<TestSummary>, ApiError>;

    /// `GET /psychology/test/{id}`
    async fn test_detail(&self, test_id: TestId) -> Result<TestDetail, ApiError>;

    /// `GET /psychology/test/{id}/questions`, in presentation order.
    async fn questions(&self, test_id: TestId) -> Result<Vec<Question>, ApiError>;

    /// `GET /psychology/test/{question_id}/answer`
    async fn answers(&self, question_id: QuestionId) -> Result<Vec<Answer>, ApiError>;

    /// `POST /psychology/test/submit`
    async fn submit(&self, submission: &Submission) -> Result<(), ApiError>;

    /// `GET /psychology/test/history/{device_id}/{test_id}`
    async fn scored_result(
        &self,
        device_id: &DeviceId,
        test_id: TestId,
    ) -> Result<ScoredResult, ApiError>;
}
