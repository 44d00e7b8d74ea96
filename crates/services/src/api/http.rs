use async_trait::async_trait;
use log::debug;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

use psy_core::model::{
    Answer, Category, CategoryId, DeviceId, Question, QuestionId, ScoredResult, TestDetail, TestId,
    TestSummary, UserId,
};

use super::{Envelope, NewGuestUser, PsychologyApi, Submission, UserRef};
use crate::config::ApiConfig;
use crate::error::ApiError;

/// `reqwest`-backed client for the versioned REST API.
#[derive(Clone, Debug)]
pub struct HttpPsychologyApi {
    client: Client,
    base_url: Url,
}

impl HttpPsychologyApi {
    /// Build a client with the configured base URL and request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Url` for an unusable base URL, or a transport error
    /// if the HTTP client cannot be constructed.
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(config.base_url.trim())
            .map_err(|err| ApiError::Url(format!("{}: {err}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Url(config.base_url.clone()));
        }
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Url(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_envelope<T: DeserializeOwned>(&self, url: Url) -> Result<Envelope<T>, ApiError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let response = ensure_success(response)?;
        Ok(response.json().await?)
    }

    async fn get_data<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        self.get_envelope(url).await?.into_data()
    }
}

fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::HttpStatus(status.as_u16()))
    }
}

#[async_trait]
impl PsychologyApi for HttpPsychologyApi {
    async fn find_users_by_device(&self, device_id: &DeviceId) -> Result<Vec<UserId>, ApiError> {
        let mut url = self.endpoint(&["user"])?;
        url.query_pairs_mut()
            .append_pair("device_id", device_id.as_str());
        let envelope: Envelope<Vec<UserRef>> = self.get_envelope(url).await?;
        Ok(envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|user| user.id)
            .collect())
    }

    async fn create_user(&self, user: &NewGuestUser) -> Result<UserId, ApiError> {
        let url = self.endpoint(&["user"])?;
        debug!("POST {url}");
        let response = self.client.post(url).json(user).send().await?;
        let envelope: Envelope<UserRef> = ensure_success(response)?.json().await?;
        Ok(envelope.into_data()?.id)
    }

    async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        let url = self.endpoint(&["psychology", "categories"])?;
        self.get_data(url).await
    }

    async fn tests_in_category(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<TestSummary>, ApiError> {
        let url = self.endpoint(&[
            "psychology",
            "categories",
            &category_id.to_string(),
            "tests",
        ])?;
        self.get_data(url).await
    }

    async fn test_detail(&self, test_id: TestId) -> Result<TestDetail, ApiError> {
        let url = self.endpoint(&["psychology", "test", &test_id.to_string()])?;
        self.get_data(url).await
    }

    async fn questions(&self, test_id: TestId) -> Result<Vec<Question>, ApiError> {
        let url = self.endpoint(&["psychology", "test", &test_id.to_string(), "questions"])?;
        let envelope: Envelope<Vec<Question>> = self.get_envelope(url).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn answers(&self, question_id: QuestionId) -> Result<Vec<Answer>, ApiError> {
        let url = self.endpoint(&["psychology", "test", &question_id.to_string(), "answer"])?;
        self.get_data(url).await
    }

    async fn submit(&self, submission: &Submission) -> Result<(), ApiError> {
        let url = self.endpoint(&["psychology", "test", "submit"])?;
        debug!(
            "POST {url} ({} answers for test {})",
            submission.answers.len(),
            submission.test_id
        );
        let response = self.client.post(url).json(submission).send().await?;
        ensure_success(response)?;
        Ok(())
    }

    async fn scored_result(
        &self,
        device_id: &DeviceId,
        test_id: TestId,
    ) -> Result<ScoredResult, ApiError> {
        let url = self.endpoint(&[
            "psychology",
            "test",
            "history",
            device_id.as_str(),
            &test_id.to_string(),
        ])?;
        self.get_data(url).await
    }
}
