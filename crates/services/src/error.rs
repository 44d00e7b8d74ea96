//! Shared error types for the services crate.

use thiserror::Error;

use psy_core::model::SavedResultError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the backend API client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,
    #[error("request failed with status {0}")]
    HttpStatus(u16),
    #[error("response carried no data: {0}")]
    MissingData(String),
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("invalid request url: {0}")]
    Url(String),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::HttpStatus(status.as_u16())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Errors emitted while resolving the device's backend user.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentityError {
    #[error("could not create guest user: {0}")]
    Creation(#[source] ApiError),
    #[error("backend assigned an invalid user id {0}")]
    InvalidUserId(u64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IdentityError {
    /// Whether the backend call behind this failure timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Creation(err) if err.is_timeout())
    }
}

/// Errors emitted by the test-taking session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("test has no questions")]
    EmptyTest,
    #[error("session is not accepting answers")]
    NotActive,
    #[error("answer {0} is not an option for the current question")]
    UnknownAnswer(u64),
    #[error("no answer selected for the current question")]
    NoSelection,
    #[error("session has no failure to retry")]
    NothingToRetry,
    #[error("session failure is not retryable")]
    NotRetryable,
    #[error("session was abandoned")]
    Abandoned,
    #[error("could not load test: {0}")]
    Load(#[source] ApiError),
    #[error("submission failed: {0}")]
    Submission(#[source] ApiError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// Errors emitted by `HistoryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error("no saved result at position {index} (have {len})")]
    OutOfRange { index: usize, len: usize },
    #[error("saved results are unreadable: {0}")]
    Corrupt(String),
    #[error(transparent)]
    SavedResult(#[from] SavedResultError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ResultService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResultError {
    #[error("no device id stored yet")]
    MissingDevice,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Api(#[from] ApiError),
}
