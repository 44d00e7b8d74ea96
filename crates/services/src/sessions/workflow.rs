use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};

use psy_core::model::TestId;

use crate::api::PsychologyApi;
use crate::error::SessionError;
use crate::identity::IdentityProvisioner;
use super::state::{Advance, FailureKind, SessionFailure, TestSession};

/// Outcome of `TestSessionService::advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    /// The next question is on screen.
    Next,
    /// Answers were accepted; fetch the result for this test.
    Completed(TestId),
}

/// Drives a `TestSession` against the backend: identity, loading, submission, retry.
#[derive(Clone)]
pub struct TestSessionService {
    api: Arc<dyn PsychologyApi>,
    identity: Arc<dyn IdentityProvisioner>,
}

impl TestSessionService {
    #[must_use]
    pub fn new(api: Arc<dyn PsychologyApi>, identity: Arc<dyn IdentityProvisioner>) -> Self {
        Self { api, identity }
    }

    /// Create a session for `test_id` and run it up to `Active`.
    ///
    /// The session is returned even when loading fails, so the caller can show
    /// its failure and offer `retry`.
    pub async fn start(&self, test_id: TestId) -> (TestSession, Result<(), SessionError>) {
        let mut session = TestSession::new(test_id);
        let outcome = self.load_test(&mut session).await;
        (session, outcome)
    }

    /// Resolve the device's user and bind it to the session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Identity` (session `Errored`) if the user cannot be
    /// resolved, or `SessionError::Abandoned` if the session was dropped meanwhile.
    pub async fn resolve_identity(&self, session: &mut TestSession) -> Result<(), SessionError> {
        ensure_alive(session)?;
        let resolved = self.identity.resolve_user_id().await;
        ensure_alive(session)?;

        match resolved {
            Ok(user_id) => {
                session.bind_user(user_id);
                Ok(())
            }
            Err(err) => {
                warn!("identity resolution failed: {err}");
                session.fail(
                    SessionFailure::new(FailureKind::Identity, err.to_string())
                        .with_timeout(err.is_timeout()),
                );
                Err(err.into())
            }
        }
    }

    /// Fetch the questions and, concurrently, every question's answer options.
    ///
    /// A failed answer fetch leaves that question with no options; only the
    /// question fetch itself can fail the load.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyTest` when the test has no questions,
    /// `SessionError::Load` when the questions cannot be fetched,
    /// `SessionError::Identity` when no user is bound and none can be resolved,
    /// and `SessionError::Abandoned` if the session was dropped mid-flight.
    pub async fn load_test(&self, session: &mut TestSession) -> Result<(), SessionError> {
        if session.user_id().is_none() {
            self.resolve_identity(session).await?;
        }
        ensure_alive(session)?;

        let test_id = session.test_id();
        session.begin_loading();
        let questions = self.api.questions(test_id).await;
        ensure_alive(session)?;

        let questions = match questions {
            Ok(questions) => questions,
            Err(err) => {
                warn!("loading questions for test {test_id} failed: {err}");
                session.fail(
                    SessionFailure::new(FailureKind::Load, err.to_string())
                        .with_timeout(err.is_timeout()),
                );
                return Err(SessionError::Load(err));
            }
        };
        session.questions_loaded(questions)?;

        let api = self.api.as_ref();
        let fetches = session.questions().iter().map(|question| {
            let question_id = question.id;
            async move {
                match api.answers(question_id).await {
                    Ok(answers) => (question_id, answers),
                    Err(err) => {
                        warn!("answers for question {question_id} unavailable: {err}");
                        (question_id, Vec::new())
                    }
                }
            }
        });
        let answers: HashMap<_, _> = join_all(fetches).await.into_iter().collect();
        ensure_alive(session)?;

        debug!(
            "test {test_id} loaded: {} questions, {} with options",
            session.questions().len(),
            answers.values().filter(|options| !options.is_empty()).count()
        );
        session.answers_loaded(answers);
        Ok(())
    }

    /// Advance past the current question, submitting after the last one.
    ///
    /// # Errors
    ///
    /// Propagates `TestSession::advance` errors and submission failures.
    pub async fn advance(&self, session: &mut TestSession) -> Result<SessionStep, SessionError> {
        match session.advance()? {
            Advance::Next => Ok(SessionStep::Next),
            Advance::ReadyToSubmit => {
                let test_id = self.submit(session).await?;
                Ok(SessionStep::Completed(test_id))
            }
        }
    }

    /// Send the whole answer set in one request.
    ///
    /// On failure the session is `Errored` with its selections intact, so a
    /// later call resends the same batch.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Submission` if the backend rejects the batch,
    /// `SessionError::NotActive` if the session is not ready to submit, and
    /// `SessionError::Abandoned` if the session was dropped.
    pub async fn submit(&self, session: &mut TestSession) -> Result<TestId, SessionError> {
        ensure_alive(session)?;
        let submission = session.begin_submit()?;
        let sent = self.api.submit(&submission).await;
        ensure_alive(session)?;

        match sent {
            Ok(()) => {
                info!(
                    "submitted {} answers for test {}",
                    submission.answers.len(),
                    submission.test_id
                );
                session.complete();
                Ok(submission.test_id)
            }
            Err(err) => {
                warn!("submission for test {} failed: {err}", submission.test_id);
                session.fail(
                    SessionFailure::new(FailureKind::Submit, err.to_string())
                        .with_timeout(err.is_timeout()),
                );
                Err(SessionError::Submission(err))
            }
        }
    }

    /// Repeat whatever failed: identity and loading restart from scratch,
    /// submission resends the preserved answers.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NothingToRetry` unless the session is `Errored`,
    /// `SessionError::NotRetryable` for an empty test, or the retried step's error.
    pub async fn retry(&self, session: &mut TestSession) -> Result<Option<TestId>, SessionError> {
        let failure = session.failure().ok_or(SessionError::NothingToRetry)?;
        if !failure.is_retryable() {
            return Err(SessionError::NotRetryable);
        }

        match failure.kind() {
            FailureKind::Identity | FailureKind::Load | FailureKind::EmptyTest => {
                self.load_test(session).await?;
                Ok(None)
            }
            FailureKind::Submit => self.submit(session).await.map(Some),
        }
    }
}

fn ensure_alive(session: &TestSession) -> Result<(), SessionError> {
    if session.is_alive() {
        Ok(())
    } else {
        debug!("dropping work for abandoned session on test {}", session.test_id());
        Err(SessionError::Abandoned)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
