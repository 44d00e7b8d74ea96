use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use psy_core::model::{Answer, AnswerId, Question, QuestionId, TestId, UserAnswer, UserId};

use crate::api::Submission;
use crate::error::SessionError;
use super::progress::SessionProgress;

//
// ─── STATES ────────────────────────────────────────────────────────────────────
//

/// Why a session stopped in `SessionState::Errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The device's user could not be resolved.
    Identity,
    /// The backend returned no questions for the test.
    EmptyTest,
    /// The question list could not be fetched.
    Load,
    /// The answer set could not be submitted.
    Submit,
}

/// A failure carried by an errored session, with the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFailure {
    kind: FailureKind,
    detail: String,
    timed_out: bool,
}

impl SessionFailure {
    #[must_use]
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            timed_out: false,
        }
    }

    /// Mark the failure as caused by the backend not answering in time.
    #[must_use]
    pub fn with_timeout(mut self, timed_out: bool) -> Self {
        self.timed_out = timed_out;
        self
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Technical cause, for logs.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }

    #[must_use]
    pub fn user_message(&self) -> &'static str {
        if self.timed_out {
            return match self.kind {
                FailureKind::Submit => "The server took too long to accept the results.",
                _ => "The server took too long to respond.",
            };
        }
        match self.kind {
            FailureKind::Identity => "Could not verify the user.",
            FailureKind::EmptyTest => "This test has no questions.",
            FailureKind::Load => "Could not load the questions.",
            FailureKind::Submit => "Submitting the results failed.",
        }
    }

    /// An empty test stays empty until the backend data changes.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self.kind, FailureKind::EmptyTest)
    }
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.user_message(), self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    LoadingQuestions,
    LoadingAnswers,
    Active,
    Submitting,
    Completed,
    Errored(SessionFailure),
}

/// What `TestSession::advance` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Moved to the next question.
    Next,
    /// The last question was answered; the session is now `Submitting`.
    ReadyToSubmit,
}

/// Shared flag telling in-flight work whether its session is still wanted.
#[derive(Debug, Clone)]
pub struct SessionLiveness(Arc<AtomicBool>);

impl SessionLiveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Mark the session abandoned; responses arriving later are dropped.
    pub fn abandon(&self) {
        self.0.store(false, Ordering::Release);
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One attempt at a test: a fixed question order walked front to back, one
/// selection per question, submitted as a single batch.
pub struct TestSession {
    test_id: TestId,
    user_id: Option<UserId>,
    questions: Vec<Question>,
    answers: HashMap<QuestionId, Vec<Answer>>,
    current: usize,
    highlighted: Option<AnswerId>,
    selections: HashMap<QuestionId, AnswerId>,
    state: SessionState,
    liveness: SessionLiveness,
}

impl TestSession {
    #[must_use]
    pub fn new(test_id: TestId) -> Self {
        Self {
            test_id,
            user_id: None,
            questions: Vec::new(),
            answers: HashMap::new(),
            current: 0,
            highlighted: None,
            selections: HashMap::new(),
            state: SessionState::Initializing,
            liveness: SessionLiveness::new(),
        }
    }

    #[must_use]
    pub fn test_id(&self) -> TestId {
        self.test_id
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn failure(&self) -> Option<&SessionFailure> {
        match &self.state {
            SessionState::Errored(failure) => Some(failure),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Completed
    }

    /// The test to fetch a scored result for, once completed.
    #[must_use]
    pub fn result_ref(&self) -> Option<TestId> {
        self.is_complete().then_some(self.test_id)
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Options for the current question; empty when its fetch failed.
    #[must_use]
    pub fn current_answers(&self) -> &[Answer] {
        self.current_question()
            .map(|question| self.answers_for(question.id))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn answers_for(&self, question_id: QuestionId) -> &[Answer] {
        self.answers
            .get(&question_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn highlighted(&self) -> Option<AnswerId> {
        self.highlighted
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        !self.questions.is_empty() && self.current + 1 == self.questions.len()
    }

    /// Whether the "next" action is available: an answer is highlighted, or
    /// the question has no options to choose from.
    #[must_use]
    pub fn can_advance(&self) -> bool {
        self.is_active() && (self.highlighted.is_some() || self.current_answers().is_empty())
    }

    /// Selections so far, in question order.
    #[must_use]
    pub fn user_answers(&self) -> Vec<UserAnswer> {
        self.questions
            .iter()
            .filter_map(|question| {
                self.selections
                    .get(&question.id)
                    .map(|answer_id| UserAnswer {
                        question_id: question.id,
                        answer_id: *answer_id,
                    })
            })
            .collect()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let total = self.questions.len();
        SessionProgress {
            current: if total == 0 { 0 } else { self.current + 1 },
            total,
            answered: self.selections.len(),
        }
    }

    #[must_use]
    pub fn liveness(&self) -> SessionLiveness {
        self.liveness.clone()
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    pub fn abandon(&self) {
        self.liveness.abandon();
    }

    /// Select `answer_id` for the current question, replacing any earlier choice.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside the `Active` state and
    /// `SessionError::UnknownAnswer` if the id is not offered for the current question.
    pub fn select_answer(&mut self, answer_id: AnswerId) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::NotActive);
        }
        let question_id = self
            .current_question()
            .map(|question| question.id)
            .ok_or(SessionError::NotActive)?;
        let offered = self.answers_for(question_id);
        if !offered.iter().any(|answer| answer.id == answer_id) {
            return Err(SessionError::UnknownAnswer(answer_id.value()));
        }

        self.selections.insert(question_id, answer_id);
        self.highlighted = Some(answer_id);
        Ok(())
    }

    /// Move past the current question.
    ///
    /// On the last question the session enters `Submitting`; the caller sends
    /// the batch. Questions without options can be passed without a selection.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotActive` outside the `Active` state and
    /// `SessionError::NoSelection` if the question has options but none is chosen.
    pub fn advance(&mut self) -> Result<Advance, SessionError> {
        if !self.is_active() {
            return Err(SessionError::NotActive);
        }
        let question_id = self
            .current_question()
            .map(|question| question.id)
            .ok_or(SessionError::NotActive)?;
        if !self.answers_for(question_id).is_empty()
            && !self.selections.contains_key(&question_id)
        {
            return Err(SessionError::NoSelection);
        }

        if self.is_last_question() {
            self.state = SessionState::Submitting;
            Ok(Advance::ReadyToSubmit)
        } else {
            self.current += 1;
            self.highlighted = None;
            Ok(Advance::Next)
        }
    }

    //
    // ─── TRANSITIONS DRIVEN BY THE SERVICE ──────────────────────────────────────
    //

    pub(crate) fn bind_user(&mut self, user_id: UserId) {
        self.user_id = Some(user_id);
    }

    /// Reset everything fetched or selected and start a fresh load.
    pub(crate) fn begin_loading(&mut self) {
        self.questions.clear();
        self.answers.clear();
        self.selections.clear();
        self.current = 0;
        self.highlighted = None;
        self.state = SessionState::LoadingQuestions;
    }

    pub(crate) fn questions_loaded(
        &mut self,
        questions: Vec<Question>,
    ) -> Result<(), SessionError> {
        if questions.is_empty() {
            let detail = format!("test {} returned no questions", self.test_id);
            self.fail(SessionFailure::new(FailureKind::EmptyTest, detail));
            return Err(SessionError::EmptyTest);
        }
        self.questions = questions;
        self.state = SessionState::LoadingAnswers;
        Ok(())
    }

    pub(crate) fn answers_loaded(&mut self, answers: HashMap<QuestionId, Vec<Answer>>) {
        self.answers = answers;
        self.state = SessionState::Active;
    }

    /// Enter `Submitting`, from a finished walk or a failed earlier attempt.
    pub(crate) fn begin_submit(&mut self) -> Result<Submission, SessionError> {
        let resumable = match &self.state {
            SessionState::Submitting => true,
            SessionState::Errored(failure) => failure.kind() == FailureKind::Submit,
            _ => false,
        };
        if !resumable {
            return Err(SessionError::NotActive);
        }
        let user_id = self.user_id.ok_or(SessionError::NotActive)?;
        self.state = SessionState::Submitting;
        Ok(Submission {
            user_id,
            test_id: self.test_id,
            answers: self.user_answers(),
        })
    }

    pub(crate) fn complete(&mut self) {
        self.state = SessionState::Completed;
    }

    pub(crate) fn fail(&mut self, failure: SessionFailure) {
        self.state = SessionState::Errored(failure);
    }
}

impl fmt::Debug for TestSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSession")
            .field("test_id", &self.test_id)
            .field("user_id", &self.user_id)
            .field("questions_len", &self.questions.len())
            .field("current", &self.current)
            .field("selections_len", &self.selections.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
