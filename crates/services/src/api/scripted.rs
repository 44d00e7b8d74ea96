use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use psy_core::model::{
    Answer, Category, CategoryId, DeviceId, Question, QuestionId, ScoredResult, TestDetail, TestId,
    TestSummary, UserId,
};

use super::{NewGuestUser, PsychologyApi, Submission};
use crate::error::ApiError;

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ScriptState {
    users: Vec<(DeviceId, UserId)>,
    next_user_id: u64,
    created: Vec<NewGuestUser>,
    lookup_calls: usize,
    lookup_error: Option<ApiError>,
    create_error: Option<ApiError>,
    categories: Vec<Category>,
    tests: HashMap<CategoryId, Vec<TestSummary>>,
    details: HashMap<TestId, TestDetail>,
    questions: HashMap<TestId, Vec<Question>>,
    questions_error: Option<ApiError>,
    answers: HashMap<QuestionId, Vec<Answer>>,
    failing_answers: HashSet<QuestionId>,
    submit_failures: u32,
    submit_hook: Option<Hook>,
    submissions: Vec<Submission>,
    results: HashMap<(DeviceId, TestId), ScoredResult>,
}

/// Scripted in-memory backend for tests and prototyping.
///
/// Users created through `create_user` become visible to later lookups, so
/// identity flows behave like the real service.
#[derive(Clone, Default)]
pub struct ScriptedApi {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, ScriptState>, ApiError> {
        self.state
            .lock()
            .map_err(|e| ApiError::Transport(e.to_string()))
    }

    fn with_state(self, apply: impl FnOnce(&mut ScriptState)) -> Self {
        if let Ok(mut state) = self.state.lock() {
            apply(&mut state);
        }
        self
    }

    /// Register an existing backend user for `device_id`.
    #[must_use]
    pub fn with_user(self, device_id: DeviceId, user_id: UserId) -> Self {
        self.with_state(|state| {
            state.next_user_id = state.next_user_id.max(user_id.value() + 1);
            state.users.push((device_id, user_id));
        })
    }

    /// Serve `questions` for `test_id`, each with its answer options.
    #[must_use]
    pub fn with_test(self, test_id: TestId, questions: Vec<(Question, Vec<Answer>)>) -> Self {
        self.with_state(|state| {
            let mut ordered = Vec::with_capacity(questions.len());
            for (question, answers) in questions {
                state.answers.insert(question.id, answers);
                ordered.push(question);
            }
            state.questions.insert(test_id, ordered);
        })
    }

    #[must_use]
    pub fn with_category(self, category: Category, tests: Vec<TestSummary>) -> Self {
        self.with_state(|state| {
            state.tests.insert(category.id, tests);
            state.categories.push(category);
        })
    }

    #[must_use]
    pub fn with_detail(self, test_id: TestId, detail: TestDetail) -> Self {
        self.with_state(|state| {
            state.details.insert(test_id, detail);
        })
    }

    #[must_use]
    pub fn with_result(self, device_id: DeviceId, test_id: TestId, result: ScoredResult) -> Self {
        self.with_state(|state| {
            state.results.insert((device_id, test_id), result);
        })
    }

    /// Make every device lookup fail with `error`.
    #[must_use]
    pub fn failing_lookups(self, error: ApiError) -> Self {
        self.with_state(|state| state.lookup_error = Some(error))
    }

    /// Make every user creation fail with `error`.
    #[must_use]
    pub fn failing_creates(self, error: ApiError) -> Self {
        self.with_state(|state| state.create_error = Some(error))
    }

    /// Make the question fetch fail with `error`.
    #[must_use]
    pub fn failing_questions(self, error: ApiError) -> Self {
        self.with_state(|state| state.questions_error = Some(error))
    }

    /// Make the answer fetch for `question_id` fail.
    #[must_use]
    pub fn failing_answers_for(self, question_id: QuestionId) -> Self {
        self.with_state(|state| {
            state.failing_answers.insert(question_id);
        })
    }

    /// Fail the next `count` submissions before accepting one.
    #[must_use]
    pub fn failing_submissions(self, count: u32) -> Self {
        self.with_state(|state| state.submit_failures = count)
    }

    /// Run `hook` while a submission is in flight, before it is answered.
    #[must_use]
    pub fn on_submit(self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.with_state(|state| state.submit_hook = Some(Arc::new(hook)))
    }

    /// Clear a scripted question failure.
    pub fn heal_questions(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.questions_error = None;
        }
    }

    #[must_use]
    pub fn created_users(&self) -> Vec<NewGuestUser> {
        self.lock().map(|s| s.created.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().map(|s| s.submissions.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn lookup_calls(&self) -> usize {
        self.lock().map(|s| s.lookup_calls).unwrap_or_default()
    }
}

#[async_trait]
impl PsychologyApi for ScriptedApi {
    async fn find_users_by_device(&self, device_id: &DeviceId) -> Result<Vec<UserId>, ApiError> {
        let mut state = self.lock()?;
        state.lookup_calls += 1;
        if let Some(err) = &state.lookup_error {
            return Err(err.clone());
        }
        Ok(state
            .users
            .iter()
            .filter(|(device, _)| device == device_id)
            .map(|(_, user)| *user)
            .collect())
    }

    async fn create_user(&self, user: &NewGuestUser) -> Result<UserId, ApiError> {
        let mut state = self.lock()?;
        if let Some(err) = &state.create_error {
            return Err(err.clone());
        }
        let id = UserId::new(state.next_user_id.max(1));
        state.next_user_id = id.value() + 1;
        state.users.push((user.device_id.clone(), id));
        state.created.push(user.clone());
        Ok(id)
    }

    async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        Ok(self.lock()?.categories.clone())
    }

    async fn tests_in_category(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<TestSummary>, ApiError> {
        Ok(self
            .lock()?
            .tests
            .get(&category_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn test_detail(&self, test_id: TestId) -> Result<TestDetail, ApiError> {
        self.lock()?
            .details
            .get(&test_id)
            .cloned()
            .ok_or(ApiError::HttpStatus(404))
    }

    async fn questions(&self, test_id: TestId) -> Result<Vec<Question>, ApiError> {
        let state = self.lock()?;
        if let Some(err) = &state.questions_error {
            return Err(err.clone());
        }
        Ok(state.questions.get(&test_id).cloned().unwrap_or_default())
    }

    async fn answers(&self, question_id: QuestionId) -> Result<Vec<Answer>, ApiError> {
        let state = self.lock()?;
        if state.failing_answers.contains(&question_id) {
            return Err(ApiError::HttpStatus(500));
        }
        state
            .answers
            .get(&question_id)
            .cloned()
            .ok_or(ApiError::HttpStatus(404))
    }

    async fn submit(&self, submission: &Submission) -> Result<(), ApiError> {
        let hook = self.lock()?.submit_hook.clone();
        if let Some(hook) = hook {
            hook();
        }

        let mut state = self.lock()?;
        if state.submit_failures > 0 {
            state.submit_failures -= 1;
            return Err(ApiError::Transport("connection reset".into()));
        }
        state.submissions.push(submission.clone());
        Ok(())
    }

    async fn scored_result(
        &self,
        device_id: &DeviceId,
        test_id: TestId,
    ) -> Result<ScoredResult, ApiError> {
        self.lock()?
            .results
            .get(&(device_id.clone(), test_id))
            .cloned()
            .ok_or(ApiError::HttpStatus(404))
    }
}
