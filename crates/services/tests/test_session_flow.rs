use std::sync::Arc;

use psy_core::model::{Answer, AnswerId, Question, QuestionId, TestId, UserAnswer, UserId};
use psy_core::time::fixed_clock;
use services::{
    DeviceRegistry, IdentityPolicy, PsychologyApi, ScriptedApi, SessionError, SessionState,
    SessionStep, TestSession, TestSessionService, provisioner_for,
};
use storage::repository::{InMemoryStore, KeyValueStore, keys};

const TEST: u64 = 7;

fn question(id: u64, options: &[(u64, i32)]) -> (Question, Vec<Answer>) {
    (
        Question {
            id: QuestionId::new(id),
            name: format!("How often do you feel Q{id}?"),
        },
        options
            .iter()
            .map(|(answer_id, score)| Answer {
                id: AnswerId::new(*answer_id),
                question_id: QuestionId::new(id),
                answer: format!("option {answer_id}"),
                score: *score,
            })
            .collect(),
    )
}

async fn service_with_user(api: &ScriptedApi, user: u64) -> TestSessionService {
    let store = InMemoryStore::new();
    store.set(keys::DEVICE_ID, "device-test").await.unwrap();
    store.set(keys::USER_ID, &user.to_string()).await.unwrap();
    let api: Arc<dyn PsychologyApi> = Arc::new(api.clone());
    let registry = DeviceRegistry::new(fixed_clock(), Arc::new(store), Arc::clone(&api));
    TestSessionService::new(api, provisioner_for(IdentityPolicy::LocalCacheFirst, registry))
}

fn two_question_api() -> ScriptedApi {
    ScriptedApi::new().with_test(
        TestId::new(TEST),
        vec![
            question(1, &[(100, 3), (101, 1)]),
            question(2, &[(200, 1), (201, 5)]),
        ],
    )
}

#[tokio::test]
async fn two_question_walk_submits_exact_payload() {
    let api = two_question_api();
    let svc = service_with_user(&api, 42).await;

    let (mut session, outcome) = svc.start(TestId::new(TEST)).await;
    outcome.unwrap();

    session.select_answer(AnswerId::new(100)).unwrap();
    assert_eq!(svc.advance(&mut session).await.unwrap(), SessionStep::Next);
    session.select_answer(AnswerId::new(201)).unwrap();
    assert_eq!(
        svc.advance(&mut session).await.unwrap(),
        SessionStep::Completed(TestId::new(TEST))
    );

    assert_eq!(session.state(), &SessionState::Completed);
    assert_eq!(session.result_ref(), Some(TestId::new(TEST)));
    let submissions = api.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].user_id, UserId::new(42));
    assert_eq!(submissions[0].test_id, TestId::new(TEST));
    assert_eq!(
        submissions[0].answers,
        vec![
            UserAnswer {
                question_id: QuestionId::new(1),
                answer_id: AnswerId::new(100),
            },
            UserAnswer {
                question_id: QuestionId::new(2),
                answer_id: AnswerId::new(201),
            },
        ]
    );
}

#[tokio::test]
async fn changed_mind_submits_last_selection_only() {
    let api = two_question_api();
    let svc = service_with_user(&api, 1).await;
    let (mut session, _) = svc.start(TestId::new(TEST)).await;

    session.select_answer(AnswerId::new(101)).unwrap();
    session.select_answer(AnswerId::new(100)).unwrap();
    svc.advance(&mut session).await.unwrap();
    session.select_answer(AnswerId::new(200)).unwrap();
    session.select_answer(AnswerId::new(201)).unwrap();
    session.select_answer(AnswerId::new(200)).unwrap();
    svc.advance(&mut session).await.unwrap();

    let answers = &api.submissions()[0].answers;
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0].answer_id, AnswerId::new(100));
    assert_eq!(answers[1].answer_id, AnswerId::new(200));
}

#[tokio::test]
async fn failed_submission_keeps_answers_for_retry() {
    let api = two_question_api().failing_submissions(1);
    let svc = service_with_user(&api, 5).await;
    let (mut session, _) = svc.start(TestId::new(TEST)).await;

    session.select_answer(AnswerId::new(101)).unwrap();
    svc.advance(&mut session).await.unwrap();
    session.select_answer(AnswerId::new(200)).unwrap();

    let err = svc.advance(&mut session).await.unwrap_err();
    assert!(matches!(err, SessionError::Submission(_)));
    let before = session.user_answers();
    let failure = session.failure().unwrap();
    assert_eq!(failure.user_message(), "Submitting the results failed.");
    assert!(failure.is_retryable());
    assert!(api.submissions().is_empty());

    let result = svc.retry(&mut session).await.unwrap();

    assert_eq!(result, Some(TestId::new(TEST)));
    assert!(session.is_complete());
    assert_eq!(session.user_answers(), before);
    assert_eq!(api.submissions().len(), 1);
    assert_eq!(api.submissions()[0].answers, before);
}

#[tokio::test]
async fn unreachable_options_do_not_deadlock_the_walk() {
    let api = ScriptedApi::new()
        .with_test(
            TestId::new(TEST),
            vec![
                question(1, &[(10, 1)]),
                question(2, &[(20, 2)]),
                question(3, &[(30, 3)]),
            ],
        )
        .failing_answers_for(QuestionId::new(2));
    let svc = service_with_user(&api, 3).await;
    let (mut session, outcome) = svc.start(TestId::new(TEST)).await;
    outcome.unwrap();

    session.select_answer(AnswerId::new(10)).unwrap();
    svc.advance(&mut session).await.unwrap();
    assert!(session.current_answers().is_empty());
    assert!(session.can_advance());
    svc.advance(&mut session).await.unwrap();
    session.select_answer(AnswerId::new(30)).unwrap();
    svc.advance(&mut session).await.unwrap();

    assert!(session.is_complete());
    let ids: Vec<_> = api.submissions()[0]
        .answers
        .iter()
        .map(|ua| ua.question_id)
        .collect();
    assert_eq!(ids, vec![QuestionId::new(1), QuestionId::new(3)]);
}

#[tokio::test]
async fn response_after_abandon_is_ignored() {
    let mut session = TestSession::new(TestId::new(TEST));
    let handle = session.liveness();
    let api = two_question_api().on_submit(move || handle.abandon());
    let svc = service_with_user(&api, 8).await;

    svc.load_test(&mut session).await.unwrap();
    session.select_answer(AnswerId::new(100)).unwrap();
    svc.advance(&mut session).await.unwrap();
    session.select_answer(AnswerId::new(201)).unwrap();

    let err = svc.advance(&mut session).await.unwrap_err();

    assert!(matches!(err, SessionError::Abandoned));
    assert_eq!(session.state(), &SessionState::Submitting);
    assert_eq!(session.user_answers().len(), 2);
}
