//! End-to-end sittings through the service layer: assembly, consent, the
//! answer loop, terminal transitions, quotas, and persistence retry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use proctor_core::model::{
    Question, QuestionId, Subject, TelemetryEvent, TelemetryKind, TestVersion, UserId, VersionId,
};
use proctor_core::session::{Conclusion, Lifecycle, SessionStateError};
use proctor_core::time::{fixed_clock, fixed_now};
use services::error::{AssemblerError, QuotaError, SessionError};
use services::{ExamLauncher, ExamServices, MONTHLY_ATTEMPT_QUOTA, SessionController};
use storage::repository::{
    AttemptRecord, AttemptRepository, AttemptRowId, InMemoryRepository, Storage, StorageError,
    TelemetryRepository, TestCatalogRepository,
};

const CORRECT: &str = "Correct";

fn subject() -> Subject {
    Subject::new("police-entrance").unwrap()
}

async fn publish(storage: &Storage, question_count: u64) {
    let version = TestVersion::from_persisted(
        VersionId::new(1),
        subject(),
        "Entrance Examination",
        fixed_now() - Duration::days(1),
        true,
    )
    .unwrap();
    let questions: Vec<Question> = (0..question_count)
        .map(|i| {
            Question::from_persisted(
                QuestionId::new(i + 1),
                version.id(),
                u32::try_from(i).unwrap(),
                format!("Prompt {i}"),
                vec![
                    CORRECT.to_string(),
                    "Wrong A".to_string(),
                    "Wrong B".to_string(),
                ],
                0,
            )
            .unwrap()
        })
        .collect();
    storage
        .catalog
        .publish_version(&version, &questions)
        .await
        .unwrap();
}

/// Answers question `index` by choice text, the way a user reading the
/// shuffled screen would.
async fn answer_by_text(ctl: &mut SessionController, index: usize, text: &str) {
    let view = ctl.view();
    let choice = view.questions[index]
        .choices
        .iter()
        .position(|c| c == text)
        .unwrap();
    ctl.select_answer(index, choice).await.unwrap();
}

async fn answer_all_correct(ctl: &mut SessionController) {
    let count = ctl.view().question_count;
    for index in 0..count {
        if index > 0 {
            ctl.navigate(index).await.unwrap();
        }
        answer_by_text(ctl, index, CORRECT).await;
    }
}

fn count(events: &[TelemetryEvent], kind: TelemetryKind) -> usize {
    events.iter().filter(|event| event.kind == kind).count()
}

fn attempt_record(user: UserId, created_at: DateTime<Utc>) -> AttemptRecord {
    AttemptRecord {
        id: None,
        user_id: user,
        subject: subject(),
        version_id: VersionId::new(1),
        correct_count: 10,
        total_questions: 50,
        score_percent: 20,
        passed: false,
        created_at,
    }
}

#[tokio::test]
async fn full_sitting_submits_and_records_everything() {
    let storage = Storage::in_memory();
    publish(&storage, 50).await;
    let services = ExamServices::from_storage(fixed_clock(), &storage);
    let launcher = services.launcher();
    let user = UserId::random();

    let before = launcher.quota_status(user, &subject()).await.unwrap();
    assert_eq!(before.used, 0);
    assert_eq!(before.remaining(), MONTHLY_ATTEMPT_QUOTA);

    let mut ctl = launcher.start(user, &subject()).await.unwrap();
    assert_eq!(ctl.lifecycle(), Lifecycle::Consent);
    assert_eq!(ctl.view().question_count, 50);
    assert_eq!(ctl.remaining_seconds(), 3_600);

    ctl.accept_consent().await.unwrap();
    let stream = ctl.telemetry_session().unwrap();
    answer_all_correct(&mut ctl).await;

    let result = ctl.submit().await.unwrap();
    assert_eq!(result.outcome.conclusion, Conclusion::Submitted);
    assert_eq!(result.outcome.correct_count, 50);
    assert_eq!(result.outcome.score_percent, 100);
    assert!(result.outcome.passed);
    assert!(result.attempt_id.is_some());
    assert_eq!(ctl.lifecycle(), Lifecycle::Submitted);

    let after = launcher.quota_status(user, &subject()).await.unwrap();
    assert_eq!(after.used, 1);
    assert_eq!(after.remaining(), MONTHLY_ATTEMPT_QUOTA - 1);

    let latest = services
        .history()
        .latest(user, &subject())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.score_percent(), 100);
    assert!(latest.passed());

    let events = storage.telemetry.events_for_session(stream).await.unwrap();
    assert_eq!(count(&events, TelemetryKind::Start), 1);
    assert_eq!(count(&events, TelemetryKind::QuestionView), 50);
    assert_eq!(count(&events, TelemetryKind::AnswerSelect), 50);
    assert_eq!(count(&events, TelemetryKind::Next), 49);
    assert_eq!(count(&events, TelemetryKind::Prev), 0);
    assert_eq!(count(&events, TelemetryKind::Submit), 1);

    let submit = events
        .iter()
        .find(|event| event.kind == TelemetryKind::Submit)
        .unwrap();
    assert_eq!(submit.payload["reason"], "user");
    assert_eq!(submit.payload["score_percent"], 100);
    assert_eq!(submit.payload["passed"], true);
}

#[tokio::test]
async fn each_sitting_gets_its_own_choice_order() {
    let storage = Storage::in_memory();
    publish(&storage, 50).await;
    let launcher = ExamServices::from_storage(fixed_clock(), &storage).launcher();

    let first = launcher.start(UserId::random(), &subject()).await.unwrap();
    let second = launcher.start(UserId::random(), &subject()).await.unwrap();

    let a = first.view();
    let b = second.view();
    assert_eq!(a.question_count, b.question_count);

    // Question order is fixed; only each question's choices move.
    for (qa, qb) in a.questions.iter().zip(&b.questions) {
        assert_eq!(qa.prompt, qb.prompt);
        let mut sorted_a = qa.choices.clone();
        sorted_a.sort();
        let mut sorted_b = qb.choices.clone();
        sorted_b.sort();
        assert_eq!(sorted_a, sorted_b);
    }
    assert!(
        a.questions
            .iter()
            .zip(&b.questions)
            .any(|(qa, qb)| qa.choices != qb.choices)
    );
}

#[tokio::test]
async fn timeout_coerces_unanswered_and_fails() {
    let storage = Storage::in_memory();
    publish(&storage, 4).await;
    let launcher = ExamServices::from_storage(fixed_clock(), &storage).launcher();
    let user = UserId::random();

    let mut ctl = launcher.start(user, &subject()).await.unwrap();
    ctl.accept_consent().await.unwrap();
    answer_by_text(&mut ctl, 0, CORRECT).await;
    ctl.navigate(1).await.unwrap();
    answer_by_text(&mut ctl, 1, CORRECT).await;

    let mut ticks = 0;
    loop {
        let report = ctl.tick().await;
        ticks += 1;
        if report.clock_stopped {
            break;
        }
    }
    assert_eq!(ticks, 3_600);
    assert_eq!(ctl.lifecycle(), Lifecycle::TimedOut);

    let outcome = ctl.outcome().unwrap();
    assert_eq!(outcome.conclusion, Conclusion::TimedOut);
    assert_eq!(outcome.correct_count, 2);
    assert_eq!(outcome.total_questions, 4);
    assert_eq!(outcome.score_percent, 50);
    assert!(!outcome.passed);
    assert!(ctl.attempt_id().is_some());

    let err = ctl.submit().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::State(SessionStateError::AlreadyFinished)
    ));

    let stream = ctl.telemetry_session().unwrap();
    let events = storage.telemetry.events_for_session(stream).await.unwrap();
    let submit = events
        .iter()
        .find(|event| event.kind == TelemetryKind::Submit)
        .unwrap();
    assert_eq!(submit.payload["reason"], "timeout");
}

#[tokio::test]
async fn withdrawal_fails_regardless_of_score() {
    let storage = Storage::in_memory();
    publish(&storage, 2).await;
    let services = ExamServices::from_storage(fixed_clock(), &storage);
    let launcher = services.launcher();
    let user = UserId::random();

    let mut ctl = launcher.start(user, &subject()).await.unwrap();
    ctl.accept_consent().await.unwrap();
    answer_all_correct(&mut ctl).await;

    let result = ctl.withdraw().await.unwrap();
    assert_eq!(result.outcome.conclusion, Conclusion::Withdrawn);
    assert_eq!(result.outcome.score_percent, 100);
    assert!(!result.outcome.passed);

    let latest = services
        .history()
        .latest(user, &subject())
        .await
        .unwrap()
        .unwrap();
    assert!(!latest.passed());

    let stream = ctl.telemetry_session().unwrap();
    let events = storage.telemetry.events_for_session(stream).await.unwrap();
    assert_eq!(count(&events, TelemetryKind::Submit), 0);
    let withdraw = events
        .iter()
        .find(|event| event.kind == TelemetryKind::Withdraw)
        .unwrap();
    assert_eq!(withdraw.payload["reason"], "user");
}

#[tokio::test]
async fn quota_blocks_a_third_sitting_in_the_month() {
    let storage = Storage::in_memory();
    publish(&storage, 1).await;
    let launcher = ExamServices::from_storage(fixed_clock(), &storage).launcher();
    let user = UserId::random();

    // An attempt from a previous month never counts against the window.
    storage
        .attempts
        .insert_attempt(attempt_record(user, fixed_now() - Duration::days(40)))
        .await
        .unwrap();

    for _ in 0..2 {
        let mut ctl = launcher.start(user, &subject()).await.unwrap();
        ctl.accept_consent().await.unwrap();
        answer_by_text(&mut ctl, 0, CORRECT).await;
        ctl.submit().await.unwrap();
    }

    let err = launcher.start(user, &subject()).await.unwrap_err();
    match err {
        SessionError::Quota(QuotaError::Exhausted { status }) => {
            assert_eq!(status.used, 2);
            assert_eq!(status.remaining(), 0);
        }
        other => panic!("expected quota exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn consent_recheck_blocks_when_quota_empties_in_between() {
    let storage = Storage::in_memory();
    publish(&storage, 1).await;
    let launcher = ExamServices::from_storage(fixed_clock(), &storage).launcher();
    let user = UserId::random();

    let mut ctl = launcher.start(user, &subject()).await.unwrap();

    // The quota drains while the user sits on the consent screen.
    for _ in 0..MONTHLY_ATTEMPT_QUOTA {
        storage
            .attempts
            .insert_attempt(attempt_record(user, fixed_now() - Duration::hours(1)))
            .await
            .unwrap();
    }

    let err = ctl.accept_consent().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Quota(QuotaError::Exhausted { .. })
    ));
    assert_eq!(ctl.lifecycle(), Lifecycle::Consent);
    assert!(ctl.telemetry_session().is_none());
}

#[tokio::test]
async fn submit_with_gaps_keeps_the_session_active() {
    let storage = Storage::in_memory();
    publish(&storage, 3).await;
    let launcher = ExamServices::from_storage(fixed_clock(), &storage).launcher();
    let user = UserId::random();

    let mut ctl = launcher.start(user, &subject()).await.unwrap();
    ctl.accept_consent().await.unwrap();
    answer_by_text(&mut ctl, 0, CORRECT).await;
    ctl.navigate(2).await.unwrap();
    answer_by_text(&mut ctl, 2, CORRECT).await;

    let err = ctl.submit().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::State(SessionStateError::IncompleteAnswers { unanswered: 1 })
    ));
    assert_eq!(ctl.lifecycle(), Lifecycle::Active);

    ctl.navigate(1).await.unwrap();
    answer_by_text(&mut ctl, 1, CORRECT).await;
    let result = ctl.submit().await.unwrap();
    assert_eq!(result.outcome.score_percent, 100);
}

#[tokio::test]
async fn missing_or_empty_test_refuses_to_start() {
    let storage = Storage::in_memory();
    let launcher = ExamServices::from_storage(fixed_clock(), &storage).launcher();

    let err = launcher.start(UserId::random(), &subject()).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Assembler(AssemblerError::NoTestAvailable)
    ));

    let version = TestVersion::from_persisted(
        VersionId::new(1),
        subject(),
        "Entrance Examination",
        fixed_now() - Duration::days(1),
        true,
    )
    .unwrap();
    storage.catalog.publish_version(&version, &[]).await.unwrap();

    let err = launcher.start(UserId::random(), &subject()).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Assembler(AssemblerError::EmptyQuestionSet)
    ));
}

/// Fails the first `failures` inserts, then behaves like the in-memory
/// store. Everything else delegates.
struct FlakyAttempts {
    inner: InMemoryRepository,
    failures: AtomicU32,
}

#[async_trait]
impl AttemptRepository for FlakyAttempts {
    async fn insert_attempt(&self, record: AttemptRecord) -> Result<AttemptRowId, StorageError> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(StorageError::Connection("injected outage".into()));
        }
        self.inner.insert_attempt(record).await
    }

    async fn count_attempts_since(
        &self,
        user_id: UserId,
        version_id: VersionId,
        since: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        self.inner
            .count_attempts_since(user_id, version_id, since)
            .await
    }

    async fn attempts_for_user(
        &self,
        user_id: UserId,
        subject: &Subject,
        limit: u32,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        self.inner.attempts_for_user(user_id, subject, limit).await
    }

    async fn latest_attempt(
        &self,
        user_id: UserId,
        subject: &Subject,
    ) -> Result<Option<AttemptRecord>, StorageError> {
        self.inner.latest_attempt(user_id, subject).await
    }
}

#[tokio::test]
async fn persist_failure_surfaces_and_retry_completes() {
    let storage = Storage::in_memory();
    publish(&storage, 1).await;
    let flaky = Arc::new(FlakyAttempts {
        inner: InMemoryRepository::new(),
        failures: AtomicU32::new(1),
    });
    let launcher = ExamLauncher::new(
        fixed_clock(),
        Arc::clone(&storage.catalog),
        Arc::clone(&flaky) as Arc<dyn AttemptRepository>,
        Arc::clone(&storage.telemetry),
    );
    let user = UserId::random();

    let mut ctl = launcher.start(user, &subject()).await.unwrap();
    ctl.accept_consent().await.unwrap();
    answer_by_text(&mut ctl, 0, CORRECT).await;

    let err = ctl.submit().await.unwrap_err();
    assert!(matches!(err, SessionError::PersistFailed(_)));

    // The sitting itself is over; only the write is outstanding.
    assert_eq!(ctl.lifecycle(), Lifecycle::Submitted);
    assert!(ctl.needs_persist_retry());
    assert!(ctl.attempt_id().is_none());
    assert_eq!(ctl.outcome().unwrap().score_percent, 100);
    let resubmit = ctl.submit().await.unwrap_err();
    assert!(matches!(
        resubmit,
        SessionError::State(SessionStateError::AlreadyFinished)
    ));

    // The terminal telemetry sits behind the failed insert, still queued.
    let stream = ctl.telemetry_session().unwrap();
    let events = storage.telemetry.events_for_session(stream).await.unwrap();
    assert_eq!(count(&events, TelemetryKind::Submit), 0);

    let id = ctl.retry_persist().await.unwrap();
    assert_eq!(ctl.attempt_id(), Some(id));
    assert!(!ctl.needs_persist_retry());

    // A second retry is a no-op returning the same row.
    let again = ctl.retry_persist().await.unwrap();
    assert_eq!(again, id);

    let saved = flaky.inner.attempts_for_user(user, &subject(), 10).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].score_percent, 100);

    let events = storage.telemetry.events_for_session(stream).await.unwrap();
    assert_eq!(count(&events, TelemetryKind::Submit), 1);
}

#[tokio::test]
async fn timeout_persist_failure_defers_and_retry_completes() {
    let storage = Storage::in_memory();
    publish(&storage, 2).await;
    let flaky = Arc::new(FlakyAttempts {
        inner: InMemoryRepository::new(),
        failures: AtomicU32::new(1),
    });
    let launcher = ExamLauncher::new(
        fixed_clock(),
        Arc::clone(&storage.catalog),
        Arc::clone(&flaky) as Arc<dyn AttemptRepository>,
        Arc::clone(&storage.telemetry),
    );
    let user = UserId::random();

    let mut ctl = launcher.start(user, &subject()).await.unwrap();
    ctl.accept_consent().await.unwrap();
    answer_by_text(&mut ctl, 0, CORRECT).await;

    // The clock task has no user to surface the failure to; the expiry
    // tick stays quiet and queues the write.
    loop {
        if ctl.tick().await.clock_stopped {
            break;
        }
    }
    assert_eq!(ctl.lifecycle(), Lifecycle::TimedOut);
    assert!(ctl.needs_persist_retry());
    assert!(ctl.attempt_id().is_none());
    assert_eq!(ctl.outcome().unwrap().score_percent, 50);

    let saved = flaky.inner.attempts_for_user(user, &subject(), 10).await.unwrap();
    assert!(saved.is_empty());
    let stream = ctl.telemetry_session().unwrap();
    let events = storage.telemetry.events_for_session(stream).await.unwrap();
    assert_eq!(count(&events, TelemetryKind::Submit), 0);

    let id = ctl.retry_persist().await.unwrap();
    assert_eq!(ctl.attempt_id(), Some(id));
    assert!(!ctl.needs_persist_retry());

    let saved = flaky.inner.attempts_for_user(user, &subject(), 10).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert!(!saved[0].passed);

    let events = storage.telemetry.events_for_session(stream).await.unwrap();
    assert_eq!(count(&events, TelemetryKind::Submit), 1);
    let submit = events
        .iter()
        .find(|event| event.kind == TelemetryKind::Submit)
        .unwrap();
    assert_eq!(submit.payload["reason"], "timeout");
}
