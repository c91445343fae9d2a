use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proctor_core::model::{
    Attempt, AttemptError, Question, Subject, TelemetryEvent, TelemetryKind, TelemetrySessionId,
    TestVersion, UserId, VersionId,
};
use proctor_core::session::TerminalOutcome;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Row identifier for a durable attempt record.
pub type AttemptRowId = i64;

/// Persisted shape for an attempt.
///
/// This mirrors the domain `Attempt` so repositories can serialize and
/// deserialize without leaking storage concerns into the domain layer.
/// `id` is `None` until the store assigns one on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub id: Option<AttemptRowId>,
    pub user_id: UserId,
    pub subject: Subject,
    pub version_id: VersionId,
    pub correct_count: u32,
    pub total_questions: u32,
    pub score_percent: u32,
    pub passed: bool,
    pub created_at: DateTime<Utc>,
}

impl AttemptRecord {
    /// Builds the record to insert for a finished session.
    #[must_use]
    pub fn from_outcome(outcome: &TerminalOutcome) -> Self {
        Self {
            id: None,
            user_id: outcome.user_id,
            subject: outcome.subject.clone(),
            version_id: outcome.version_id,
            correct_count: outcome.correct_count,
            total_questions: outcome.total_questions,
            score_percent: outcome.score_percent,
            passed: outcome.passed,
            created_at: outcome.finished_at,
        }
    }

    /// Convert the record back into a domain `Attempt`.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the stored counts or percentage are
    /// inconsistent.
    pub fn into_attempt(self) -> Result<Attempt, AttemptError> {
        Attempt::from_persisted(
            self.user_id,
            self.subject,
            self.version_id,
            self.correct_count,
            self.total_questions,
            self.score_percent,
            self.passed,
            self.created_at,
        )
    }
}

/// Persisted shape for one telemetry stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySessionRecord {
    pub id: TelemetrySessionId,
    pub user_id: UserId,
    pub version_id: VersionId,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Read contract for the published test catalog.
///
/// Versions and questions are authored elsewhere; the engine only reads
/// them. `publish_version` exists for seeding and tests.
#[async_trait]
pub trait TestCatalogRepository: Send + Sync {
    /// Fetch the current version for a subject: latest active publication
    /// whose `published_at` is not in the future.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no version qualifies.
    async fn active_version(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
    ) -> Result<TestVersion, StorageError>;

    /// Fetch up to `limit` questions for a version in display order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the version does not exist.
    async fn questions_for_version(
        &self,
        version_id: VersionId,
        limit: u32,
    ) -> Result<Vec<Question>, StorageError>;

    /// Insert a version together with its questions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the version id already exists;
    /// published versions are immutable and never overwritten.
    async fn publish_version(
        &self,
        version: &TestVersion,
        questions: &[Question],
    ) -> Result<(), StorageError>;
}

/// Write-once store for finished attempts, plus the reads the quota guard
/// and history views need.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Insert one immutable attempt record and return its row id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the insert fails; the caller surfaces this
    /// with a manual retry affordance.
    async fn insert_attempt(&self, record: AttemptRecord) -> Result<AttemptRowId, StorageError>;

    /// Count attempts for a (user, version) pair created at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn count_attempts_since(
        &self,
        user_id: UserId,
        version_id: VersionId,
        since: DateTime<Utc>,
    ) -> Result<u32, StorageError>;

    /// Fetch up to `limit` of a user's attempts for a subject, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn attempts_for_user(
        &self,
        user_id: UserId,
        subject: &Subject,
        limit: u32,
    ) -> Result<Vec<AttemptRecord>, StorageError>;

    /// Fetch a user's most recent attempt for a subject, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn latest_attempt(
        &self,
        user_id: UserId,
        subject: &Subject,
    ) -> Result<Option<AttemptRecord>, StorageError>;
}

/// Append-only store for the proctoring trail.
///
/// The store mints session identifiers and stamps every timestamp at write
/// time, so event ordering does not depend on the client clock.
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Open a stream for one session and return its minted identifier.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the stream cannot be created.
    async fn open_session(
        &self,
        user_id: UserId,
        version_id: VersionId,
    ) -> Result<TelemetrySessionId, StorageError>;

    /// Append one event to an open stream.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the stream does not exist, or
    /// other storage errors. Callers treat all of these as best-effort.
    async fn append_event(
        &self,
        session_id: TelemetrySessionId,
        kind: TelemetryKind,
        payload: serde_json::Value,
    ) -> Result<(), StorageError>;

    /// Mark a stream closed. Closing an already-closed stream is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the stream does not exist.
    async fn close_session(&self, session_id: TelemetrySessionId) -> Result<(), StorageError>;

    /// Fetch every event of a stream in append order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn events_for_session(
        &self,
        session_id: TelemetrySessionId,
    ) -> Result<Vec<TelemetryEvent>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    versions: Arc<Mutex<HashMap<VersionId, TestVersion>>>,
    questions: Arc<Mutex<HashMap<VersionId, Vec<Question>>>>,
    attempts: Arc<Mutex<Vec<AttemptRecord>>>,
    sessions: Arc<Mutex<HashMap<TelemetrySessionId, TelemetrySessionRecord>>>,
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TestCatalogRepository for InMemoryRepository {
    async fn active_version(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
    ) -> Result<TestVersion, StorageError> {
        let guard = self
            .versions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .values()
            .filter(|version| version.subject() == subject && version.is_available(now))
            .max_by_key(|version| (version.published_at(), version.id()))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn questions_for_version(
        &self,
        version_id: VersionId,
        limit: u32,
    ) -> Result<Vec<Question>, StorageError> {
        {
            let versions = self
                .versions
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            if !versions.contains_key(&version_id) {
                return Err(StorageError::NotFound);
            }
        }

        let guard = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut questions = guard.get(&version_id).cloned().unwrap_or_default();
        questions.sort_by_key(|question| (question.position(), question.id()));
        questions.truncate(limit as usize);
        Ok(questions)
    }

    async fn publish_version(
        &self,
        version: &TestVersion,
        questions: &[Question],
    ) -> Result<(), StorageError> {
        let mut versions = self
            .versions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if versions.contains_key(&version.id()) {
            return Err(StorageError::Conflict);
        }
        versions.insert(version.id(), version.clone());

        let mut stored = self
            .questions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        stored.insert(version.id(), questions.to_vec());
        Ok(())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn insert_attempt(&self, record: AttemptRecord) -> Result<AttemptRowId, StorageError> {
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let id = i64::try_from(guard.len() + 1)
            .map_err(|_| StorageError::Serialization("attempt id overflow".into()))?;
        let mut record = record;
        record.id = Some(id);
        guard.push(record);
        Ok(id)
    }

    async fn count_attempts_since(
        &self,
        user_id: UserId,
        version_id: VersionId,
        since: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let count = guard
            .iter()
            .filter(|record| {
                record.user_id == user_id
                    && record.version_id == version_id
                    && record.created_at >= since
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn attempts_for_user(
        &self,
        user_id: UserId,
        subject: &Subject,
        limit: u32,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut records: Vec<AttemptRecord> = guard
            .iter()
            .filter(|record| record.user_id == user_id && &record.subject == subject)
            .cloned()
            .collect();
        records.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn latest_attempt(
        &self,
        user_id: UserId,
        subject: &Subject,
    ) -> Result<Option<AttemptRecord>, StorageError> {
        let records = self.attempts_for_user(user_id, subject, 1).await?;
        Ok(records.into_iter().next())
    }
}

#[async_trait]
impl TelemetryRepository for InMemoryRepository {
    async fn open_session(
        &self,
        user_id: UserId,
        version_id: VersionId,
    ) -> Result<TelemetrySessionId, StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let id = TelemetrySessionId::random();
        guard.insert(
            id,
            TelemetrySessionRecord {
                id,
                user_id,
                version_id,
                opened_at: Utc::now(),
                closed_at: None,
            },
        );
        Ok(id)
    }

    async fn append_event(
        &self,
        session_id: TelemetrySessionId,
        kind: TelemetryKind,
        payload: serde_json::Value,
    ) -> Result<(), StorageError> {
        {
            let sessions = self
                .sessions
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            if !sessions.contains_key(&session_id) {
                return Err(StorageError::NotFound);
            }
        }

        let mut guard = self
            .events
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.push(TelemetryEvent::new(session_id, kind, payload, Utc::now()));
        Ok(())
    }

    async fn close_session(&self, session_id: TelemetrySessionId) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let record = guard.get_mut(&session_id).ok_or(StorageError::NotFound)?;
        if record.closed_at.is_none() {
            record.closed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn events_for_session(
        &self,
        session_id: TelemetrySessionId,
    ) -> Result<Vec<TelemetryEvent>, StorageError> {
        let guard = self
            .events
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .iter()
            .filter(|event| event.session_id == session_id)
            .cloned()
            .collect())
    }
}

/// Aggregates the three store contracts behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn TestCatalogRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub telemetry: Arc<dyn TelemetryRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let catalog: Arc<dyn TestCatalogRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo.clone());
        let telemetry: Arc<dyn TelemetryRepository> = Arc::new(repo);
        Self {
            catalog,
            attempts,
            telemetry,
        }
    }
}
