//! Monthly attempt quota.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use proctor_core::model::{UserId, VersionId};
use proctor_core::time::{start_of_month, start_of_next_month};
use storage::repository::AttemptRepository;

use crate::Clock;
use crate::error::QuotaError;

/// Attempts allowed per user and version within one UTC calendar month.
pub const MONTHLY_ATTEMPT_QUOTA: u32 = 2;

/// Where a user stands against the monthly quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub used: u32,
    pub quota: u32,
    pub period_start: DateTime<Utc>,
    pub resets_at: DateTime<Utc>,
}

impl QuotaStatus {
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.quota.saturating_sub(self.used)
    }

    #[must_use]
    pub fn exhausted(&self) -> bool {
        self.used >= self.quota
    }
}

/// Gate in front of session creation and activation.
///
/// The window is the current UTC calendar month and the count includes
/// every recorded attempt regardless of how it ended: submitted, timed
/// out, and withdrawn sittings all consume quota.
#[derive(Clone)]
pub struct AttemptQuotaGuard {
    clock: Clock,
    attempts: Arc<dyn AttemptRepository>,
    quota: u32,
}

impl AttemptQuotaGuard {
    #[must_use]
    pub fn new(clock: Clock, attempts: Arc<dyn AttemptRepository>) -> Self {
        Self {
            clock,
            attempts,
            quota: MONTHLY_ATTEMPT_QUOTA,
        }
    }

    /// Overrides the quota. Production keeps the statutory two.
    #[must_use]
    pub fn with_quota(mut self, quota: u32) -> Self {
        self.quota = quota;
        self
    }

    /// Current standing for a user and version.
    ///
    /// # Errors
    ///
    /// Returns `QuotaError::Storage` if the attempt count cannot be read.
    pub async fn status(
        &self,
        user_id: UserId,
        version_id: VersionId,
    ) -> Result<QuotaStatus, QuotaError> {
        let now = self.clock.now();
        let period_start = start_of_month(now);
        let used = self
            .attempts
            .count_attempts_since(user_id, version_id, period_start)
            .await?;

        Ok(QuotaStatus {
            used,
            quota: self.quota,
            period_start,
            resets_at: start_of_next_month(now),
        })
    }

    /// Passes while the user still has attempts left this month.
    ///
    /// # Errors
    ///
    /// Returns `QuotaError::Exhausted` carrying the standing when the
    /// quota is used up, or `QuotaError::Storage` on read failure.
    pub async fn check(
        &self,
        user_id: UserId,
        version_id: VersionId,
    ) -> Result<QuotaStatus, QuotaError> {
        let status = self.status(user_id, version_id).await?;
        if status.exhausted() {
            return Err(QuotaError::Exhausted { status });
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proctor_core::model::Subject;
    use proctor_core::time::{fixed_clock, fixed_now};
    use storage::repository::{AttemptRecord, InMemoryRepository};

    fn record(user_id: UserId, version: u64, created_at: DateTime<Utc>) -> AttemptRecord {
        AttemptRecord {
            id: None,
            user_id,
            subject: Subject::new("police-entrance").unwrap(),
            version_id: VersionId::new(version),
            correct_count: 10,
            total_questions: 50,
            score_percent: 20,
            passed: false,
            created_at,
        }
    }

    fn guard(repo: InMemoryRepository) -> AttemptQuotaGuard {
        AttemptQuotaGuard::new(fixed_clock(), Arc::new(repo))
    }

    #[tokio::test]
    async fn fresh_user_has_full_quota() {
        let guard = guard(InMemoryRepository::new());
        let status = guard
            .check(UserId::random(), VersionId::new(1))
            .await
            .unwrap();

        assert_eq!(status.used, 0);
        assert_eq!(status.remaining(), MONTHLY_ATTEMPT_QUOTA);
        // fixed_now is 2023-11-14, so the window is November.
        assert_eq!(status.period_start.to_rfc3339(), "2023-11-01T00:00:00+00:00");
        assert_eq!(status.resets_at.to_rfc3339(), "2023-12-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn attempts_this_month_consume_quota() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        repo.insert_attempt(record(user, 1, fixed_now() - Duration::days(2)))
            .await
            .unwrap();

        let guard = guard(repo);
        let status = guard.check(user, VersionId::new(1)).await.unwrap();
        assert_eq!(status.used, 1);
        assert_eq!(status.remaining(), 1);
    }

    #[tokio::test]
    async fn exhausted_quota_blocks() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        for _ in 0..2 {
            repo.insert_attempt(record(user, 1, fixed_now() - Duration::hours(3)))
                .await
                .unwrap();
        }

        let guard = guard(repo);
        let err = guard.check(user, VersionId::new(1)).await.unwrap_err();
        match err {
            QuotaError::Exhausted { status } => {
                assert_eq!(status.used, 2);
                assert!(status.exhausted());
                assert_eq!(status.remaining(), 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn last_months_attempts_do_not_count() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        // Lands in late October, before the November window opens.
        repo.insert_attempt(record(user, 1, fixed_now() - Duration::days(15)))
            .await
            .unwrap();

        let guard = guard(repo);
        let status = guard.check(user, VersionId::new(1)).await.unwrap();
        assert_eq!(status.used, 0);
    }

    #[tokio::test]
    async fn window_boundary_is_the_first_instant_of_the_month() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        let window_start = start_of_month(fixed_now());
        // The last second of October stays outside the window; the first
        // instant of November is inside.
        repo.insert_attempt(record(user, 1, window_start - Duration::seconds(1)))
            .await
            .unwrap();
        repo.insert_attempt(record(user, 1, window_start))
            .await
            .unwrap();

        let guard = guard(repo);
        let status = guard.check(user, VersionId::new(1)).await.unwrap();
        assert_eq!(status.used, 1);
    }

    #[tokio::test]
    async fn other_versions_have_their_own_quota() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        for _ in 0..2 {
            repo.insert_attempt(record(user, 1, fixed_now()))
                .await
                .unwrap();
        }

        let guard = guard(repo);
        assert!(guard.check(user, VersionId::new(1)).await.is_err());
        assert!(guard.check(user, VersionId::new(2)).await.is_ok());
    }

    #[tokio::test]
    async fn quota_override_applies() {
        let repo = InMemoryRepository::new();
        let user = UserId::random();
        repo.insert_attempt(record(user, 1, fixed_now())).await.unwrap();

        let guard = guard(repo).with_quota(1);
        let err = guard.check(user, VersionId::new(1)).await.unwrap_err();
        assert!(matches!(err, QuotaError::Exhausted { .. }));
    }
}
