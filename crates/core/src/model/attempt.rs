use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Subject, UserId, VersionId};
use crate::scoring;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt cannot have zero questions")]
    ZeroTotal,

    #[error("correct count ({correct}) exceeds question count ({total})")]
    CountExceedsTotal { correct: u32, total: u32 },

    #[error("stored score {stored}% does not match computed {computed}%")]
    ScoreMismatch { stored: u32, computed: u32 },
}

/// The permanent record of one finished session.
///
/// Written exactly once per session termination (submit, timeout, or
/// withdrawal) and never mutated afterwards. `passed` is not derivable
/// from the score alone: withdrawn sessions are recorded as failed
/// regardless of the computed percentage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    user_id: UserId,
    subject: Subject,
    version_id: VersionId,
    correct_count: u32,
    total_questions: u32,
    score_percent: u32,
    passed: bool,
    created_at: DateTime<Utc>,
}

impl Attempt {
    /// Rehydrate an attempt from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the counts are inconsistent or the stored
    /// percentage disagrees with the counts.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        subject: Subject,
        version_id: VersionId,
        correct_count: u32,
        total_questions: u32,
        score_percent: u32,
        passed: bool,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AttemptError> {
        if total_questions == 0 {
            return Err(AttemptError::ZeroTotal);
        }
        if correct_count > total_questions {
            return Err(AttemptError::CountExceedsTotal {
                correct: correct_count,
                total: total_questions,
            });
        }
        let computed = scoring::percentage(correct_count, total_questions);
        if score_percent != computed {
            return Err(AttemptError::ScoreMismatch {
                stored: score_percent,
                computed,
            });
        }

        Ok(Self {
            user_id,
            subject,
            version_id,
            correct_count,
            total_questions,
            score_percent,
            passed,
            created_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    #[must_use]
    pub fn version_id(&self) -> VersionId {
        self.version_id
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn score_percent(&self) -> u32 {
        self.score_percent
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn subject() -> Subject {
        Subject::new("knowledge-test").unwrap()
    }

    #[test]
    fn valid_attempt_builds() {
        let attempt = Attempt::from_persisted(
            UserId::random(),
            subject(),
            VersionId::new(1),
            38,
            50,
            76,
            false,
            fixed_now(),
        )
        .unwrap();
        assert_eq!(attempt.score_percent(), 76);
        assert!(!attempt.passed());
    }

    #[test]
    fn zero_total_rejected() {
        let err = Attempt::from_persisted(
            UserId::random(),
            subject(),
            VersionId::new(1),
            0,
            0,
            0,
            false,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, AttemptError::ZeroTotal);
    }

    #[test]
    fn correct_above_total_rejected() {
        let err = Attempt::from_persisted(
            UserId::random(),
            subject(),
            VersionId::new(1),
            51,
            50,
            100,
            true,
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, AttemptError::CountExceedsTotal { .. }));
    }

    #[test]
    fn inconsistent_score_rejected() {
        let err = Attempt::from_persisted(
            UserId::random(),
            subject(),
            VersionId::new(1),
            38,
            50,
            80,
            true,
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            AttemptError::ScoreMismatch {
                stored: 80,
                computed: 76
            }
        );
    }

    #[test]
    fn withdrawn_attempt_may_fail_despite_passing_score() {
        // Withdrawal policy: passed is forced false even at 100%.
        let attempt = Attempt::from_persisted(
            UserId::random(),
            subject(),
            VersionId::new(1),
            50,
            50,
            100,
            false,
            fixed_now(),
        )
        .unwrap();
        assert!(!attempt.passed());
        assert_eq!(attempt.score_percent(), 100);
    }
}
