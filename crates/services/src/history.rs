use std::sync::Arc;

use proctor_core::model::{Attempt, Subject, UserId};
use storage::repository::AttemptRepository;

use crate::error::HistoryError;

/// Read-side view over a user's finished attempts.
#[derive(Clone)]
pub struct AttemptHistoryService {
    attempts: Arc<dyn AttemptRepository>,
}

impl AttemptHistoryService {
    #[must_use]
    pub fn new(attempts: Arc<dyn AttemptRepository>) -> Self {
        Self { attempts }
    }

    /// Most recent attempts for a user on a subject, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Storage` for backend failures or `Attempt` when a stored
    /// row does not map back to a valid domain attempt.
    pub async fn recent(
        &self,
        user_id: UserId,
        subject: &Subject,
        limit: u32,
    ) -> Result<Vec<Attempt>, HistoryError> {
        let records = self.attempts.attempts_for_user(user_id, subject, limit).await?;
        records
            .into_iter()
            .map(|record| record.into_attempt().map_err(HistoryError::from))
            .collect()
    }

    /// The user's most recent attempt on a subject, if any.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::recent`].
    pub async fn latest(
        &self,
        user_id: UserId,
        subject: &Subject,
    ) -> Result<Option<Attempt>, HistoryError> {
        let record = self.attempts.latest_attempt(user_id, subject).await?;
        record
            .map(|record| record.into_attempt().map_err(HistoryError::from))
            .transpose()
    }
}
