use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::error::AppServicesError;
use crate::history::AttemptHistoryService;
use crate::workflow::ExamLauncher;

/// Assembles the app-facing services over one storage backend.
#[derive(Clone)]
pub struct ExamServices {
    launcher: Arc<ExamLauncher>,
    history: Arc<AttemptHistoryService>,
}

impl ExamServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(clock, &storage))
    }

    /// Build services over the in-memory backend, for tests and demos.
    #[must_use]
    pub fn new_in_memory(clock: Clock) -> Self {
        Self::from_storage(clock, &Storage::in_memory())
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self {
            launcher: Arc::new(ExamLauncher::from_storage(clock, storage)),
            history: Arc::new(AttemptHistoryService::new(Arc::clone(&storage.attempts))),
        }
    }

    #[must_use]
    pub fn launcher(&self) -> Arc<ExamLauncher> {
        Arc::clone(&self.launcher)
    }

    #[must_use]
    pub fn history(&self) -> Arc<AttemptHistoryService> {
        Arc::clone(&self.history)
    }
}
