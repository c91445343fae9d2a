//! Shared error types for the services crate.

use thiserror::Error;

use proctor_core::model::{AttemptError, QuestionError};
use proctor_core::session::SessionStateError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::quota::QuotaStatus;

/// Errors emitted by `QuestionSetAssembler`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AssemblerError {
    #[error("no test is currently available for this subject")]
    NoTestAvailable,
    #[error("the current test version has no questions")]
    EmptyQuestionSet,
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `AttemptQuotaGuard`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuotaError {
    #[error("attempt quota used up ({} of {}); resets at {}", .status.used, .status.quota, .status.resets_at)]
    Exhausted { status: QuotaStatus },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while launching or driving a session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error(transparent)]
    Assembler(#[from] AssemblerError),
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error(transparent)]
    State(#[from] SessionStateError),
    /// The session reached a terminal state but the attempt record was not
    /// saved. The sitting is over; only the write needs retrying.
    #[error("finished attempt could not be saved")]
    PersistFailed(#[source] StorageError),
    #[error("session has not finished")]
    StillActive,
}

/// Errors emitted by `AttemptHistoryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
