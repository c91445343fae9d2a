use thiserror::Error;

use crate::model::{
    AttemptError, QuestionError, SubjectError, TelemetryKindError, TestVersionError,
};
use crate::session::SessionStateError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Subject(#[from] SubjectError),
    #[error(transparent)]
    Version(#[from] TestVersionError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryKindError),
    #[error(transparent)]
    Session(#[from] SessionStateError),
}
