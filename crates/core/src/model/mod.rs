mod attempt;
mod ids;
mod question;
mod subject;
mod telemetry;
mod version;

pub use ids::{ParseIdError, QuestionId, TelemetrySessionId, UserId, VersionId};
pub use subject::{MAX_SUBJECT_LEN, Subject, SubjectError};

pub use attempt::{Attempt, AttemptError};
pub use question::{Question, QuestionError};
pub use telemetry::{TelemetryEvent, TelemetryKind, TelemetryKindError};
pub use version::{TestVersion, TestVersionError};
