use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::TelemetrySessionId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TelemetryKindError {
    #[error("unknown telemetry event kind: {0}")]
    Unknown(String),
}

/// Kinds of proctoring events emitted over the life of a session.
///
/// Wire names are stable snake_case strings; they are what reviewers
/// query when auditing an attempt, so renaming a variant must keep
/// `as_str` unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryKind {
    /// Applicant accepted the consent screen and the countdown started.
    Start,
    /// A question became the visible one.
    QuestionView,
    /// Applicant picked a choice on the visible question.
    AnswerSelect,
    /// Forward navigation.
    Next,
    /// Backward navigation.
    Prev,
    /// The app window lost focus.
    AppBlur,
    /// The app window regained focus.
    AppFocus,
    /// Terminal event for submitted and timed-out sessions.
    Submit,
    /// Terminal event for withdrawn sessions.
    Withdraw,
}

impl TelemetryKind {
    /// Stable wire name for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TelemetryKind::Start => "start",
            TelemetryKind::QuestionView => "question_view",
            TelemetryKind::AnswerSelect => "answer_select",
            TelemetryKind::Next => "next",
            TelemetryKind::Prev => "prev",
            TelemetryKind::AppBlur => "app_blur",
            TelemetryKind::AppFocus => "app_focus",
            TelemetryKind::Submit => "submit",
            TelemetryKind::Withdraw => "withdraw",
        }
    }

    /// Parses a stored wire name back into a kind.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryKindError::Unknown` for names no variant owns.
    pub fn parse(value: &str) -> Result<Self, TelemetryKindError> {
        match value {
            "start" => Ok(Self::Start),
            "question_view" => Ok(Self::QuestionView),
            "answer_select" => Ok(Self::AnswerSelect),
            "next" => Ok(Self::Next),
            "prev" => Ok(Self::Prev),
            "app_blur" => Ok(Self::AppBlur),
            "app_focus" => Ok(Self::AppFocus),
            "submit" => Ok(Self::Submit),
            "withdraw" => Ok(Self::Withdraw),
            other => Err(TelemetryKindError::Unknown(other.to_string())),
        }
    }
}

impl std::fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded proctoring event, as read back from the store.
///
/// `recorded_at` is stamped by the store on append, not by the session,
/// so events keep a consistent timeline even if the client clock drifts.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    pub session_id: TelemetrySessionId,
    pub kind: TelemetryKind,
    pub payload: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl TelemetryEvent {
    #[must_use]
    pub fn new(
        session_id: TelemetrySessionId,
        kind: TelemetryKind,
        payload: serde_json::Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            kind,
            payload,
            recorded_at,
        }
    }
}
