use proctor_core::model::{
    Question, QuestionId, Subject, TelemetryEvent, TelemetryKind, TelemetrySessionId, TestVersion,
    UserId, VersionId,
};
use sqlx::Row;

use crate::repository::{AttemptRecord, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn version_id_from_i64(v: i64) -> Result<VersionId, StorageError> {
    Ok(VersionId::new(i64_to_u64("version_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn user_id_from_str(s: &str) -> Result<UserId, StorageError> {
    s.parse::<UserId>().map_err(ser)
}

pub(crate) fn session_id_from_str(s: &str) -> Result<TelemetrySessionId, StorageError> {
    s.parse::<TelemetrySessionId>().map_err(ser)
}

pub(crate) fn subject_from_str(s: &str) -> Result<Subject, StorageError> {
    Subject::new(s).map_err(ser)
}

/// Choice texts are stored as one JSON array per question.
pub(crate) fn choices_to_json(choices: &[String]) -> Result<String, StorageError> {
    serde_json::to_string(choices).map_err(ser)
}

pub(crate) fn choices_from_json(raw: &str) -> Result<Vec<String>, StorageError> {
    serde_json::from_str(raw).map_err(ser)
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn usize_from_i64(field: &'static str, v: i64) -> Result<usize, StorageError> {
    usize::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn map_version_row(row: &sqlx::sqlite::SqliteRow) -> Result<TestVersion, StorageError> {
    let id = version_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let subject = subject_from_str(row.try_get::<String, _>("subject").map_err(ser)?.as_str())?;
    let title: String = row.try_get("title").map_err(ser)?;
    let published_at = row.try_get("published_at").map_err(ser)?;
    let active: bool = row.try_get("active").map_err(ser)?;

    TestVersion::from_persisted(id, subject, title, published_at, active).map_err(ser)
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let id = question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let version_id = version_id_from_i64(row.try_get::<i64, _>("version_id").map_err(ser)?)?;
    let position = u32_from_i64("position", row.try_get::<i64, _>("position").map_err(ser)?)?;
    let prompt: String = row.try_get("prompt").map_err(ser)?;
    let choices = choices_from_json(row.try_get::<String, _>("choices").map_err(ser)?.as_str())?;
    let correct_choice = usize_from_i64(
        "correct_choice",
        row.try_get::<i64, _>("correct_choice").map_err(ser)?,
    )?;

    Question::from_persisted(id, version_id, position, prompt, choices, correct_choice)
        .map_err(ser)
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<AttemptRecord, StorageError> {
    Ok(AttemptRecord {
        id: Some(row.try_get("id").map_err(ser)?),
        user_id: user_id_from_str(row.try_get::<String, _>("user_id").map_err(ser)?.as_str())?,
        subject: subject_from_str(row.try_get::<String, _>("subject").map_err(ser)?.as_str())?,
        version_id: version_id_from_i64(row.try_get::<i64, _>("version_id").map_err(ser)?)?,
        correct_count: u32_from_i64(
            "correct_count",
            row.try_get::<i64, _>("correct_count").map_err(ser)?,
        )?,
        total_questions: u32_from_i64(
            "total_questions",
            row.try_get::<i64, _>("total_questions").map_err(ser)?,
        )?,
        score_percent: u32_from_i64(
            "score_percent",
            row.try_get::<i64, _>("score_percent").map_err(ser)?,
        )?,
        passed: row.try_get("passed").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn map_telemetry_event_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<TelemetryEvent, StorageError> {
    let session_id =
        session_id_from_str(row.try_get::<String, _>("session_id").map_err(ser)?.as_str())?;
    let kind_str: String = row.try_get("kind").map_err(ser)?;
    let kind = TelemetryKind::parse(kind_str.as_str()).map_err(ser)?;
    let payload: serde_json::Value =
        serde_json::from_str(row.try_get::<String, _>("payload").map_err(ser)?.as_str())
            .map_err(ser)?;
    let recorded_at = row.try_get("recorded_at").map_err(ser)?;

    Ok(TelemetryEvent::new(session_id, kind, payload, recorded_at))
}
