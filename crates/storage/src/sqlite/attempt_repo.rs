use chrono::{DateTime, Utc};
use proctor_core::model::{Subject, UserId, VersionId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{id_i64, map_attempt_row},
};
use crate::repository::{AttemptRecord, AttemptRepository, AttemptRowId, StorageError};

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn insert_attempt(&self, record: AttemptRecord) -> Result<AttemptRowId, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO attempts (
                user_id, subject, version_id, correct_count,
                total_questions, score_percent, passed, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(record.user_id.to_string())
        .bind(record.subject.as_str().to_owned())
        .bind(id_i64("version_id", record.version_id.value())?)
        .bind(i64::from(record.correct_count))
        .bind(i64::from(record.total_questions))
        .bind(i64::from(record.score_percent))
        .bind(record.passed)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(res.last_insert_rowid())
    }

    async fn count_attempts_since(
        &self,
        user_id: UserId,
        version_id: VersionId,
        since: DateTime<Utc>,
    ) -> Result<u32, StorageError> {
        let row = sqlx::query(
            r"
            SELECT COUNT(*) AS n
            FROM attempts
            WHERE user_id = ?1
              AND version_id = ?2
              AND created_at >= ?3
            ",
        )
        .bind(user_id.to_string())
        .bind(id_i64("version_id", version_id.value())?)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let n: i64 = row
            .try_get("n")
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        u32::try_from(n).map_err(|_| StorageError::Serialization(format!("invalid count: {n}")))
    }

    async fn attempts_for_user(
        &self,
        user_id: UserId,
        subject: &Subject,
        limit: u32,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, user_id, subject, version_id, correct_count,
                total_questions, score_percent, passed, created_at
            FROM attempts
            WHERE user_id = ?1 AND subject = ?2
            ORDER BY created_at DESC, id DESC
            LIMIT ?3
            ",
        )
        .bind(user_id.to_string())
        .bind(subject.as_str().to_owned())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in rows {
            attempts.push(map_attempt_row(&row)?);
        }
        Ok(attempts)
    }

    async fn latest_attempt(
        &self,
        user_id: UserId,
        subject: &Subject,
    ) -> Result<Option<AttemptRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT
                id, user_id, subject, version_id, correct_count,
                total_questions, score_percent, passed, created_at
            FROM attempts
            WHERE user_id = ?1 AND subject = ?2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            ",
        )
        .bind(user_id.to_string())
        .bind(subject.as_str().to_owned())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_attempt_row).transpose()
    }
}
