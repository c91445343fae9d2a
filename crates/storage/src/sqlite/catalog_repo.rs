use chrono::{DateTime, Utc};
use proctor_core::model::{Question, Subject, TestVersion, VersionId};

use super::{
    SqliteRepository,
    mapping::{choices_to_json, id_i64, map_question_row, map_version_row},
};
use crate::repository::{StorageError, TestCatalogRepository};

#[async_trait::async_trait]
impl TestCatalogRepository for SqliteRepository {
    async fn active_version(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
    ) -> Result<TestVersion, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, subject, title, published_at, active
            FROM test_versions
            WHERE subject = ?1
              AND active = 1
              AND published_at <= ?2
            ORDER BY published_at DESC, id DESC
            LIMIT 1
            ",
        )
        .bind(subject.as_str().to_owned())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        match row {
            Some(row) => map_version_row(&row),
            None => Err(StorageError::NotFound),
        }
    }

    async fn questions_for_version(
        &self,
        version_id: VersionId,
        limit: u32,
    ) -> Result<Vec<Question>, StorageError> {
        let version = id_i64("version_id", version_id.value())?;

        let exists = sqlx::query("SELECT 1 FROM test_versions WHERE id = ?1")
            .bind(version)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let rows = sqlx::query(
            r"
            SELECT id, version_id, position, prompt, choices, correct_choice
            FROM questions
            WHERE version_id = ?1
            ORDER BY position ASC, id ASC
            LIMIT ?2
            ",
        )
        .bind(version)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            questions.push(map_question_row(&row)?);
        }
        Ok(questions)
    }

    async fn publish_version(
        &self,
        version: &TestVersion,
        questions: &[Question],
    ) -> Result<(), StorageError> {
        let version_id = id_i64("version_id", version.id().value())?;

        let existing = sqlx::query("SELECT 1 FROM test_versions WHERE id = ?1")
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if existing.is_some() {
            return Err(StorageError::Conflict);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO test_versions (id, subject, title, published_at, active)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(version_id)
        .bind(version.subject().as_str().to_owned())
        .bind(version.title().to_owned())
        .bind(version.published_at())
        .bind(version.active())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        for question in questions {
            sqlx::query(
                r"
                INSERT INTO questions (id, version_id, position, prompt, choices, correct_choice)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(id_i64("question_id", question.id().value())?)
            .bind(version_id)
            .bind(i64::from(question.position()))
            .bind(question.prompt().to_owned())
            .bind(choices_to_json(question.choices())?)
            .bind(
                i64::try_from(question.correct_choice())
                    .map_err(|_| StorageError::Serialization("correct_choice overflow".into()))?,
            )
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
