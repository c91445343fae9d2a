use chrono::Utc;
use proctor_core::model::{TelemetryEvent, TelemetryKind, TelemetrySessionId, UserId, VersionId};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_telemetry_event_row},
};
use crate::repository::{StorageError, TelemetryRepository};

#[async_trait::async_trait]
impl TelemetryRepository for SqliteRepository {
    async fn open_session(
        &self,
        user_id: UserId,
        version_id: VersionId,
    ) -> Result<TelemetrySessionId, StorageError> {
        let session_id = TelemetrySessionId::random();

        sqlx::query(
            r"
            INSERT INTO telemetry_sessions (id, user_id, version_id, opened_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(session_id.to_string())
        .bind(user_id.to_string())
        .bind(id_i64("version_id", version_id.value())?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(session_id)
    }

    async fn append_event(
        &self,
        session_id: TelemetrySessionId,
        kind: TelemetryKind,
        payload: serde_json::Value,
    ) -> Result<(), StorageError> {
        let exists = sqlx::query("SELECT 1 FROM telemetry_sessions WHERE id = ?1")
            .bind(session_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        sqlx::query(
            r"
            INSERT INTO telemetry_events (session_id, kind, payload, recorded_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(session_id.to_string())
        .bind(kind.as_str())
        .bind(payload.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn close_session(&self, session_id: TelemetrySessionId) -> Result<(), StorageError> {
        // COALESCE keeps the first close time when a close races or repeats.
        let res = sqlx::query(
            r"
            UPDATE telemetry_sessions
            SET closed_at = COALESCE(closed_at, ?1)
            WHERE id = ?2
            ",
        )
        .bind(Utc::now())
        .bind(session_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn events_for_session(
        &self,
        session_id: TelemetrySessionId,
    ) -> Result<Vec<TelemetryEvent>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT session_id, kind, payload, recorded_at
            FROM telemetry_events
            WHERE session_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            events.push(map_telemetry_event_row(&row)?);
        }
        Ok(events)
    }
}
