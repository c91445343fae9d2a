//! Best-effort proctoring trail.

use std::sync::Arc;

use tracing::warn;

use proctor_core::model::{TelemetryKind, TelemetrySessionId, UserId, VersionId};
use storage::repository::TelemetryRepository;

/// Append-side facade over the telemetry store.
///
/// Recording never fails the caller: write errors are logged and dropped.
/// The trail is a side channel of the attempt, not part of its
/// transactional outcome, so a broken recorder must not take the sitting
/// down with it.
#[derive(Clone)]
pub struct TelemetryRecorder {
    store: Arc<dyn TelemetryRepository>,
}

impl TelemetryRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn TelemetryRepository>) -> Self {
        Self { store }
    }

    /// Opens a stream, or `None` when the store refuses; in that case the
    /// session runs unproctored.
    pub async fn open(
        &self,
        user_id: UserId,
        version_id: VersionId,
    ) -> Option<TelemetrySessionId> {
        match self.store.open_session(user_id, version_id).await {
            Ok(session_id) => Some(session_id),
            Err(e) => {
                warn!(%user_id, error = %e, "could not open telemetry stream");
                None
            }
        }
    }

    /// Appends one event, swallowing failures.
    pub async fn record(
        &self,
        session_id: TelemetrySessionId,
        kind: TelemetryKind,
        payload: serde_json::Value,
    ) {
        if let Err(e) = self.store.append_event(session_id, kind, payload).await {
            warn!(%session_id, kind = kind.as_str(), error = %e, "dropped telemetry event");
        }
    }

    /// Closes a stream, swallowing failures.
    pub async fn close(&self, session_id: TelemetrySessionId) {
        if let Err(e) = self.store.close_session(session_id).await {
            warn!(%session_id, error = %e, "could not close telemetry stream");
        }
    }
}
