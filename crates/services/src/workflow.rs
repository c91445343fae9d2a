//! Launches sittings: the path from "user wants to take the test" to a
//! controller parked on the consent screen.

use std::sync::Arc;

use tracing::info;

use proctor_core::model::{Subject, UserId};
use proctor_core::session::Session;
use storage::repository::{
    AttemptRepository, Storage, TelemetryRepository, TestCatalogRepository,
};

use crate::Clock;
use crate::assembler::QuestionSetAssembler;
use crate::error::SessionError;
use crate::quota::{AttemptQuotaGuard, QuotaStatus};
use crate::session::SessionController;
use crate::telemetry::TelemetryRecorder;

/// Front door of the engine. Resolves the subject's current test, gates
/// on the attempt quota, and assembles a [`SessionController`].
#[derive(Clone)]
pub struct ExamLauncher {
    clock: Clock,
    assembler: QuestionSetAssembler,
    quota: AttemptQuotaGuard,
    telemetry: TelemetryRecorder,
    attempts: Arc<dyn AttemptRepository>,
}

impl ExamLauncher {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn TestCatalogRepository>,
        attempts: Arc<dyn AttemptRepository>,
        telemetry: Arc<dyn TelemetryRepository>,
    ) -> Self {
        Self {
            clock,
            assembler: QuestionSetAssembler::new(catalog),
            quota: AttemptQuotaGuard::new(clock, Arc::clone(&attempts)),
            telemetry: TelemetryRecorder::new(telemetry),
            attempts,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.telemetry),
        )
    }

    /// Builds a sitting for `user_id` on the subject's current test.
    ///
    /// The returned controller sits in `Consent`: nothing has been
    /// persisted and no telemetry stream exists until the user accepts.
    /// The quota is checked here so an exhausted user never reaches the
    /// consent screen, and checked again on acceptance.
    ///
    /// # Errors
    ///
    /// Returns `Assembler` when no test is published for the subject or
    /// its question set is empty, or `Quota` when the monthly allowance
    /// is used up.
    pub async fn start(
        &self,
        user_id: UserId,
        subject: &Subject,
    ) -> Result<SessionController, SessionError> {
        let now = self.clock.now();
        let version = self.assembler.current_version(subject, now).await?;
        self.quota.check(user_id, version.id()).await?;
        let questions = self.assembler.assemble(version.id()).await?;
        let session = Session::new(user_id, subject.clone(), version.id(), questions)?;

        info!(
            user_id = %user_id,
            version_id = version.id().value(),
            question_count = session.question_count(),
            "sitting assembled"
        );

        Ok(SessionController::new(
            session,
            self.clock,
            self.quota.clone(),
            self.telemetry.clone(),
            Arc::clone(&self.attempts),
        ))
    }

    /// Quota standing against the subject's current test version, for
    /// display before the user commits to anything.
    ///
    /// # Errors
    ///
    /// Returns `Assembler` when no test is published for the subject, or
    /// `Quota` for backend failures while counting.
    pub async fn quota_status(
        &self,
        user_id: UserId,
        subject: &Subject,
    ) -> Result<QuotaStatus, SessionError> {
        let version = self
            .assembler
            .current_version(subject, self.clock.now())
            .await?;
        let status = self.quota.status(user_id, version.id()).await?;
        Ok(status)
    }
}
