use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use proctor_core::model::{TelemetryKind, TelemetrySessionId};
use proctor_core::session::{Effect, Lifecycle, Session, SessionStateError, TerminalOutcome};
use storage::repository::{AttemptRecord, AttemptRepository, AttemptRowId};

use super::view::SessionView;
use crate::Clock;
use crate::error::SessionError;
use crate::quota::AttemptQuotaGuard;
use crate::telemetry::TelemetryRecorder;

/// What the countdown task learns from one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub remaining_seconds: u32,
    pub clock_stopped: bool,
}

/// Result of a terminal transition the user initiated.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishResult {
    pub outcome: TerminalOutcome,
    /// Row id of the saved attempt. Present on every success path; only a
    /// deferred retry can observe it still unset.
    pub attempt_id: Option<AttemptRowId>,
}

/// Drives one candidate's sitting: owns the state machine and executes
/// the effects its transitions emit.
///
/// Every entry point takes `&mut self`, so transitions stay serialized
/// exactly as the state machine expects. Callers that feed it from more
/// than one task (user input plus the countdown) share it behind a mutex;
/// see [`super::CountdownDriver`].
pub struct SessionController {
    session: Session,
    clock: Clock,
    quota: AttemptQuotaGuard,
    telemetry: TelemetryRecorder,
    attempts: Arc<dyn AttemptRepository>,
    attempt_id: Option<AttemptRowId>,
    outcome: Option<TerminalOutcome>,
    pending: Vec<Effect>,
}

// Manual impl: the repository and recorder handles are trait objects
// without a `Debug` bound, so a derive cannot cover them.
impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &self.session)
            .field("clock", &self.clock)
            .field("attempt_id", &self.attempt_id)
            .field("outcome", &self.outcome)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    pub(crate) fn new(
        session: Session,
        clock: Clock,
        quota: AttemptQuotaGuard,
        telemetry: TelemetryRecorder,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            session,
            clock,
            quota,
            telemetry,
            attempts,
            attempt_id: None,
            outcome: None,
            pending: Vec::new(),
        }
    }

    /// `Consent -> Active`: re-checks the quota, opens the telemetry
    /// stream, and starts the countdown.
    ///
    /// The quota was already checked when the session was assembled, but
    /// the user can sit on the consent screen indefinitely, so the gate
    /// runs again here before anything irreversible happens.
    ///
    /// # Errors
    ///
    /// Returns `Quota` when the monthly allowance ran out in the
    /// meantime, or `State` outside the `Consent` state. A failed
    /// telemetry open is not an error; the session runs unproctored.
    pub async fn accept_consent(&mut self) -> Result<(), SessionError> {
        // Checked here too so an exhausted quota never opens a stream.
        match self.session.lifecycle() {
            Lifecycle::Consent => {}
            Lifecycle::Active => return Err(SessionStateError::AlreadyStarted.into()),
            _ => return Err(SessionStateError::AlreadyFinished.into()),
        }

        self.quota
            .check(self.session.user_id(), self.session.version_id())
            .await?;

        let stream = self
            .telemetry
            .open(self.session.user_id(), self.session.version_id())
            .await;
        let effects = self.session.accept_consent(stream, self.clock.now())?;
        self.execute(effects).await
    }

    /// Records the choice picked for a question.
    ///
    /// # Errors
    ///
    /// Returns `State` for out-of-range indices or when the session is
    /// not `Active`.
    pub async fn select_answer(&mut self, index: usize, choice: usize) -> Result<(), SessionError> {
        let effects = self.session.select_answer(index, choice, self.clock.now())?;
        self.execute(effects).await
    }

    /// Moves the current-question pointer; out-of-range targets are a
    /// silent no-op.
    ///
    /// # Errors
    ///
    /// Returns `State` when the session is not `Active`.
    pub async fn navigate(&mut self, to: usize) -> Result<(), SessionError> {
        let effects = self.session.navigate(to, self.clock.now())?;
        self.execute(effects).await
    }

    /// `Active -> Submitted`.
    ///
    /// # Errors
    ///
    /// Returns `State(IncompleteAnswers)` while any slot is unanswered
    /// (the session stays `Active`), or `PersistFailed` when the attempt
    /// record could not be saved after the transition.
    pub async fn submit(&mut self) -> Result<FinishResult, SessionError> {
        let effects = self.session.submit(self.clock.now())?;
        self.finish(effects).await
    }

    /// `Active -> Withdrawn`. One-way; the attempt is recorded as failed
    /// regardless of the score.
    ///
    /// # Errors
    ///
    /// Returns `State` outside `Active`, or `PersistFailed` when the
    /// attempt record could not be saved.
    pub async fn withdraw(&mut self) -> Result<FinishResult, SessionError> {
        let effects = self.session.withdraw(self.clock.now())?;
        self.finish(effects).await
    }

    /// Consumes one second of budget. Never fails: a persist failure on
    /// the expiry tick is logged and queued, because the clock task has
    /// no user to show an error to; `retry_persist` picks it up.
    pub async fn tick(&mut self) -> TickReport {
        let outcome = self.session.tick(self.clock.now());
        let report = TickReport {
            remaining_seconds: outcome.remaining_seconds,
            clock_stopped: outcome.clock_stopped,
        };
        if outcome.effects.is_empty() {
            return report;
        }

        self.remember_outcome(&outcome.effects);
        if let Err(e) = self.execute(outcome.effects).await {
            warn!(error = %e, "timeout persistence deferred");
        }
        report
    }

    /// Forwards a host-visibility flip to the proctoring trail. Blur and
    /// focus never touch the state machine, and outside `Active` (or
    /// without an open stream) they vanish.
    pub async fn visibility_changed(&mut self, visible: bool) {
        if self.session.lifecycle() != Lifecycle::Active {
            return;
        }
        let Some(session_id) = self.session.telemetry_session() else {
            return;
        };
        let kind = if visible {
            TelemetryKind::AppFocus
        } else {
            TelemetryKind::AppBlur
        };
        self.telemetry.record(session_id, kind, json!({})).await;
    }

    /// Retries the attempt insert after a failed terminal persistence.
    /// Succeeding twice is harmless: an already-saved attempt returns its
    /// row id without touching the store.
    ///
    /// # Errors
    ///
    /// Returns `StillActive` if the session has not finished, or
    /// `PersistFailed` if the store refuses again.
    pub async fn retry_persist(&mut self) -> Result<AttemptRowId, SessionError> {
        if let Some(id) = self.attempt_id {
            return Ok(id);
        }
        if !self.session.lifecycle().is_terminal() {
            return Err(SessionError::StillActive);
        }

        let pending = std::mem::take(&mut self.pending);
        self.execute(pending).await?;
        self.attempt_id.ok_or(SessionError::StillActive)
    }

    async fn finish(&mut self, effects: Vec<Effect>) -> Result<FinishResult, SessionError> {
        self.remember_outcome(&effects);
        self.execute(effects).await?;
        match &self.outcome {
            Some(outcome) => Ok(FinishResult {
                outcome: outcome.clone(),
                attempt_id: self.attempt_id,
            }),
            // Terminal transitions always carry the outcome; this only
            // guards against a future effect-set change.
            None => Err(SessionError::StillActive),
        }
    }

    fn remember_outcome(&mut self, effects: &[Effect]) {
        for effect in effects {
            if let Effect::PersistAttempt(outcome) = effect {
                self.outcome = Some(outcome.clone());
            }
        }
    }

    /// Runs effects in order. Clock effects are owned by whoever runs the
    /// countdown task, so they are inert here; telemetry is best-effort;
    /// a failed attempt insert stops execution and stashes the insert and
    /// everything behind it for `retry_persist`.
    async fn execute(&mut self, effects: Vec<Effect>) -> Result<(), SessionError> {
        let mut effects = effects.into_iter();
        while let Some(effect) = effects.next() {
            match effect {
                Effect::StartClock | Effect::StopClock => {}
                Effect::Telemetry { kind, payload } => {
                    if let Some(session_id) = self.session.telemetry_session() {
                        self.telemetry.record(session_id, kind, payload).await;
                    }
                }
                Effect::CloseTelemetry => {
                    if let Some(session_id) = self.session.telemetry_session() {
                        self.telemetry.close(session_id).await;
                    }
                }
                Effect::PersistAttempt(outcome) => {
                    let record = AttemptRecord::from_outcome(&outcome);
                    match self.attempts.insert_attempt(record).await {
                        Ok(id) => self.attempt_id = Some(id),
                        Err(e) => {
                            let mut rest = vec![Effect::PersistAttempt(outcome)];
                            rest.extend(effects);
                            self.pending = rest;
                            return Err(SessionError::PersistFailed(e));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    //
    // ─── ACCESSORS ────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView::from_session(&self.session)
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.session.lifecycle()
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.session.remaining_seconds()
    }

    #[must_use]
    pub fn telemetry_session(&self) -> Option<TelemetrySessionId> {
        self.session.telemetry_session()
    }

    /// Final score and conclusion, present from the terminal transition
    /// on, whether or not the record has been saved yet.
    #[must_use]
    pub fn outcome(&self) -> Option<&TerminalOutcome> {
        self.outcome.as_ref()
    }

    #[must_use]
    pub fn attempt_id(&self) -> Option<AttemptRowId> {
        self.attempt_id
    }

    /// True when the sitting finished but its record is still unsaved.
    #[must_use]
    pub fn needs_persist_retry(&self) -> bool {
        self.session.lifecycle().is_terminal() && self.attempt_id.is_none()
    }
}
