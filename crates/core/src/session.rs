//! Lifecycle of a single timed attempt.
//!
//! `Session` is a pure value object: transitions mutate the session and
//! return a list of [`Effect`] intents for the caller to execute. No I/O
//! happens here, which is what makes the submit-vs-timeout race testable
//! without a UI harness. The lifecycle field doubles as the one-shot
//! terminal guard: the first transition that observes `Active` wins, and
//! every later terminal request sees `AlreadyFinished` (or, for the clock
//! tick, a silent stop).

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;

use crate::model::{
    QuestionError, QuestionId, Subject, TelemetryKind, TelemetrySessionId, UserId, VersionId,
};
use crate::scoring;

/// Statutory time budget for one attempt.
pub const SESSION_TIME_BUDGET_SECONDS: u32 = 3_600;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session cannot start without questions")]
    NoQuestions,

    #[error("consent has not been accepted yet")]
    ConsentPending,

    #[error("consent was already accepted")]
    AlreadyStarted,

    #[error("session is already finished")]
    AlreadyFinished,

    #[error("question index {index} out of range for {count} questions")]
    QuestionIndexOutOfRange { index: usize, count: usize },

    #[error("choice {choice} out of range for question {index}")]
    ChoiceOutOfRange { index: usize, choice: usize },

    #[error("{unanswered} questions still unanswered")]
    IncompleteAnswers { unanswered: usize },
}

//
// ─── LIFECYCLE ────────────────────────────────────────────────────────────────
//

/// States of one attempt. Terminal states are mutually exclusive and
/// entered exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Consent,
    Active,
    Submitted,
    TimedOut,
    Withdrawn,
}

impl Lifecycle {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Lifecycle::Submitted | Lifecycle::TimedOut | Lifecycle::Withdrawn
        )
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conclusion {
    Submitted,
    TimedOut,
    Withdrawn,
}

impl Conclusion {
    /// Telemetry kind recorded for this conclusion. Timed-out sessions
    /// share the `submit` kind and are told apart by the payload reason.
    #[must_use]
    pub fn telemetry_kind(self) -> TelemetryKind {
        match self {
            Conclusion::Submitted | Conclusion::TimedOut => TelemetryKind::Submit,
            Conclusion::Withdrawn => TelemetryKind::Withdraw,
        }
    }

    /// Reason string carried in the terminal telemetry payload.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Conclusion::Submitted | Conclusion::Withdrawn => "user",
            Conclusion::TimedOut => "timeout",
        }
    }

    fn lifecycle(self) -> Lifecycle {
        match self {
            Conclusion::Submitted => Lifecycle::Submitted,
            Conclusion::TimedOut => Lifecycle::TimedOut,
            Conclusion::Withdrawn => Lifecycle::Withdrawn,
        }
    }
}

//
// ─── EFFECTS ──────────────────────────────────────────────────────────────────
//

/// Everything the store must know to insert the attempt row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalOutcome {
    pub conclusion: Conclusion,
    pub user_id: UserId,
    pub subject: Subject,
    pub version_id: VersionId,
    pub correct_count: u32,
    pub total_questions: u32,
    pub score_percent: u32,
    pub passed: bool,
    pub finished_at: DateTime<Utc>,
}

/// Side effects a transition asks its caller to perform, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Begin the repeating one-second countdown.
    StartClock,
    /// Cancel the countdown.
    StopClock,
    /// Append one telemetry event (best-effort).
    Telemetry {
        kind: TelemetryKind,
        payload: serde_json::Value,
    },
    /// Insert the immutable attempt record.
    PersistAttempt(TerminalOutcome),
    /// Close the telemetry stream.
    CloseTelemetry,
}

//
// ─── SESSION QUESTION ─────────────────────────────────────────────────────────
//

/// One question as presented in this session: choices already shuffled
/// and the correct index recomputed for the shuffled order. The stored
/// `Question` is never mutated by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionQuestion {
    question_id: QuestionId,
    prompt: String,
    choices: Vec<String>,
    correct_choice: usize,
}

impl SessionQuestion {
    /// Builds a presentation question.
    ///
    /// Prompt and choice texts were validated when the source `Question`
    /// was loaded; only the recomputed index invariant is re-checked here.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::CorrectChoiceOutOfRange` if the index does
    /// not address a choice.
    pub fn new(
        question_id: QuestionId,
        prompt: impl Into<String>,
        choices: Vec<String>,
        correct_choice: usize,
    ) -> Result<Self, QuestionError> {
        if choices.is_empty() {
            if correct_choice != 0 {
                return Err(QuestionError::CorrectChoiceOutOfRange {
                    index: correct_choice,
                    choices: 0,
                });
            }
        } else if correct_choice >= choices.len() {
            return Err(QuestionError::CorrectChoiceOutOfRange {
                index: correct_choice,
                choices: choices.len(),
            });
        }

        Ok(Self {
            question_id,
            prompt: prompt.into(),
            choices,
            correct_choice,
        })
    }

    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    /// Correct index in the shuffled presentation order.
    #[must_use]
    pub fn correct_choice(&self) -> usize {
        self.correct_choice
    }
}

//
// ─── SESSION ──────────────────────────────────────────────────────────────────
//

/// Outcome of one countdown tick. Ticks never fail; after a terminal
/// transition they only tell the driver the clock is done.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub remaining_seconds: u32,
    pub clock_stopped: bool,
    pub effects: Vec<Effect>,
}

/// One user's in-progress attempt at a test version.
///
/// Owned exclusively by the controller that created it; never shared across
/// concurrent sessions.
#[derive(Debug, Clone)]
pub struct Session {
    user_id: UserId,
    subject: Subject,
    version_id: VersionId,
    questions: Vec<SessionQuestion>,
    answers: Vec<Option<usize>>,
    current: usize,
    remaining_seconds: u32,
    lifecycle: Lifecycle,
    telemetry_session: Option<TelemetrySessionId>,
    last_action_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates a session in the `Consent` state.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NoQuestions` for an empty question set.
    pub fn new(
        user_id: UserId,
        subject: Subject,
        version_id: VersionId,
        questions: Vec<SessionQuestion>,
    ) -> Result<Self, SessionStateError> {
        if questions.is_empty() {
            return Err(SessionStateError::NoQuestions);
        }
        let answers = vec![None; questions.len()];

        Ok(Self {
            user_id,
            subject,
            version_id,
            questions,
            answers,
            current: 0,
            remaining_seconds: SESSION_TIME_BUDGET_SECONDS,
            lifecycle: Lifecycle::Consent,
            telemetry_session: None,
            last_action_at: None,
        })
    }

    /// Overrides the time budget. The statutory budget is an hour; shorter
    /// budgets are used by drills and tests.
    #[must_use]
    pub fn with_time_budget(mut self, seconds: u32) -> Self {
        self.remaining_seconds = seconds;
        self
    }

    //
    // ─── TRANSITIONS ──────────────────────────────────────────────────────────
    //

    /// `Consent -> Active`. The caller has already re-checked the quota and
    /// opened a telemetry stream; `telemetry_session` is `None` when the
    /// open failed and the session runs unproctored.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyStarted` or `AlreadyFinished` outside `Consent`.
    pub fn accept_consent(
        &mut self,
        telemetry_session: Option<TelemetrySessionId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>, SessionStateError> {
        match self.lifecycle {
            Lifecycle::Consent => {}
            Lifecycle::Active => return Err(SessionStateError::AlreadyStarted),
            _ => return Err(SessionStateError::AlreadyFinished),
        }

        self.lifecycle = Lifecycle::Active;
        self.telemetry_session = telemetry_session;
        self.last_action_at = Some(now);

        Ok(vec![
            Effect::StartClock,
            Effect::Telemetry {
                kind: TelemetryKind::Start,
                payload: json!({
                    "question_count": self.questions.len(),
                    "time_budget_seconds": self.remaining_seconds,
                }),
            },
            Effect::Telemetry {
                kind: TelemetryKind::QuestionView,
                payload: json!({ "index": 0 }),
            },
        ])
    }

    /// Records the choice picked for a question, overwriting any prior
    /// answer. The emitted event carries the latency since the previous
    /// recorded action.
    ///
    /// # Errors
    ///
    /// Returns a state error outside `Active`, or an index error if the
    /// question or choice does not exist.
    pub fn select_answer(
        &mut self,
        index: usize,
        choice: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>, SessionStateError> {
        self.ensure_active()?;
        let count = self.questions.len();
        if index >= count {
            return Err(SessionStateError::QuestionIndexOutOfRange { index, count });
        }
        if choice >= self.questions[index].choices().len() {
            return Err(SessionStateError::ChoiceOutOfRange { index, choice });
        }

        self.answers[index] = Some(choice);
        let latency_ms = self.elapsed_ms(now);
        self.last_action_at = Some(now);

        Ok(vec![Effect::Telemetry {
            kind: TelemetryKind::AnswerSelect,
            payload: json!({
                "index": index,
                "choice": choice,
                "latency_ms": latency_ms,
            }),
        }])
    }

    /// Moves the current-question pointer. Out-of-range targets are a
    /// silent no-op; in-range moves emit a directional event followed by
    /// the destination view.
    ///
    /// # Errors
    ///
    /// Returns a state error outside `Active`.
    pub fn navigate(
        &mut self,
        to: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>, SessionStateError> {
        self.ensure_active()?;
        if to >= self.questions.len() {
            return Ok(Vec::new());
        }

        let direction = if to > self.current {
            TelemetryKind::Next
        } else {
            TelemetryKind::Prev
        };
        let from = self.current;
        self.current = to;
        self.last_action_at = Some(now);

        Ok(vec![
            Effect::Telemetry {
                kind: direction,
                payload: json!({ "from": from, "to": to }),
            },
            Effect::Telemetry {
                kind: TelemetryKind::QuestionView,
                payload: json!({ "index": to }),
            },
        ])
    }

    /// `Active -> Submitted`. Refused while any slot is unanswered; the
    /// session stays `Active` and the caller prompts the user.
    ///
    /// # Errors
    ///
    /// Returns `IncompleteAnswers` with the number of open slots, or a
    /// state error outside `Active`.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<Vec<Effect>, SessionStateError> {
        self.ensure_active()?;
        let unanswered = self.answers.iter().filter(|slot| slot.is_none()).count();
        if unanswered > 0 {
            return Err(SessionStateError::IncompleteAnswers { unanswered });
        }

        Ok(self.conclude(Conclusion::Submitted, now))
    }

    /// `Active -> Withdrawn`. No completeness precondition; unanswered
    /// slots score as incorrect and the attempt is recorded as failed
    /// regardless of the computed percentage. One-way, no resume.
    ///
    /// # Errors
    ///
    /// Returns a state error outside `Active`.
    pub fn withdraw(&mut self, now: DateTime<Utc>) -> Result<Vec<Effect>, SessionStateError> {
        self.ensure_active()?;
        Ok(self.conclude(Conclusion::Withdrawn, now))
    }

    /// Consumes one second of budget. At zero the tick itself performs the
    /// `TimedOut` transition. Ticks that lose the race against a user
    /// transition see a terminal session and report the clock stopped
    /// without any further effect.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickOutcome {
        if self.lifecycle != Lifecycle::Active {
            return TickOutcome {
                remaining_seconds: self.remaining_seconds,
                clock_stopped: true,
                effects: Vec::new(),
            };
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            let effects = self.conclude(Conclusion::TimedOut, now);
            return TickOutcome {
                remaining_seconds: 0,
                clock_stopped: true,
                effects,
            };
        }

        TickOutcome {
            remaining_seconds: self.remaining_seconds,
            clock_stopped: false,
            effects: Vec::new(),
        }
    }

    fn conclude(&mut self, conclusion: Conclusion, now: DateTime<Utc>) -> Vec<Effect> {
        let correct_choices: Vec<usize> = self
            .questions
            .iter()
            .map(SessionQuestion::correct_choice)
            .collect();
        let summary = scoring::score(&self.answers, &correct_choices);
        let passed = match conclusion {
            Conclusion::Withdrawn => false,
            _ => summary.passed,
        };

        self.lifecycle = conclusion.lifecycle();

        let outcome = TerminalOutcome {
            conclusion,
            user_id: self.user_id,
            subject: self.subject.clone(),
            version_id: self.version_id,
            correct_count: summary.correct_count,
            total_questions: summary.total_questions,
            score_percent: summary.score_percent,
            passed,
            finished_at: now,
        };
        let payload = json!({
            "reason": conclusion.reason(),
            "score_percent": outcome.score_percent,
            "correct_count": outcome.correct_count,
            "total_questions": outcome.total_questions,
            "passed": outcome.passed,
        });

        vec![
            Effect::StopClock,
            Effect::PersistAttempt(outcome),
            Effect::Telemetry {
                kind: conclusion.telemetry_kind(),
                payload,
            },
            Effect::CloseTelemetry,
        ]
    }

    fn ensure_active(&self) -> Result<(), SessionStateError> {
        match self.lifecycle {
            Lifecycle::Active => Ok(()),
            Lifecycle::Consent => Err(SessionStateError::ConsentPending),
            _ => Err(SessionStateError::AlreadyFinished),
        }
    }

    fn elapsed_ms(&self, now: DateTime<Utc>) -> i64 {
        self.last_action_at
            .map_or(0, |previous| (now - previous).num_milliseconds().max(0))
    }

    //
    // ─── ACCESSORS ────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    #[must_use]
    pub fn version_id(&self) -> VersionId {
        self.version_id
    }

    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    #[must_use]
    pub fn telemetry_session(&self) -> Option<TelemetrySessionId> {
        self.telemetry_session
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn questions(&self) -> &[SessionQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&SessionQuestion> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Selected choice for one question, `None` while unanswered.
    #[must_use]
    pub fn answer(&self, index: usize) -> Option<usize> {
        self.answers.get(index).copied().flatten()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|slot| slot.is_some()).count()
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }
}

//
// ─── TESTS ────────────────────────────────────────────────────────────────────
//
