#![forbid(unsafe_code)]

pub mod app_services;
pub mod assembler;
pub mod error;
pub mod history;
pub mod quota;
pub mod session;
pub mod telemetry;
pub mod workflow;

pub use proctor_core::Clock;

pub use error::{AppServicesError, AssemblerError, HistoryError, QuotaError, SessionError};

pub use app_services::ExamServices;
pub use assembler::{MAX_QUESTIONS_PER_SESSION, QuestionSetAssembler, shuffle_choices};
pub use history::AttemptHistoryService;
pub use quota::{AttemptQuotaGuard, MONTHLY_ATTEMPT_QUOTA, QuotaStatus};
pub use session::{
    CountdownDriver, FinishResult, QuestionView, SessionController, SessionView, TickReport,
};
pub use telemetry::TelemetryRecorder;
pub use workflow::ExamLauncher;
