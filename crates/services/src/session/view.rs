use proctor_core::session::{Lifecycle, Session};

/// One question as the candidate sees it. The correct choice is not part
/// of the view; nothing the presentation layer receives can reveal it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionView {
    pub prompt: String,
    pub choices: Vec<String>,
    pub selected: Option<usize>,
}

/// Snapshot of everything the screen renders.
///
/// This is presentation-agnostic: no pre-formatted strings, no
/// localization assumptions. The UI formats the countdown and labels as
/// it sees fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub lifecycle: Lifecycle,
    pub current_index: usize,
    pub question_count: usize,
    pub answered_count: usize,
    pub remaining_seconds: u32,
    pub questions: Vec<QuestionView>,
}

impl SessionView {
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        let questions = session
            .questions()
            .iter()
            .enumerate()
            .map(|(index, question)| QuestionView {
                prompt: question.prompt().to_owned(),
                choices: question.choices().to_vec(),
                selected: session.answer(index),
            })
            .collect();

        Self {
            lifecycle: session.lifecycle(),
            current_index: session.current_index(),
            question_count: session.question_count(),
            answered_count: session.answered_count(),
            remaining_seconds: session.remaining_seconds(),
            questions,
        }
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&QuestionView> {
        self.questions.get(self.current_index)
    }
}
