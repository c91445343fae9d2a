use thiserror::Error;

use crate::model::{QuestionId, VersionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("choice {index} is empty")]
    EmptyChoice { index: usize },

    #[error("correct choice {index} out of range for {choices} choices")]
    CorrectChoiceOutOfRange { index: usize, choices: usize },
}

/// One multiple-choice question as published in a `TestVersion`.
///
/// Owned exclusively by its version and immutable once published. The
/// choice order here is the authored order; per-session presentation
/// shuffling never touches this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    version_id: VersionId,
    position: u32,
    prompt: String,
    choices: Vec<String>,
    correct_choice: usize,
}

impl Question {
    /// Rehydrate a question from persisted storage.
    ///
    /// Questions with zero or one choice are accepted; they are degenerate
    /// but must flow through the session pipeline without tripping it.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt or any choice is blank, or if
    /// the correct-choice index does not address a choice.
    pub fn from_persisted(
        id: QuestionId,
        version_id: VersionId,
        position: u32,
        prompt: impl Into<String>,
        choices: Vec<String>,
        correct_choice: usize,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        for (index, choice) in choices.iter().enumerate() {
            if choice.trim().is_empty() {
                return Err(QuestionError::EmptyChoice { index });
            }
        }
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
            id,
            version_id,
            position,
            prompt,
            choices,
            correct_choice,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn version_id(&self) -> VersionId {
        self.version_id
    }

    /// Display order within the version.
    #[must_use]
    pub fn position(&self) -> u32 {
        self.position
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    /// Index of the correct choice in the authored order.
    #[must_use]
    pub fn correct_choice(&self) -> usize {
        self.correct_choice
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| (*t).to_string()).collect()
    }

    #[test]
    fn valid_question_builds() {
        let q = Question::from_persisted(
            QuestionId::new(1),
            VersionId::new(1),
            0,
            "Which light means stop?",
            choices(&["Green", "Red", "Blue"]),
            1,
        )
        .unwrap();
        assert_eq!(q.correct_choice(), 1);
        assert_eq!(q.choices().len(), 3);
    }

    #[test]
    fn empty_prompt_rejected() {
        let err = Question::from_persisted(
            QuestionId::new(1),
            VersionId::new(1),
            0,
            "  ",
            choices(&["A", "B"]),
            0,
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::EmptyPrompt);
    }

    #[test]
    fn blank_choice_rejected() {
        let err = Question::from_persisted(
            QuestionId::new(1),
            VersionId::new(1),
            0,
            "Prompt",
            choices(&["A", " "]),
            0,
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::EmptyChoice { index: 1 });
    }

    #[test]
    fn correct_choice_out_of_range_rejected() {
        let err = Question::from_persisted(
            QuestionId::new(1),
            VersionId::new(1),
            0,
            "Prompt",
            choices(&["A", "B"]),
            2,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            QuestionError::CorrectChoiceOutOfRange { index: 2, choices: 2 }
        ));
    }

    #[test]
    fn single_choice_question_allowed() {
        let q = Question::from_persisted(
            QuestionId::new(1),
            VersionId::new(1),
            0,
            "Prompt",
            choices(&["Only option"]),
            0,
        )
        .unwrap();
        assert_eq!(q.choices().len(), 1);
    }

    #[test]
    fn zero_choice_question_allowed() {
        let q = Question::from_persisted(
            QuestionId::new(1),
            VersionId::new(1),
            0,
            "Prompt",
            Vec::new(),
            0,
        )
        .unwrap();
        assert!(q.choices().is_empty());
    }
}
