//! Builds the per-session question presentation.
//!
//! The stored catalog is immutable; what varies per sitting is the order
//! of each question's choices. Shuffling happens here, once, when the
//! session is assembled, and the correct index is recomputed for the
//! shuffled order so the rest of the engine never needs the original.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::SliceRandom;

use proctor_core::model::{Subject, TestVersion, VersionId};
use proctor_core::session::SessionQuestion;
use storage::repository::{StorageError, TestCatalogRepository};

use crate::error::AssemblerError;

/// Hard cap on questions drawn into one session.
pub const MAX_QUESTIONS_PER_SESSION: u32 = 50;

/// Shuffles one question's choices, returning the permuted texts and the
/// correct index recomputed for the new order.
///
/// The permutation is over indices, so duplicate choice texts cannot
/// confuse the recomputation. Zero- and one-choice questions pass through
/// unchanged.
#[must_use]
pub fn shuffle_choices<R: Rng + ?Sized>(
    choices: &[String],
    correct: usize,
    rng: &mut R,
) -> (Vec<String>, usize) {
    if choices.len() < 2 {
        return (choices.to_vec(), correct);
    }

    let mut order: Vec<usize> = (0..choices.len()).collect();
    order.shuffle(rng);

    let shuffled = order.iter().map(|&source| choices[source].clone()).collect();
    // `order` is a permutation of 0..len and `correct` is in range, so the
    // position always exists.
    let new_correct = order
        .iter()
        .position(|&source| source == correct)
        .unwrap_or(correct);

    (shuffled, new_correct)
}

/// Assembles the presentation question set for one sitting.
#[derive(Clone)]
pub struct QuestionSetAssembler {
    catalog: Arc<dyn TestCatalogRepository>,
}

impl QuestionSetAssembler {
    #[must_use]
    pub fn new(catalog: Arc<dyn TestCatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Resolves the version a sitting for this subject would run against.
    ///
    /// # Errors
    ///
    /// Returns `AssemblerError::NoTestAvailable` when no active version is
    /// published for the subject, or `Storage` for backend failures.
    pub async fn current_version(
        &self,
        subject: &Subject,
        now: DateTime<Utc>,
    ) -> Result<TestVersion, AssemblerError> {
        match self.catalog.active_version(subject, now).await {
            Ok(version) => Ok(version),
            Err(StorageError::NotFound) => Err(AssemblerError::NoTestAvailable),
            Err(e) => Err(AssemblerError::Storage(e)),
        }
    }

    /// Loads the version's questions in display order and builds the
    /// shuffled presentation set. Every call reshuffles; the stored
    /// questions are never mutated.
    ///
    /// # Errors
    ///
    /// Returns `EmptyQuestionSet` if the version has no questions, or
    /// `NoTestAvailable` if the version disappeared since resolution.
    pub async fn assemble(
        &self,
        version_id: VersionId,
    ) -> Result<Vec<SessionQuestion>, AssemblerError> {
        let questions = match self
            .catalog
            .questions_for_version(version_id, MAX_QUESTIONS_PER_SESSION)
            .await
        {
            Ok(questions) => questions,
            Err(StorageError::NotFound) => return Err(AssemblerError::NoTestAvailable),
            Err(e) => return Err(AssemblerError::Storage(e)),
        };
        if questions.is_empty() {
            return Err(AssemblerError::EmptyQuestionSet);
        }

        let mut rng = rand::rng();
        questions
            .iter()
            .map(|question| {
                let (choices, correct) =
                    shuffle_choices(question.choices(), question.correct_choice(), &mut rng);
                SessionQuestion::new(question.id(), question.prompt(), choices, correct)
                    .map_err(AssemblerError::from)
            })
            .collect()
    }
}
