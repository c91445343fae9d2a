use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest subject key accepted from the catalog.
pub const MAX_SUBJECT_LEN: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubjectError {
    #[error("subject key cannot be empty")]
    Empty,

    #[error("subject key too long: {len} > {MAX_SUBJECT_LEN}")]
    TooLong { len: usize },
}

/// Validated subject/step key for a certification stage
/// (e.g. the knowledge-certificate exam).
///
/// Keys are trimmed and non-empty; the catalog side controls the actual
/// vocabulary, so the engine only enforces shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject(String);

impl Subject {
    /// Create a validated subject key.
    ///
    /// # Errors
    ///
    /// Returns `SubjectError::Empty` if the key is empty after trimming,
    /// or `SubjectError::TooLong` if it exceeds [`MAX_SUBJECT_LEN`].
    pub fn new(value: impl Into<String>) -> Result<Self, SubjectError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SubjectError::Empty);
        }
        if trimmed.len() > MAX_SUBJECT_LEN {
            return Err(SubjectError::TooLong { len: trimmed.len() });
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
