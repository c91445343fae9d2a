use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Subject, VersionId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TestVersionError {
    #[error("test version title cannot be empty")]
    EmptyTitle,
}

/// An immutable, published snapshot of a question set for one subject.
///
/// Versions are created by the authoring backend and are read-only here;
/// at most one version is "current" for a subject at a given instant
/// (latest active publication whose `published_at` is not in the future).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestVersion {
    id: VersionId,
    subject: Subject,
    title: String,
    published_at: DateTime<Utc>,
    active: bool,
}

impl TestVersion {
    /// Rehydrate a test version from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `TestVersionError::EmptyTitle` if the title is blank.
    pub fn from_persisted(
        id: VersionId,
        subject: Subject,
        title: impl Into<String>,
        published_at: DateTime<Utc>,
        active: bool,
    ) -> Result<Self, TestVersionError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(TestVersionError::EmptyTitle);
        }

        Ok(Self {
            id,
            subject,
            title,
            published_at,
            active,
        })
    }

    #[must_use]
    pub fn id(&self) -> VersionId {
        self.id
    }

    #[must_use]
    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    #[must_use]
    pub fn active(&self) -> bool {
        self.active
    }

    /// True when this version can be served to applicants at `now`.
    #[must_use]
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.active && self.published_at <= now
    }
}
