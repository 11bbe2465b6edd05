//! Inbound review request types: the request itself and its file changes.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A malformed review request. Fatal to the review call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("request source (owner or project id) must not be empty")]
    EmptySource,

    #[error("request project must not be empty")]
    EmptyProject,

    #[error("request number must be greater than zero")]
    ZeroRequestNumber,

    #[error("file change at position {0} has an empty path")]
    EmptyPath(usize),

    #[error("invalid request payload: {0}")]
    Payload(String),
}

/// Change status of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[serde(alias = "copied")]
    Added,
    #[serde(alias = "changed", alias = "unchanged")]
    Modified,
    Removed,
    Renamed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStatus::Added => write!(f, "added"),
            FileStatus::Modified => write!(f, "modified"),
            FileStatus::Removed => write!(f, "removed"),
            FileStatus::Renamed => write!(f, "renamed"),
        }
    }
}

/// One file's diff within a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Repository-relative path.
    pub path: String,
    /// Raw diff text; may be empty (e.g. binary files).
    #[serde(default)]
    pub patch: String,
    pub status: FileStatus,
}

impl FileChange {
    pub fn new(path: impl Into<String>, patch: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            patch: patch.into(),
            status,
        }
    }
}

/// Identity of a pull/merge request: `(source, project, number)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub source: String,
    pub project: String,
    pub number: u64,
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.source, self.project, self.number)
    }
}

/// One inbound review event.
///
/// Only constructible through [`ReviewRequest::new`] (or deserialization,
/// which goes through the same checks), so every instance is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawReviewRequest")]
pub struct ReviewRequest {
    source: String,
    project: String,
    request_number: u64,
    changes: Vec<FileChange>,
}

/// Unvalidated wire form of [`ReviewRequest`].
#[derive(Deserialize)]
struct RawReviewRequest {
    source: String,
    project: String,
    request_number: u64,
    #[serde(default)]
    changes: Vec<FileChange>,
}

impl TryFrom<RawReviewRequest> for ReviewRequest {
    type Error = ValidationError;

    fn try_from(raw: RawReviewRequest) -> Result<Self, Self::Error> {
        ReviewRequest::new(raw.source, raw.project, raw.request_number, raw.changes)
    }
}

impl ReviewRequest {
    /// Build a request, rejecting malformed input.
    pub fn new(
        source: impl Into<String>,
        project: impl Into<String>,
        request_number: u64,
        changes: Vec<FileChange>,
    ) -> Result<Self, ValidationError> {
        let source = source.into();
        let project = project.into();

        if source.trim().is_empty() {
            return Err(ValidationError::EmptySource);
        }
        if project.trim().is_empty() {
            return Err(ValidationError::EmptyProject);
        }
        if request_number == 0 {
            return Err(ValidationError::ZeroRequestNumber);
        }
        if let Some(pos) = changes.iter().position(|c| c.path.trim().is_empty()) {
            return Err(ValidationError::EmptyPath(pos));
        }

        Ok(Self {
            source,
            project,
            request_number,
            changes,
        })
    }

    /// Parse a request from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::Payload(e.to_string()))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn request_number(&self) -> u64 {
        self.request_number
    }

    /// File changes in the order the host reported them.
    pub fn changes(&self) -> &[FileChange] {
        &self.changes
    }

    pub fn key(&self) -> RequestKey {
        RequestKey {
            source: self.source.clone(),
            project: self.project.clone(),
            number: self.request_number,
        }
    }
}
