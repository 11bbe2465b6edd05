//! File eligibility: decides whether a changed file is sent to the model.
//!
//! Pure decision logic with no I/O. The order of checks is fixed: a
//! removed file is never charged against path or size policy.

use crate::models::{FileChange, FileStatus, ReviewPolicy};

/// The admission decision for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Send to the model.
    Eligible,
    /// A blocked keyword appears in the path.
    BlockedByPath,
    /// The patch is longer than the configured limit.
    TooLarge,
    /// The file was deleted; excluded silently.
    RemovedFile,
}

/// Classify a file against the policy.
pub fn classify(file: &FileChange, policy: &ReviewPolicy) -> Classification {
    if file.status == FileStatus::Removed {
        return Classification::RemovedFile;
    }
    if is_path_blocked(&file.path, policy.blocked_path_keywords()) {
        return Classification::BlockedByPath;
    }
    if patch_size(file) > policy.maximum_patch_size_characters() {
        return Classification::TooLarge;
    }
    Classification::Eligible
}

/// Patch length in characters (not bytes).
pub fn patch_size(file: &FileChange) -> usize {
    file.patch.chars().count()
}

/// `keywords` must already be lowercased.
fn is_path_blocked(path: &str, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let path_lower = path.to_lowercase();
    keywords.iter().any(|k| path_lower.contains(k.as_str()))
}
