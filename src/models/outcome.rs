//! Per-file review outcomes and their report rendering.

use std::fmt;

/// Why a file was skipped without asking the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The path contains a blocked keyword.
    BlockedPath,
    /// The patch exceeds the size limit (sizes in characters).
    TooLarge { size: usize, limit: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BlockedPath => write!(f, "path matches a blocked keyword"),
            SkipReason::TooLarge { size, limit } => write!(
                f,
                "too large ({size} characters, limit is {limit})"
            ),
        }
    }
}

/// Terminal result for one considered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// The model reported findings.
    Reviewed { path: String, findings: String },
    /// The model found nothing to report.
    NoIssues { path: String },
    /// The file was not sent to the model.
    Skipped { path: String, reason: SkipReason },
    /// Reviewing the file failed.
    Errored { path: String, cause: String },
    /// Files beyond the per-request budget, collapsed into one marker.
    BudgetExceeded { remaining: usize },
}

impl ReviewOutcome {
    /// The file path, or `None` for the budget marker.
    pub fn path(&self) -> Option<&str> {
        match self {
            ReviewOutcome::Reviewed { path, .. }
            | ReviewOutcome::NoIssues { path }
            | ReviewOutcome::Skipped { path, .. }
            | ReviewOutcome::Errored { path, .. } => Some(path),
            ReviewOutcome::BudgetExceeded { .. } => None,
        }
    }

    /// Classify raw model output.
    ///
    /// Empty output, or output mentioning "no issues" in any casing, is a
    /// clean bill of health.
    pub fn from_response(path: impl Into<String>, response: &str) -> Self {
        let path = path.into();
        let trimmed = response.trim();
        if trimmed.is_empty() || trimmed.to_lowercase().contains("no issues") {
            ReviewOutcome::NoIssues { path }
        } else {
            ReviewOutcome::Reviewed {
                path,
                findings: trimmed.to_string(),
            }
        }
    }

    /// Render the outcome as one Markdown report section.
    pub fn render(&self) -> String {
        match self {
            ReviewOutcome::Reviewed { path, findings } => {
                format!("### ⚠️ 📄 {path}\n\n{findings}")
            }
            ReviewOutcome::NoIssues { path } => {
                format!("### ✅ 📄 {path}\n\nNo issues detected.")
            }
            ReviewOutcome::Skipped {
                path,
                reason: SkipReason::BlockedPath,
            } => format!("### ⏭️ 📄 {path}\n\nSkipped review."),
            ReviewOutcome::Skipped {
                path,
                reason: SkipReason::TooLarge { size, limit },
            } => format!(
                "### 🐘 📄 {path}\n\nFile changes are too large to review \
                 ({size} characters, limit is {limit})."
            ),
            ReviewOutcome::Errored { path, cause } => {
                format!("### 🌋 📄 {path}\n\nError reviewing: {cause}")
            }
            ReviewOutcome::BudgetExceeded { remaining } => format!(
                "🛑 Too many files to review. {remaining} remaining {} not reviewed.",
                if *remaining == 1 { "file was" } else { "files were" }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_response_detects_no_issues() {
        assert_eq!(
            ReviewOutcome::from_response("a.rs", "No Issues found in this file."),
            ReviewOutcome::NoIssues { path: "a.rs".into() }
        );
        assert_eq!(
            ReviewOutcome::from_response("a.rs", "  \n "),
            ReviewOutcome::NoIssues { path: "a.rs".into() }
        );
    }

    #[test]
    fn from_response_keeps_trimmed_findings() {
        assert_eq!(
            ReviewOutcome::from_response("a.rs", "\nConsider a bounds check.\n"),
            ReviewOutcome::Reviewed {
                path: "a.rs".into(),
                findings: "Consider a bounds check.".into()
            }
        );
    }

    #[test]
    fn render_markers() {
        let no_issues = ReviewOutcome::NoIssues { path: "a.rs".into() }.render();
        assert!(no_issues.starts_with("### ✅ 📄 a.rs"));

        let blocked = ReviewOutcome::Skipped {
            path: "vendor/x.js".into(),
            reason: SkipReason::BlockedPath,
        }
        .render();
        assert!(blocked.contains("Skipped review."));

        let large = ReviewOutcome::Skipped {
            path: "big.sql".into(),
            reason: SkipReason::TooLarge { size: 200, limit: 100 },
        }
        .render();
        assert!(large.contains("too large"));
        assert!(large.contains("200 characters"));

        let errored = ReviewOutcome::Errored {
            path: "c.rs".into(),
            cause: "boom".into(),
        }
        .render();
        assert!(errored.ends_with("Error reviewing: boom"));
    }

    #[test]
    fn render_budget_marker_pluralises() {
        assert!(
            ReviewOutcome::BudgetExceeded { remaining: 1 }
                .render()
                .contains("1 remaining file was")
        );
        assert!(
            ReviewOutcome::BudgetExceeded { remaining: 3 }
                .render()
                .contains("3 remaining files were")
        );
    }

    #[test]
    fn path_is_none_for_budget_marker() {
        assert_eq!(ReviewOutcome::BudgetExceeded { remaining: 2 }.path(), None);
        assert_eq!(
            ReviewOutcome::NoIssues { path: "x".into() }.path(),
            Some("x")
        );
    }
}
