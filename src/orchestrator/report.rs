//! Final review report assembly.

use std::fmt;

use crate::constants::{NO_CHANGES_LINE, REPORT_PREAMBLE, REPORT_SEPARATOR};
use crate::models::ReviewOutcome;

/// The assembled result of one review: outcomes in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    outcomes: Vec<ReviewOutcome>,
}

impl Report {
    pub fn new(outcomes: Vec<ReviewOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[ReviewOutcome] {
        &self.outcomes
    }

    /// Number of outcomes that signal a failed review.
    pub fn error_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ReviewOutcome::Errored { .. }))
            .count()
    }

    /// Render as a single Markdown comment body.
    pub fn render(&self) -> String {
        let mut sections = Vec::with_capacity(self.outcomes.len() + 1);
        sections.push(REPORT_PREAMBLE.to_string());
        if self.outcomes.is_empty() {
            sections.push(NO_CHANGES_LINE.to_string());
        } else {
            sections.extend(self.outcomes.iter().map(ReviewOutcome::render));
        }
        sections.join(REPORT_SEPARATOR)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SkipReason;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_report_has_only_the_no_changes_line() {
        let report = Report::new(vec![]);
        assert_eq!(
            report.render(),
            format!("{REPORT_PREAMBLE}{REPORT_SEPARATOR}{NO_CHANGES_LINE}")
        );
    }

    #[test]
    fn sections_follow_outcome_order() {
        let report = Report::new(vec![
            ReviewOutcome::NoIssues {
                path: "b.rs".into(),
            },
            ReviewOutcome::Skipped {
                path: "vendor/a.rs".into(),
                reason: SkipReason::BlockedPath,
            },
        ]);
        let rendered = report.to_string();
        let sections: Vec<&str> = rendered.split(REPORT_SEPARATOR).collect();

        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0], REPORT_PREAMBLE);
        assert!(sections[1].contains("b.rs"));
        assert!(sections[2].contains("vendor/a.rs"));
        assert!(!rendered.contains(NO_CHANGES_LINE));
    }

    #[test]
    fn counts_errors() {
        let report = Report::new(vec![
            ReviewOutcome::Errored {
                path: "a".into(),
                cause: "boom".into(),
            },
            ReviewOutcome::NoIssues { path: "b".into() },
            ReviewOutcome::BudgetExceeded { remaining: 2 },
        ]);
        assert_eq!(report.error_count(), 1);
    }
}
