//! Review orchestrator: admission, batched generation, retries and report assembly.

pub mod report;

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::constants::{GREETING, PROGRESS_TEMPLATE};
use crate::eligibility::{self, Classification};
use crate::gateway::{BatchItem, GatewayError, LanguageModelGateway};
use crate::models::{FileChange, ReviewOutcome, ReviewPolicy, ReviewRequest, SkipReason};
use crate::notify::NotificationSink;

pub use report::Report;

/// Position of a file in the final report.
enum Slot {
    /// Decided during admission.
    Decided(ReviewOutcome),
    /// Waiting on the model; indexes into the prompt batch.
    Pending { path: String, prompt: usize },
}

/// Result of the sequential admission walk.
struct Admission {
    slots: Vec<Slot>,
    prompts: Vec<String>,
}

/// Drives the review of one pull/merge request at a time.
///
/// Shared read-only across requests; every collaborator is injected here.
pub struct ReviewOrchestrator {
    gateway: Arc<dyn LanguageModelGateway>,
    sink: NotificationSink,
    policy: ReviewPolicy,
}

impl ReviewOrchestrator {
    pub fn new(
        gateway: Arc<dyn LanguageModelGateway>,
        sink: NotificationSink,
        policy: ReviewPolicy,
    ) -> Self {
        Self {
            gateway,
            sink,
            policy,
        }
    }

    pub fn policy(&self) -> &ReviewPolicy {
        &self.policy
    }

    /// Review every file of `request` and assemble the report.
    ///
    /// Never fails: per-file problems become `Errored` sections. The report
    /// is returned, not posted.
    pub async fn review_request(&self, request: &ReviewRequest) -> Report {
        let key = request.key();
        info!(request = %key, files = request.changes().len(), "starting review");

        self.sink.post_message(request, GREETING).await;

        let Admission { slots, prompts } = self.admit(request);
        debug!(request = %key, prompts = prompts.len(), "admission finished");

        let pending_paths: Vec<&str> = slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Pending { path, .. } => Some(path.as_str()),
                Slot::Decided(_) => None,
            })
            .collect();
        let subject = match pending_paths.as_slice() {
            [only] => format!("`{only}`"),
            paths => format!("{} files", paths.len()),
        };
        let results = self
            .with_progress(request, &subject, self.generate(&prompts))
            .await;

        // Pending slots appear in prompt order, so results pair up positionally.
        // Each file settles on its own future; retries sleep only there.
        let pending: Vec<_> = slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Pending { path, prompt } => Some((path, &prompts[*prompt])),
                Slot::Decided(_) => None,
            })
            .zip(results)
            .map(|((path, prompt), first)| self.settle(request, path, prompt, first))
            .collect();
        let mut settled = join_all(pending).await.into_iter();

        let outcomes: Vec<ReviewOutcome> = slots
            .into_iter()
            .filter_map(|slot| match slot {
                Slot::Decided(outcome) => Some(outcome),
                Slot::Pending { .. } => settled.next(),
            })
            .collect();

        let report = Report::new(outcomes);
        info!(
            request = %key,
            sections = report.outcomes().len(),
            errors = report.error_count(),
            "review finished"
        );
        report
    }

    /// Walk the files in order, charging the budget and building prompts.
    fn admit(&self, request: &ReviewRequest) -> Admission {
        let key = request.key();
        let changes = request.changes();
        let mut slots = Vec::new();
        let mut prompts = Vec::new();
        let mut considered = 0usize;

        for (idx, file) in changes.iter().enumerate() {
            if considered >= self.policy.maximum_files_per_request() {
                let remaining = changes.len() - idx;
                warn!(request = %key, remaining, "file budget exhausted");
                slots.push(Slot::Decided(ReviewOutcome::BudgetExceeded { remaining }));
                break;
            }

            match eligibility::classify(file, &self.policy) {
                Classification::RemovedFile => continue,
                Classification::BlockedByPath => {
                    info!(request = %key, path = %file.path, "skipping blocked path");
                    slots.push(Slot::Decided(ReviewOutcome::Skipped {
                        path: file.path.clone(),
                        reason: SkipReason::BlockedPath,
                    }));
                }
                Classification::TooLarge => {
                    let size = eligibility::patch_size(file);
                    info!(request = %key, path = %file.path, size, "skipping oversized patch");
                    slots.push(Slot::Decided(ReviewOutcome::Skipped {
                        path: file.path.clone(),
                        reason: SkipReason::TooLarge {
                            size,
                            limit: self.policy.maximum_patch_size_characters(),
                        },
                    }));
                }
                Classification::Eligible => {
                    slots.push(Slot::Pending {
                        path: file.path.clone(),
                        prompt: prompts.len(),
                    });
                    prompts.push(build_prompt(self.policy.prompt_template(), file));
                }
            }
            considered += 1;
        }

        Admission { slots, prompts }
    }

    /// Submit the batch; a failure of the whole call is charged to every prompt.
    async fn generate(&self, prompts: &[String]) -> Vec<BatchItem> {
        if prompts.is_empty() {
            return Vec::new();
        }
        match self
            .gateway
            .generate_batch(prompts, self.policy.generation_timeout())
            .await
        {
            Ok(results) if results.len() == prompts.len() => results,
            Ok(results) => {
                let err = GatewayError::Backend(format!(
                    "gateway returned {} results for {} prompts",
                    results.len(),
                    prompts.len()
                ));
                warn!(error = %err, "discarding mismatched batch");
                vec![Err(err); prompts.len()]
            }
            Err(e) => {
                warn!(error = %e, prompts = prompts.len(), "batch generation failed");
                vec![Err(e); prompts.len()]
            }
        }
    }

    /// Turn a file's first result into an outcome, retrying rate limits.
    ///
    /// A file gets at most `maximum_retries + 1` gateway attempts in total.
    async fn settle(
        &self,
        request: &ReviewRequest,
        path: &str,
        prompt: &str,
        first: BatchItem,
    ) -> ReviewOutcome {
        let mut result = first;
        let mut attempt: u32 = 1;
        loop {
            match result {
                Ok(text) => {
                    let outcome = ReviewOutcome::from_response(path, &text);
                    debug!(path = %path, attempt, "file reviewed");
                    return outcome;
                }
                Err(e) if e.is_rate_limited() && attempt <= self.policy.maximum_retries() => {
                    let backoff = self.policy.retry_backoff();
                    warn!(
                        path = %path,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "rate limited, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                    let retry = self
                        .gateway
                        .generate_one(prompt, self.policy.generation_timeout());
                    result = self
                        .with_progress(request, &format!("`{path}`"), retry)
                        .await;
                }
                Err(e) => {
                    warn!(path = %path, attempt, error = %e, "review failed");
                    return ReviewOutcome::Errored {
                        path: path.to_string(),
                        cause: e.to_string(),
                    };
                }
            }
        }
    }

    /// Await `work`, posting a progress note through the sink every
    /// `progress_interval` until it completes.
    async fn with_progress<T>(
        &self,
        request: &ReviewRequest,
        subject: &str,
        work: impl Future<Output = T>,
    ) -> T {
        let Some(every) = self.policy.progress_interval() else {
            return work.await;
        };
        let message = PROGRESS_TEMPLATE.replace("{subject}", subject);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        tokio::pin!(work);
        loop {
            tokio::select! {
                out = &mut work => return out,
                _ = ticker.tick() => {
                    debug!(request = %request.key(), subject, "generation still running");
                    self.sink.post_message(request, &message).await;
                }
            }
        }
    }
}

/// Build the model prompt for one file.
pub fn build_prompt(template: &str, file: &FileChange) -> String {
    format!(
        "{template}\n\nFile: {}\n\nChanges:\n```\n{}\n```",
        file.path, file.patch
    )
}
