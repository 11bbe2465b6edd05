//! Review policy: the read-only knobs applied to every request.

use std::time::Duration;

use thiserror::Error;

/// Rejected policy values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("maximum files per request must be greater than zero")]
    ZeroMaximumFiles,

    #[error("maximum patch size must be greater than zero")]
    ZeroMaximumPatchSize,

    #[error("generation timeout must be greater than zero")]
    ZeroTimeout,
}

/// Limits and texts governing one review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewPolicy {
    prompt_template: String,
    maximum_files_per_request: usize,
    maximum_patch_size_characters: usize,
    /// Stored lowercased.
    blocked_path_keywords: Vec<String>,
    maximum_retries: u32,
    retry_backoff: Duration,
    generation_timeout: Duration,
    progress_interval: Option<Duration>,
}

impl ReviewPolicy {
    /// Build a policy with default retry and timeout settings
    /// (3 retries, 30s backoff, 300s timeout), no blocked keywords and no
    /// progress notes.
    pub fn new(
        prompt_template: impl Into<String>,
        maximum_files_per_request: usize,
        maximum_patch_size_characters: usize,
    ) -> Result<Self, PolicyError> {
        if maximum_files_per_request == 0 {
            return Err(PolicyError::ZeroMaximumFiles);
        }
        if maximum_patch_size_characters == 0 {
            return Err(PolicyError::ZeroMaximumPatchSize);
        }
        Ok(Self {
            prompt_template: prompt_template.into(),
            maximum_files_per_request,
            maximum_patch_size_characters,
            blocked_path_keywords: Vec::new(),
            maximum_retries: 3,
            retry_backoff: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(300),
            progress_interval: None,
        })
    }

    /// Replace the blocked path keywords. Blank keywords are dropped.
    pub fn with_blocked_path_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.blocked_path_keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    pub fn with_retries(mut self, maximum_retries: u32, backoff_seconds: u64) -> Self {
        self.maximum_retries = maximum_retries;
        self.retry_backoff = Duration::from_secs(backoff_seconds);
        self
    }

    /// Post a "still reviewing" note every `interval` while a generation
    /// runs. `None` (or a zero interval) disables the notes.
    pub fn with_progress_interval(mut self, interval: Option<Duration>) -> Self {
        self.progress_interval = interval.filter(|d| !d.is_zero());
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Result<Self, PolicyError> {
        if timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        self.generation_timeout = timeout;
        Ok(self)
    }

    pub fn prompt_template(&self) -> &str {
        &self.prompt_template
    }

    pub fn maximum_files_per_request(&self) -> usize {
        self.maximum_files_per_request
    }

    pub fn maximum_patch_size_characters(&self) -> usize {
        self.maximum_patch_size_characters
    }

    /// Lowercased keywords.
    pub fn blocked_path_keywords(&self) -> &[String] {
        &self.blocked_path_keywords
    }

    pub fn maximum_retries(&self) -> u32 {
        self.maximum_retries
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub fn generation_timeout(&self) -> Duration {
        self.generation_timeout
    }

    pub fn progress_interval(&self) -> Option<Duration> {
        self.progress_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_limits() {
        assert_eq!(
            ReviewPolicy::new("p", 0, 10).unwrap_err(),
            PolicyError::ZeroMaximumFiles
        );
        assert_eq!(
            ReviewPolicy::new("p", 10, 0).unwrap_err(),
            PolicyError::ZeroMaximumPatchSize
        );
        let policy = ReviewPolicy::new("p", 1, 1).unwrap();
        assert_eq!(
            policy.with_generation_timeout(Duration::ZERO).unwrap_err(),
            PolicyError::ZeroTimeout
        );
    }

    #[test]
    fn keywords_are_normalised() {
        let policy = ReviewPolicy::new("p", 1, 1)
            .unwrap()
            .with_blocked_path_keywords(["  Vendor ", "", "LOCK"]);
        assert_eq!(policy.blocked_path_keywords(), ["vendor", "lock"]);
    }

    #[test]
    fn retry_settings() {
        let policy = ReviewPolicy::new("p", 1, 1).unwrap().with_retries(0, 0);
        assert_eq!(policy.maximum_retries(), 0);
        assert_eq!(policy.retry_backoff(), Duration::ZERO);
    }

    #[test]
    fn progress_interval_is_off_unless_positive() {
        let policy = ReviewPolicy::new("p", 1, 1).unwrap();
        assert_eq!(policy.progress_interval(), None);
        let policy = policy.with_progress_interval(Some(Duration::ZERO));
        assert_eq!(policy.progress_interval(), None);
        let policy = policy.with_progress_interval(Some(Duration::from_secs(60)));
        assert_eq!(policy.progress_interval(), Some(Duration::from_secs(60)));
    }
}
