//! Source-control host clients.
//!
//! A [`CommentPoster`] delivers a Markdown body to the conversation of a
//! pull/merge request. The same poster backs the interim notification sink
//! and the delivery of the final report. A [`ChangeFetcher`] lists the
//! changed files of a request announced by a webhook.

pub mod github;
pub mod gitlab;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::config::PlatformConfig;
use crate::models::{FileChange, PlatformKind, RequestKey};

pub use github::GithubClient;
pub use gitlab::GitlabClient;

/// Errors from platform API calls.
#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("platform not configured: {0}")]
    NotConfigured(String),

    #[error("API request failed: {0}")]
    Api(String),
}

/// Posts a comment on a pull/merge request.
#[async_trait]
pub trait CommentPoster: Send + Sync {
    async fn post_comment(&self, key: &RequestKey, body: &str) -> Result<(), PlatformError>;
}

/// Lists the file changes of a pull/merge request, in host order.
#[async_trait]
pub trait ChangeFetcher: Send + Sync {
    async fn fetch_changes(&self, key: &RequestKey) -> Result<Vec<FileChange>, PlatformError>;
}

/// Build the poster selected by configuration.
///
/// Returns `Ok(None)` when no token is configured: posting is optional.
pub fn build_poster(
    config: &PlatformConfig,
) -> Result<Option<Arc<dyn CommentPoster>>, PlatformError> {
    let Some((kind, token)) = credentials(config)? else {
        return Ok(None);
    };
    let poster: Arc<dyn CommentPoster> = match kind {
        PlatformKind::GitHub => Arc::new(GithubClient::new(config.url.as_deref(), token)),
        PlatformKind::GitLab => Arc::new(GitlabClient::new(config.url.as_deref(), token)),
    };
    Ok(Some(poster))
}

/// Build the change fetcher selected by configuration. A token is required.
pub fn build_fetcher(config: &PlatformConfig) -> Result<Arc<dyn ChangeFetcher>, PlatformError> {
    let (kind, token) = credentials(config)?.ok_or_else(|| {
        PlatformError::NotConfigured("a platform token is needed to fetch changes".to_string())
    })?;
    let fetcher: Arc<dyn ChangeFetcher> = match kind {
        PlatformKind::GitHub => Arc::new(GithubClient::new(config.url.as_deref(), token)),
        PlatformKind::GitLab => Arc::new(GitlabClient::new(config.url.as_deref(), token)),
    };
    Ok(fetcher)
}

/// The host kind and token, or `None` without a token.
fn credentials(config: &PlatformConfig) -> Result<Option<(PlatformKind, String)>, PlatformError> {
    let Some(token) = config.token.clone() else {
        return Ok(None);
    };
    let kind = config.resolved_kind().ok_or_else(|| {
        PlatformError::NotConfigured(
            "cannot tell whether the platform is GitHub or GitLab; set platform.kind".to_string(),
        )
    })?;
    Ok(Some((kind, token)))
}

/// Pass a success response through; turn anything else into a
/// [`PlatformError::Api`] naming `action`.
pub(crate) async fn check_response(
    response: reqwest::Response,
    action: &str,
) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    Err(PlatformError::Api(format!(
        "{action} failed with HTTP {status}: {body}"
    )))
}

/// Check the status, then decode the JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    action: &str,
) -> Result<T, PlatformError> {
    check_response(response, action)
        .await?
        .json()
        .await
        .map_err(|e| PlatformError::Api(format!("{action} returned an unexpected body: {e}")))
}
