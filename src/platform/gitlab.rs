//! GitLab client: merge-request notes and change listings.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::models::{FileChange, FileStatus, RequestKey};

use super::{ChangeFetcher, CommentPoster, PlatformError, check_response, read_json};

const DEFAULT_URL: &str = "https://gitlab.com";

pub struct GitlabClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

/// Body of `GET /projects/{id}/merge_requests/{iid}/changes`.
#[derive(Deserialize)]
struct MergeRequestChanges {
    #[serde(default)]
    changes: Vec<MergeRequestChange>,
}

#[derive(Deserialize)]
struct MergeRequestChange {
    new_path: String,
    #[serde(default)]
    diff: String,
    #[serde(default)]
    new_file: bool,
    #[serde(default)]
    deleted_file: bool,
    #[serde(default)]
    renamed_file: bool,
}

impl MergeRequestChange {
    fn status(&self) -> FileStatus {
        if self.deleted_file {
            FileStatus::Removed
        } else if self.new_file {
            FileStatus::Added
        } else if self.renamed_file {
            FileStatus::Renamed
        } else {
            FileStatus::Modified
        }
    }
}

impl GitlabClient {
    pub fn new(url: Option<&str>, token: String) -> Self {
        let base_url = url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(DEFAULT_URL)
            .trim_end_matches('/')
            .to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    /// `key.source` carries the project id; `key.project` is only its display path.
    fn merge_request_url(&self, key: &RequestKey) -> String {
        format!(
            "{}/api/v4/projects/{}/merge_requests/{}",
            self.base_url,
            project_id(&key.source),
            key.number
        )
    }
}

/// Encode a numeric id or `namespace/project` path for use as a project id.
fn project_id(project: &str) -> String {
    project.replace('/', "%2F")
}

#[async_trait]
impl CommentPoster for GitlabClient {
    async fn post_comment(&self, key: &RequestKey, body: &str) -> Result<(), PlatformError> {
        let url = format!("{}/notes", self.merge_request_url(key));

        let response = self
            .client
            .post(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&json!({ "body": body }))
            .send()
            .await
            .map_err(|e| PlatformError::Api(e.to_string()))?;

        check_response(response, "note creation").await.map(|_| ())
    }
}

#[async_trait]
impl ChangeFetcher for GitlabClient {
    async fn fetch_changes(&self, key: &RequestKey) -> Result<Vec<FileChange>, PlatformError> {
        let url = format!("{}/changes", self.merge_request_url(key));

        let response = self
            .client
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|e| PlatformError::Api(e.to_string()))?;
        let body: MergeRequestChanges = read_json(response, "listing merge request changes").await?;

        Ok(body
            .changes
            .into_iter()
            .map(|change| {
                let status = change.status();
                FileChange::new(change.new_path, change.diff, status)
            })
            .collect())
    }
}
