//! GitHub client: issue comments and pull request file listings.
//!
//! Pull requests share the issue comment API, so the report lands in the
//! conversation tab rather than on a diff line.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::constants;
use crate::models::{FileChange, FileStatus, RequestKey};

use super::{ChangeFetcher, CommentPoster, PlatformError, check_response, read_json};

const DEFAULT_API_URL: &str = "https://api.github.com";

/// Files per page when listing pull request files (the API maximum).
const FILES_PER_PAGE: usize = 100;

/// GitHub lists at most 3000 files per pull request.
const MAX_FILE_PAGES: usize = 30;

pub struct GithubClient {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

/// One entry of `GET /repos/{owner}/{repo}/pulls/{n}/files`.
#[derive(Deserialize)]
struct PullFile {
    filename: String,
    status: FileStatus,
    /// Absent for binary files and very large diffs.
    #[serde(default)]
    patch: Option<String>,
}

impl GithubClient {
    /// `url` may be the public site, its API host, or a GitHub Enterprise
    /// server; the REST base is derived from it.
    pub fn new(url: Option<&str>, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_base(url),
            token,
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", constants::APP_NAME)
    }
}

fn api_base(url: Option<&str>) -> String {
    let Some(url) = url.map(|u| u.trim_end_matches('/')) else {
        return DEFAULT_API_URL.to_string();
    };
    if url.is_empty() || url == "https://github.com" || url == "http://github.com" {
        DEFAULT_API_URL.to_string()
    } else if url.contains("://api.") || url.ends_with("/api/v3") {
        url.to_string()
    } else {
        format!("{url}/api/v3")
    }
}

#[async_trait]
impl CommentPoster for GithubClient {
    async fn post_comment(&self, key: &RequestKey, body: &str) -> Result<(), PlatformError> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_url, key.source, key.project, key.number
        );

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({ "body": body }))
            .send()
            .await
            .map_err(|e| PlatformError::Api(e.to_string()))?;

        check_response(response, "comment creation").await.map(|_| ())
    }
}

#[async_trait]
impl ChangeFetcher for GithubClient {
    async fn fetch_changes(&self, key: &RequestKey) -> Result<Vec<FileChange>, PlatformError> {
        let mut changes = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let url = format!(
                "{}/repos/{}/{}/pulls/{}/files?per_page={FILES_PER_PAGE}&page={page}",
                self.api_url, key.source, key.project, key.number
            );
            let response = self
                .request(reqwest::Method::GET, &url)
                .send()
                .await
                .map_err(|e| PlatformError::Api(e.to_string()))?;
            let files: Vec<PullFile> = read_json(response, "listing pull request files").await?;

            let last_page = files.len() < FILES_PER_PAGE;
            changes.extend(files.into_iter().map(|f| {
                FileChange::new(f.filename, f.patch.unwrap_or_default(), f.status)
            }));
            if last_page {
                break;
            }
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn key() -> RequestKey {
        RequestKey {
            source: "octo".into(),
            project: "widgets".into(),
            number: 42,
        }
    }

    #[test]
    fn api_base_variants() {
        assert_eq!(api_base(None), "https://api.github.com");
        assert_eq!(api_base(Some("https://github.com/")), "https://api.github.com");
        assert_eq!(api_base(Some("https://api.github.com")), "https://api.github.com");
        assert_eq!(
            api_base(Some("https://ghe.corp.example")),
            "https://ghe.corp.example/api/v3"
        );
        assert_eq!(
            api_base(Some("https://ghe.corp.example/api/v3")),
            "https://ghe.corp.example/api/v3"
        );
    }

    #[tokio::test]
    async fn posts_issue_comment() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v3/repos/octo/widgets/issues/42/comments")
            .match_header("authorization", "Bearer ghp_test")
            .match_body(Matcher::Json(json!({ "body": "hello" })))
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let client = GithubClient::new(Some(&format!("{}/api/v3", server.url())), "ghp_test".into());
        client.post_comment(&key(), "hello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_is_api_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v3/repos/octo/widgets/issues/42/comments")
            .with_status(403)
            .with_body("Resource not accessible by integration")
            .create_async()
            .await;

        let client = GithubClient::new(Some(&format!("{}/api/v3", server.url())), "ghp_test".into());
        let err = client.post_comment(&key(), "hello").await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("403"), "got: {msg}");
        assert!(msg.contains("not accessible"), "got: {msg}");
    }

    #[tokio::test]
    async fn bare_host_gets_the_enterprise_prefix() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v3/repos/octo/widgets/issues/42/comments")
            .with_status(201)
            .with_body("{}")
            .create_async()
            .await;

        let client = GithubClient::new(Some(&server.url()), "ghp_test".into());
        client.post_comment(&key(), "hello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn lists_pull_request_files() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/repos/octo/widgets/pulls/42/files")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("per_page".into(), "100".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .match_header("authorization", "Bearer ghp_test")
            .with_status(200)
            .with_body(
                json!([
                    {"filename": "src/lib.rs", "status": "modified", "patch": "@@ -1 +1 @@\n-a\n+b"},
                    {"filename": "logo.png", "status": "added"},
                    {"filename": "old.rs", "status": "removed", "patch": "-gone"},
                    {"filename": "copy.rs", "status": "copied", "patch": ""}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = GithubClient::new(Some(&server.url()), "ghp_test".into());
        let changes = client.fetch_changes(&key()).await.unwrap();
        mock.assert_async().await;

        assert_eq!(
            changes,
            vec![
                FileChange::new("src/lib.rs", "@@ -1 +1 @@\n-a\n+b", FileStatus::Modified),
                FileChange::new("logo.png", "", FileStatus::Added),
                FileChange::new("old.rs", "-gone", FileStatus::Removed),
                FileChange::new("copy.rs", "", FileStatus::Added),
            ]
        );
    }

    #[tokio::test]
    async fn follows_full_pages() {
        let mut server = Server::new_async().await;
        let first: Vec<_> = (0..FILES_PER_PAGE)
            .map(|i| json!({"filename": format!("f{i}.rs"), "status": "added", "patch": "+x"}))
            .collect();
        let page_one = server
            .mock("GET", "/api/v3/repos/octo/widgets/pulls/42/files")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(serde_json::Value::Array(first).to_string())
            .create_async()
            .await;
        let page_two = server
            .mock("GET", "/api/v3/repos/octo/widgets/pulls/42/files")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(r#"[{"filename": "last.rs", "status": "added", "patch": "+y"}]"#)
            .create_async()
            .await;

        let client = GithubClient::new(Some(&server.url()), "ghp_test".into());
        let changes = client.fetch_changes(&key()).await.unwrap();
        page_one.assert_async().await;
        page_two.assert_async().await;

        assert_eq!(changes.len(), FILES_PER_PAGE + 1);
        assert_eq!(changes[0].path, "f0.rs");
        assert_eq!(changes[FILES_PER_PAGE].path, "last.rs");
    }

    #[tokio::test]
    async fn listing_failure_is_api_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v3/repos/octo/widgets/pulls/42/files")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_body("Not Found")
            .create_async()
            .await;

        let client = GithubClient::new(Some(&server.url()), "ghp_test".into());
        let err = client.fetch_changes(&key()).await.unwrap_err();
        assert!(err.to_string().contains("listing pull request files"), "got: {err}");
        assert!(err.to_string().contains("404"), "got: {err}");
    }
}
