//! Webhook authenticity checks and payload parsing.
//!
//! GitHub signs the raw body with HMAC-SHA256 (`X-Hub-Signature-256`);
//! GitLab echoes the shared secret in `X-Gitlab-Token`. Only pull requests
//! that were opened or received new commits (merge requests opened or
//! updated) ask for a review; every other delivery is acknowledged and
//! dropped.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::models::{PlatformKind, RequestKey};

use super::WebhookError;

type HmacSha256 = Hmac<Sha256>;

pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const GITLAB_TOKEN_HEADER: &str = "x-gitlab-token";

/// What a delivery asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Review the identified pull/merge request.
    Review(RequestKey),
    /// Nothing to do; holds a short description for the logs.
    Ignored(String),
}

/// The header carrying the credential for `kind`.
pub fn auth_header(kind: PlatformKind) -> &'static str {
    match kind {
        PlatformKind::GitHub => GITHUB_SIGNATURE_HEADER,
        PlatformKind::GitLab => GITLAB_TOKEN_HEADER,
    }
}

/// Check the delivery's credential header against the shared secret.
pub fn authenticate(
    kind: PlatformKind,
    secret: &str,
    header: Option<&str>,
    body: &[u8],
) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::MissingHeader(auth_header(kind)))?;
    match kind {
        PlatformKind::GitHub => verify_github_signature(secret, body, header),
        PlatformKind::GitLab => verify_gitlab_token(secret, header),
    }
}

/// Parse a delivery body for `kind`.
pub fn parse(kind: PlatformKind, body: &[u8]) -> Result<WebhookEvent, WebhookError> {
    match kind {
        PlatformKind::GitHub => parse_github(body),
        PlatformKind::GitLab => parse_gitlab(body),
    }
}

fn mac(secret: &str) -> Result<HmacSha256, WebhookError> {
    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::Payload(format!("unusable webhook secret: {e}")))
}

/// Verify a `sha256=<hex>` signature over `body`.
pub fn verify_github_signature(
    secret: &str,
    body: &[u8],
    signature: &str,
) -> Result<(), WebhookError> {
    let digest = signature
        .strip_prefix("sha256=")
        .ok_or(WebhookError::InvalidSignature)?;
    let expected = hex::decode(digest).map_err(|_| WebhookError::InvalidSignature)?;

    let mut mac = mac(secret)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Compare a GitLab token with the secret without leaking timing.
pub fn verify_gitlab_token(secret: &str, token: &str) -> Result<(), WebhookError> {
    // Both sides go through the MAC so `verify_slice` does the comparison.
    let mut expected = mac(secret)?;
    expected.update(secret.as_bytes());
    let expected = expected.finalize().into_bytes();

    let mut presented = mac(secret)?;
    presented.update(token.as_bytes());
    presented
        .verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidToken)
}

#[derive(Deserialize)]
struct GithubPayload {
    action: Option<String>,
    pull_request: Option<GithubPull>,
    repository: Option<GithubRepository>,
}

#[derive(Deserialize)]
struct GithubPull {
    number: u64,
}

#[derive(Deserialize)]
struct GithubRepository {
    name: String,
    owner: GithubUser,
}

#[derive(Deserialize)]
struct GithubUser {
    login: String,
}

fn parse_github(body: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let payload: GithubPayload =
        serde_json::from_slice(body).map_err(|e| WebhookError::Payload(e.to_string()))?;

    let action = payload.action.unwrap_or_default();
    if !matches!(action.as_str(), "opened" | "synchronize") {
        return Ok(WebhookEvent::Ignored(format!("github action '{action}'")));
    }
    let (Some(pull), Some(repository)) = (payload.pull_request, payload.repository) else {
        return Ok(WebhookEvent::Ignored(format!(
            "github '{action}' delivery without a pull request"
        )));
    };

    Ok(WebhookEvent::Review(RequestKey {
        source: repository.owner.login,
        project: repository.name,
        number: pull.number,
    }))
}

#[derive(Deserialize)]
struct GitlabPayload {
    object_kind: Option<String>,
    object_attributes: Option<GitlabAttributes>,
    project: Option<GitlabProject>,
}

#[derive(Deserialize)]
struct GitlabAttributes {
    action: Option<String>,
    iid: Option<u64>,
}

#[derive(Deserialize)]
struct GitlabProject {
    id: u64,
    path_with_namespace: String,
}

fn parse_gitlab(body: &[u8]) -> Result<WebhookEvent, WebhookError> {
    let payload: GitlabPayload =
        serde_json::from_slice(body).map_err(|e| WebhookError::Payload(e.to_string()))?;

    let kind = payload.object_kind.unwrap_or_default();
    if kind != "merge_request" {
        return Ok(WebhookEvent::Ignored(format!("gitlab '{kind}' event")));
    }
    let Some(attributes) = payload.object_attributes else {
        return Err(WebhookError::Payload(
            "merge request event without object_attributes".to_string(),
        ));
    };
    let action = attributes.action.unwrap_or_default();
    if !matches!(action.as_str(), "open" | "update") {
        return Ok(WebhookEvent::Ignored(format!("gitlab action '{action}'")));
    }
    let (Some(iid), Some(project)) = (attributes.iid, payload.project) else {
        return Err(WebhookError::Payload(
            "merge request event without iid or project".to_string(),
        ));
    };

    Ok(WebhookEvent::Review(RequestKey {
        source: project.id.to_string(),
        project: project.path_with_namespace,
        number: iid,
    }))
}
