//! Webhook intake: the HTTP service that turns pull/merge request events
//! into reviews.
//!
//! `POST /webhook` authenticates the delivery, decides whether it asks for
//! a review, and answers right away; the review itself (fetching the
//! changed files, running the orchestrator, posting the report) runs on a
//! background task. `GET /health` answers `OK`.

pub mod event;

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::models::{PlatformKind, RequestKey, ReviewRequest, ValidationError};
use crate::orchestrator::ReviewOrchestrator;
use crate::platform::{ChangeFetcher, CommentPoster, PlatformError};

pub use event::WebhookEvent;

/// Errors while accepting or acting on a delivery.
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("webhook signature does not match")]
    InvalidSignature,

    #[error("webhook token does not match")]
    InvalidToken,

    #[error("invalid webhook payload: {0}")]
    Payload(String),

    #[error("failed to fetch changes: {0}")]
    Fetch(#[from] PlatformError),

    #[error("host returned an invalid request: {0}")]
    Request(#[from] ValidationError),
}

/// Everything a delivery needs, shared by all handlers.
pub struct WebhookState {
    kind: PlatformKind,
    secret: String,
    fetcher: Arc<dyn ChangeFetcher>,
    poster: Arc<dyn CommentPoster>,
    orchestrator: Arc<ReviewOrchestrator>,
}

impl WebhookState {
    pub fn new(
        kind: PlatformKind,
        secret: impl Into<String>,
        fetcher: Arc<dyn ChangeFetcher>,
        poster: Arc<dyn CommentPoster>,
        orchestrator: Arc<ReviewOrchestrator>,
    ) -> Self {
        Self {
            kind,
            secret: secret.into(),
            fetcher,
            poster,
            orchestrator,
        }
    }

    /// Build the review request for `key` from the host's file listing.
    async fn load_request(&self, key: &RequestKey) -> Result<ReviewRequest, WebhookError> {
        let changes = self.fetcher.fetch_changes(key).await?;
        Ok(ReviewRequest::new(
            key.source.clone(),
            key.project.clone(),
            key.number,
            changes,
        )?)
    }
}

/// Routes for the webhook service.
pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<WebhookState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    "OK"
}

async fn handle_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let credential = headers
        .get(event::auth_header(state.kind))
        .and_then(|v| v.to_str().ok());
    if let Err(e) = event::authenticate(state.kind, &state.secret, credential, &body) {
        warn!(error = %e, "rejected webhook delivery");
        return (StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    match event::parse(state.kind, &body) {
        Ok(WebhookEvent::Review(key)) => {
            info!(request = %key, "review queued");
            tokio::spawn(process_review(state.clone(), key));
            (StatusCode::ACCEPTED, "Accepted")
        }
        Ok(WebhookEvent::Ignored(reason)) => {
            debug!(%reason, "webhook delivery ignored");
            (StatusCode::OK, "OK")
        }
        Err(e) => {
            warn!(error = %e, "malformed webhook delivery");
            (StatusCode::BAD_REQUEST, "Bad Request")
        }
    }
}

/// Fetch, review and post the report for one request. Failures are logged.
pub async fn process_review(state: Arc<WebhookState>, key: RequestKey) {
    let request = match state.load_request(&key).await {
        Ok(request) => request,
        Err(e) => {
            error!(request = %key, error = %e, "cannot review request");
            return;
        }
    };

    let report = state.orchestrator.review_request(&request).await;
    match state.poster.post_comment(&key, &report.render()).await {
        Ok(()) => info!(request = %key, errors = report.error_count(), "report posted"),
        Err(e) => error!(request = %key, error = %e, "failed to post review report"),
    }
}
