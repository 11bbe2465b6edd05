//! Best-effort interim notifications.
//!
//! Delivery failures are logged and swallowed; a review never fails
//! because a greeting could not be posted.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::models::ReviewRequest;
use crate::platform::CommentPoster;

/// Sends interim messages to a request's conversation, if a poster exists.
#[derive(Clone, Default)]
pub struct NotificationSink {
    poster: Option<Arc<dyn CommentPoster>>,
}

impl NotificationSink {
    pub fn new(poster: Arc<dyn CommentPoster>) -> Self {
        Self {
            poster: Some(poster),
        }
    }

    /// A sink that drops every message.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn from_poster(poster: Option<Arc<dyn CommentPoster>>) -> Self {
        Self { poster }
    }

    pub async fn post_message(&self, request: &ReviewRequest, text: &str) {
        let key = request.key();
        let Some(poster) = &self.poster else {
            debug!(request = %key, "no platform configured, notification dropped");
            return;
        };
        if let Err(e) = poster.post_comment(&key, text).await {
            warn!(request = %key, error = %e, "failed to post notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestKey;
    use crate::platform::PlatformError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPoster {
        posted: Mutex<Vec<(RequestKey, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl CommentPoster for RecordingPoster {
        async fn post_comment(&self, key: &RequestKey, body: &str) -> Result<(), PlatformError> {
            self.posted
                .lock()
                .unwrap()
                .push((key.clone(), body.to_string()));
            if self.fail {
                Err(PlatformError::Api("HTTP 500".into()))
            } else {
                Ok(())
            }
        }
    }

    fn request() -> ReviewRequest {
        ReviewRequest::new("octo", "widgets", 3, vec![]).unwrap()
    }

    #[tokio::test]
    async fn delivers_to_poster() {
        let poster = Arc::new(RecordingPoster::default());
        let sink = NotificationSink::new(poster.clone());
        sink.post_message(&request(), "hi").await;

        let posted = poster.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0.to_string(), "octo/widgets#3");
        assert_eq!(posted[0].1, "hi");
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let poster = Arc::new(RecordingPoster {
            fail: true,
            ..RecordingPoster::default()
        });
        let sink = NotificationSink::new(poster.clone());
        sink.post_message(&request(), "hi").await;
        assert_eq!(poster.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn disabled_sink_is_a_no_op() {
        NotificationSink::disabled()
            .post_message(&request(), "hi")
            .await;
    }
}
