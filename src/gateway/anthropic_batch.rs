//! Anthropic Message Batches gateway.
//!
//! Submits every prompt of a review as one provider-side batch job, polls
//! until processing ends, then matches results back to prompts by their
//! `custom_id` (the prompt's index). Single prompts go through the regular
//! Messages endpoint.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::config::GatewayConfig;

use super::{BatchItem, GatewayError, LanguageModelGateway, http_status_error, transport_error};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const LABEL: &str = "Anthropic";

#[derive(Serialize)]
struct MessageParams<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: [UserMessage<'a>; 1],
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct BatchRequestItem<'a> {
    custom_id: String,
    params: MessageParams<'a>,
}

#[derive(Serialize)]
struct CreateBatch<'a> {
    requests: Vec<BatchRequestItem<'a>>,
}

#[derive(Deserialize)]
struct BatchStatus {
    id: String,
    processing_status: String,
    #[serde(default)]
    results_url: Option<String>,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl Message {
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Deserialize)]
struct ResultLine {
    custom_id: String,
    result: BatchResult,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum BatchResult {
    Succeeded { message: Message },
    Errored { error: serde_json::Value },
    Canceled,
    Expired,
}

impl BatchResult {
    fn into_item(self) -> BatchItem {
        match self {
            BatchResult::Succeeded { message } => Ok(message.text()),
            BatchResult::Errored { error } => {
                let detail = error.to_string();
                if detail.contains("rate_limit") {
                    Err(GatewayError::RateLimited(format!("{LABEL} batch item failed: {detail}")))
                } else {
                    Err(GatewayError::Backend(format!("{LABEL} batch item failed: {detail}")))
                }
            }
            BatchResult::Canceled => Err(GatewayError::Backend(format!(
                "{LABEL} batch item was canceled"
            ))),
            BatchResult::Expired => Err(GatewayError::Backend(format!(
                "{LABEL} batch item expired"
            ))),
        }
    }
}

pub struct AnthropicBatchGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    poll_interval: Duration,
}

impl AnthropicBatchGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            GatewayError::NotConfigured(format!(
                "no API key found for native batching. Set {} or ANTHROPIC_API_KEY.",
                crate::constants::ENV_API_KEY
            ))
        })?;
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            poll_interval: Duration::from_secs(1),
        })
    }

    /// Override how often the batch status is polled.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn params<'a>(&'a self, prompt: &'a str) -> MessageParams<'a> {
        MessageParams {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: self.temperature,
            messages: [UserMessage {
                role: "user",
                content: prompt,
            }],
        }
    }

    fn request(&self, method: reqwest::Method, url: &str, timeout: Duration) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .timeout(timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    /// Send a request and fail on any non-success status.
    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(LABEL, e, timeout))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(http_status_error(LABEL, status, &body));
        }
        Ok(response)
    }

    /// Time left before `deadline`, or a timeout error once it has passed.
    fn remaining(deadline: Instant, timeout: Duration) -> Result<Duration, GatewayError> {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            Err(GatewayError::Timeout(timeout))
        } else {
            Ok(left)
        }
    }

    async fn fetch_results(
        &self,
        url: &str,
        count: usize,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<Vec<BatchItem>, GatewayError> {
        let left = Self::remaining(deadline, timeout)?;
        let response = self
            .send(self.request(reqwest::Method::GET, url, left), timeout)
            .await?;
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(LABEL, e, timeout))?;

        let mut by_id: HashMap<String, BatchItem> = HashMap::new();
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let parsed: ResultLine = serde_json::from_str(line).map_err(|e| {
                GatewayError::Backend(format!("{LABEL} returned an unreadable batch result: {e}"))
            })?;
            by_id.insert(parsed.custom_id, parsed.result.into_item());
        }

        Ok((0..count)
            .map(|idx| {
                by_id.remove(&idx.to_string()).unwrap_or_else(|| {
                    Err(GatewayError::Backend(format!(
                        "no result returned for prompt {idx}"
                    )))
                })
            })
            .collect())
    }
}

#[async_trait]
impl LanguageModelGateway for AnthropicBatchGateway {
    async fn generate_one(&self, prompt: &str, timeout: Duration) -> Result<String, GatewayError> {
        let url = format!("{}/v1/messages", self.base_url);
        let builder = self
            .request(reqwest::Method::POST, &url, timeout)
            .json(&self.params(prompt));
        let response = self.send(builder, timeout).await?;
        let message: Message = response
            .json()
            .await
            .map_err(|e| transport_error(LABEL, e, timeout))?;
        Ok(message.text())
    }

    async fn generate_batch(
        &self,
        prompts: &[String],
        timeout: Duration,
    ) -> Result<Vec<BatchItem>, GatewayError> {
        if prompts.is_empty() {
            return Ok(Vec::new());
        }
        let deadline = Instant::now() + timeout;

        let payload = CreateBatch {
            requests: prompts
                .iter()
                .enumerate()
                .map(|(idx, prompt)| BatchRequestItem {
                    custom_id: idx.to_string(),
                    params: self.params(prompt),
                })
                .collect(),
        };
        let url = format!("{}/v1/messages/batches", self.base_url);
        let builder = self
            .request(reqwest::Method::POST, &url, timeout)
            .json(&payload);
        let mut batch: BatchStatus = self
            .send(builder, timeout)
            .await?
            .json()
            .await
            .map_err(|e| transport_error(LABEL, e, timeout))?;
        debug!(batch_id = %batch.id, prompts = prompts.len(), "submitted batch");

        while batch.processing_status != "ended" {
            let left = Self::remaining(deadline, timeout)?;
            tokio::time::sleep(self.poll_interval.min(left)).await;
            let left = Self::remaining(deadline, timeout)?;

            let status_url = format!("{}/v1/messages/batches/{}", self.base_url, batch.id);
            batch = self
                .send(self.request(reqwest::Method::GET, &status_url, left), timeout)
                .await?
                .json()
                .await
                .map_err(|e| transport_error(LABEL, e, timeout))?;
            debug!(batch_id = %batch.id, status = %batch.processing_status, "polled batch");
        }

        let results_url = batch.results_url.ok_or_else(|| {
            GatewayError::Backend(format!("{LABEL} batch {} ended without results", batch.id))
        })?;
        self.fetch_results(&results_url, prompts.len(), deadline, timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn gateway(base_url: &str) -> AnthropicBatchGateway {
        let config = GatewayConfig {
            base_url: Some(base_url.to_string()),
            api_key: Some("sk-ant-test".to_string()),
            native_batch: true,
            ..GatewayConfig::default()
        };
        AnthropicBatchGateway::new(&config)
            .unwrap()
            .with_poll_interval(Duration::from_millis(10))
    }

    fn prompts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn requires_api_key() {
        let err = AnthropicBatchGateway::new(&GatewayConfig::default())
            .err()
            .expect("missing key should fail");
        assert!(matches!(err, GatewayError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn generate_one_joins_text_blocks() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_body(
                r#"{"content":[{"type":"text","text":"first"},{"type":"tool_use","id":"x"},{"type":"text","text":"second"}]}"#,
            )
            .create_async()
            .await;

        let text = gateway(&server.url())
            .generate_one("hi", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "first\nsecond");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn batch_results_follow_prompt_order() {
        let mut server = Server::new_async().await;
        let results_url = format!("{}/results/batch_1", server.url());

        let create = server
            .mock("POST", "/v1/messages/batches")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""custom_id":"0""#.to_string()),
                Matcher::Regex(r#""custom_id":"2""#.to_string()),
                Matcher::Regex(r#""max_tokens":4096"#.to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"id":"batch_1","processing_status":"in_progress"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/v1/messages/batches/batch_1")
            .with_status(200)
            .with_body(format!(
                r#"{{"id":"batch_1","processing_status":"ended","results_url":"{results_url}"}}"#
            ))
            .create_async()
            .await;
        // Results arrive out of order; prompt 1 has none at all.
        server
            .mock("GET", "/results/batch_1")
            .with_status(200)
            .with_body(concat!(
                r#"{"custom_id":"2","result":{"type":"errored","error":{"type":"error","error":{"type":"overloaded_error"}}}}"#,
                "\n",
                r#"{"custom_id":"0","result":{"type":"succeeded","message":{"content":[{"type":"text","text":"review a"}]}}}"#,
                "\n",
            ))
            .create_async()
            .await;

        let results = gateway(&server.url())
            .generate_batch(&prompts(&["a", "b", "c"]), Duration::from_secs(5))
            .await
            .unwrap();

        create.assert_async().await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_deref(), Ok("review a"));
        assert_eq!(
            results[1],
            Err(GatewayError::Backend("no result returned for prompt 1".into()))
        );
        assert!(matches!(&results[2], Err(GatewayError::Backend(msg)) if msg.contains("overloaded_error")));
    }

    #[tokio::test]
    async fn rate_limited_item_is_flagged() {
        let mut server = Server::new_async().await;
        let results_url = format!("{}/results/batch_2", server.url());
        server
            .mock("POST", "/v1/messages/batches")
            .with_status(200)
            .with_body(format!(
                r#"{{"id":"batch_2","processing_status":"ended","results_url":"{results_url}"}}"#
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/results/batch_2")
            .with_status(200)
            .with_body(
                r#"{"custom_id":"0","result":{"type":"errored","error":{"type":"error","error":{"type":"rate_limit_error"}}}}"#,
            )
            .create_async()
            .await;

        let results = gateway(&server.url())
            .generate_batch(&prompts(&["a"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(results[0].as_ref().unwrap_err().is_rate_limited());
    }

    #[tokio::test]
    async fn batch_times_out_while_processing() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/messages/batches")
            .with_status(200)
            .with_body(r#"{"id":"batch_3","processing_status":"in_progress"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/v1/messages/batches/batch_3")
            .with_status(200)
            .with_body(r#"{"id":"batch_3","processing_status":"in_progress"}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let err = gateway(&server.url())
            .generate_batch(&prompts(&["a"]), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn empty_batch_makes_no_requests() {
        let results = gateway("http://127.0.0.1:9")
            .generate_batch(&[], Duration::from_secs(1))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn submit_failure_fails_whole_batch() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/messages/batches")
            .with_status(429)
            .with_body(r#"{"type":"error","error":{"type":"rate_limit_error"}}"#)
            .create_async()
            .await;

        let err = gateway(&server.url())
            .generate_batch(&prompts(&["a", "b"]), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }
}
