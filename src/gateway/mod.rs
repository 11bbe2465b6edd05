//! Language-model gateway: the capability the orchestrator reviews through.
//!
//! A gateway generates one completion, or many. Backends without native
//! batching get an order-preserving concurrent fan-out for free; backends
//! with provider-side batch jobs override [`LanguageModelGateway::generate_batch`].

pub mod anthropic_batch;
pub mod ollama;
pub mod rig;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::models::GatewayKind;

pub use self::anthropic_batch::AnthropicBatchGateway;
pub use self::ollama::OllamaGateway;
pub use self::rig::RigGateway;

/// Maximum number of concurrent `generate_one` calls in the default batch fan-out.
pub const DEFAULT_FAN_OUT: usize = 8;

/// Errors from a gateway call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("generation timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("{0}")]
    Backend(String),

    #[error("gateway not configured: {0}")]
    NotConfigured(String),
}

impl GatewayError {
    /// Whether the provider reported a "too many requests" condition.
    ///
    /// Backends that surface HTTP errors only as text are matched on the
    /// status code and the usual phrasing.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            GatewayError::RateLimited(_) => true,
            GatewayError::Backend(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("429")
                    || msg_lower.contains("rate limit")
                    || msg_lower.contains("too many requests")
            }
            GatewayError::Timeout(_) | GatewayError::NotConfigured(_) => false,
        }
    }
}

/// Map a non-success HTTP response to a gateway error.
pub(crate) fn http_status_error(label: &str, status: reqwest::StatusCode, body: &str) -> GatewayError {
    let message = format!("{label} returned HTTP {status}: {body}");
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        GatewayError::RateLimited(message)
    } else {
        GatewayError::Backend(message)
    }
}

/// Map a transport error, keeping timeouts distinct.
pub(crate) fn transport_error(label: &str, err: reqwest::Error, timeout: Duration) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(timeout)
    } else {
        GatewayError::Backend(format!("{label} request failed: {err}"))
    }
}

/// Result of one prompt within a batch.
pub type BatchItem = Result<String, GatewayError>;

/// Trait for language-model completion backends.
#[async_trait]
pub trait LanguageModelGateway: Send + Sync {
    /// Generate one completion, failing with [`GatewayError::Timeout`] when
    /// no response arrives within `timeout`.
    async fn generate_one(&self, prompt: &str, timeout: Duration) -> Result<String, GatewayError>;

    /// Generate a completion for every prompt.
    ///
    /// The returned items match `prompts` position for position. An outer
    /// error means the batch as a whole failed (e.g. a batch job deadline).
    async fn generate_batch(
        &self,
        prompts: &[String],
        timeout: Duration,
    ) -> Result<Vec<BatchItem>, GatewayError> {
        let futures: Vec<_> = prompts
            .iter()
            .map(|prompt| self.generate_one(prompt, timeout))
            .collect();
        let results = stream::iter(futures)
            .buffered(DEFAULT_FAN_OUT)
            .collect::<Vec<_>>()
            .await;
        Ok(results)
    }
}

/// Build the gateway selected by configuration.
pub fn build_gateway(config: &GatewayConfig) -> Result<Arc<dyn LanguageModelGateway>, GatewayError> {
    match config.kind {
        GatewayKind::Ollama => Ok(Arc::new(OllamaGateway::new(config)?)),
        GatewayKind::Anthropic if config.native_batch => {
            Ok(Arc::new(AnthropicBatchGateway::new(config)?))
        }
        _ => {
            if config.native_batch {
                tracing::warn!(
                    gateway = %config.kind,
                    "native batching is only supported for anthropic; using concurrent requests"
                );
            }
            Ok(Arc::new(RigGateway::new(config.clone())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn rate_limit_variant() {
        assert!(GatewayError::RateLimited("slow down".into()).is_rate_limited());
    }

    #[test]
    fn rate_limit_from_backend_text() {
        assert!(
            GatewayError::Backend(
                "Gemini API error: HttpError: Invalid status code 429 Too Many Requests".into()
            )
            .is_rate_limited()
        );
        assert!(GatewayError::Backend("rate limit exceeded".into()).is_rate_limited());
    }

    #[test]
    fn not_rate_limited() {
        assert!(!GatewayError::Backend("401 Unauthorized".into()).is_rate_limited());
        assert!(!GatewayError::Timeout(Duration::from_secs(5)).is_rate_limited());
        assert!(!GatewayError::NotConfigured("missing key".into()).is_rate_limited());
    }

    #[test]
    fn timeout_message() {
        let err = GatewayError::Timeout(Duration::from_secs(300));
        assert_eq!(err.to_string(), "generation timed out after 300 seconds");
    }

    #[test]
    fn http_429_is_rate_limited() {
        let err = http_status_error("Ollama", reqwest::StatusCode::TOO_MANY_REQUESTS, "busy");
        assert!(matches!(err, GatewayError::RateLimited(_)));
        let err = http_status_error("Ollama", reqwest::StatusCode::BAD_GATEWAY, "down");
        assert_eq!(err.to_string(), "Ollama returned HTTP 502 Bad Gateway: down");
    }

    /// Echoes prompts back, completing later prompts first.
    struct EchoGateway {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModelGateway for EchoGateway {
        async fn generate_one(&self, prompt: &str, _timeout: Duration) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = 50u64.saturating_sub(prompt.len() as u64 * 10);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if prompt == "fail" {
                return Err(GatewayError::Backend("boom".into()));
            }
            Ok(format!("echo:{prompt}"))
        }
    }

    #[tokio::test]
    async fn default_batch_preserves_order() {
        let gateway = EchoGateway {
            calls: AtomicUsize::new(0),
        };
        let prompts: Vec<String> = ["a", "bb", "fail", "dddd"].iter().map(|s| s.to_string()).collect();
        let results = gateway
            .generate_batch(&prompts, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(gateway.calls.load(Ordering::SeqCst), 4);
        assert_eq!(results[0].as_deref(), Ok("echo:a"));
        assert_eq!(results[1].as_deref(), Ok("echo:bb"));
        assert_eq!(results[2], Err(GatewayError::Backend("boom".into())));
        assert_eq!(results[3].as_deref(), Ok("echo:dddd"));
    }

    #[tokio::test]
    async fn default_batch_of_nothing() {
        let gateway = EchoGateway {
            calls: AtomicUsize::new(0),
        };
        let results = gateway.generate_batch(&[], Duration::from_secs(1)).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    /// Tracks how many calls are in flight at once.
    struct CountingGateway {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModelGateway for CountingGateway {
        async fn generate_one(&self, prompt: &str, _timeout: Duration) -> Result<String, GatewayError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(prompt.to_uppercase())
        }
    }

    #[tokio::test]
    async fn default_batch_runs_on_spawned_task_with_bounded_fan_out() {
        let gateway = Arc::new(CountingGateway {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let prompts: Vec<String> = (0..20).map(|i| format!("p{i}")).collect();

        let task_gateway = gateway.clone();
        let results = tokio::spawn(async move {
            task_gateway
                .generate_batch(&prompts, Duration::from_secs(1))
                .await
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(results.len(), 20);
        assert_eq!(results[0].as_deref(), Ok("P0"));
        assert_eq!(results[19].as_deref(), Ok("P19"));
        let peak = gateway.peak.load(Ordering::SeqCst);
        assert!(peak >= 1 && peak <= DEFAULT_FAN_OUT, "peak was {peak}");
    }

    #[test]
    fn build_gateway_requires_api_key_for_cloud() {
        let config = GatewayConfig::default();
        let err = build_gateway(&config).err().expect("missing key should fail");
        assert!(matches!(err, GatewayError::NotConfigured(_)));
    }

    #[test]
    fn build_gateway_ollama_needs_no_key() {
        let config = GatewayConfig {
            kind: GatewayKind::Ollama,
            model: "codellama:7b".into(),
            ..GatewayConfig::default()
        };
        assert!(build_gateway(&config).is_ok());
    }

    #[test]
    fn build_gateway_native_batch() {
        let config = GatewayConfig {
            api_key: Some("sk-ant".into()),
            native_batch: true,
            ..GatewayConfig::default()
        };
        assert!(build_gateway(&config).is_ok());
    }
}
