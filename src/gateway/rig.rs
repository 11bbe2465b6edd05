//! rig-core integration for cloud completion APIs.
//!
//! Uses rig-core's provider clients and Agent abstraction for multi-provider
//! support: Anthropic, OpenAI, Gemini, DeepSeek, Groq, and any
//! OpenAI-compatible API. Batches use the default concurrent fan-out.

use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers;

use crate::config::GatewayConfig;
use crate::models::GatewayKind;

use super::{GatewayError, LanguageModelGateway};

/// Maximum tokens per completion response.
const MAX_TOKENS: u64 = 4096;

/// Build a single-turn agent from a rig-core client and prompt it.
///
/// Always sets `max_tokens`: Anthropic requires it and some providers
/// (e.g. Gemini) otherwise default to a low limit that truncates reviews.
macro_rules! prompt_once {
    ($client:expr, $model:expr, $temperature:expr, $prompt:expr, $label:expr) => {{
        let agent = $client
            .agent($model)
            .temperature($temperature)
            .max_tokens(MAX_TOKENS)
            .build();
        agent
            .prompt($prompt)
            .await
            .map_err(|e| GatewayError::Backend(format!("{} API error: {e}", $label)))
    }};
}

/// Create a rig-core client using the `Client::new(api_key)` convention.
macro_rules! new_client {
    ($provider_mod:path, $api_key:expr, $label:expr) => {{
        <$provider_mod>::new($api_key).map_err(|e| {
            GatewayError::NotConfigured(format!("failed to create {} client: {e}", $label))
        })
    }};
}

/// rig-core based gateway.
///
/// The gateway kind in config selects which rig-core provider to use.
pub struct RigGateway {
    config: GatewayConfig,
}

impl RigGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        if config.kind == GatewayKind::Ollama {
            return Err(GatewayError::NotConfigured(
                "ollama is served by the Ollama gateway, not rig".to_string(),
            ));
        }
        if config.api_key.is_none() {
            let hint = config
                .kind
                .api_key_env_var()
                .map(|var| format!(" or {var}"))
                .unwrap_or_default();
            return Err(GatewayError::NotConfigured(format!(
                "no API key found for gateway '{}'. Set {}{hint}.",
                config.kind,
                crate::constants::ENV_API_KEY
            )));
        }
        if config.kind == GatewayKind::OpenAICompatible && config.base_url.is_none() {
            return Err(GatewayError::NotConfigured(
                "openai-compatible gateway requires base_url to be set".to_string(),
            ));
        }
        Ok(Self { config })
    }

    fn api_key(&self) -> Result<&str, GatewayError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| GatewayError::NotConfigured("missing API key".to_string()))
    }

    /// Build an OpenAI-style client, optionally with a custom base URL.
    fn build_openai_client(
        &self,
        api_key: &str,
        label: &str,
    ) -> Result<providers::openai::CompletionsClient, GatewayError> {
        let mut builder = providers::openai::CompletionsClient::builder().api_key(api_key);
        if let Some(ref base_url) = self.config.base_url {
            builder = builder.base_url(base_url);
        }
        let client: providers::openai::CompletionsClient = builder.build().map_err(|e| {
            GatewayError::NotConfigured(format!("failed to create {label} client: {e}"))
        })?;
        Ok(client)
    }

    /// Make a completion call through rig-core and return the raw response text.
    async fn call_rig(&self, prompt: &str) -> Result<String, GatewayError> {
        let api_key = self.api_key()?;
        let model = self.config.model.as_str();
        let temperature = self.config.temperature;

        match self.config.kind {
            GatewayKind::Anthropic => {
                let client: providers::anthropic::Client = providers::anthropic::Client::builder()
                    .api_key(api_key)
                    .build()
                    .map_err(|e| {
                        GatewayError::NotConfigured(format!(
                            "failed to create Anthropic client: {e}"
                        ))
                    })?;
                prompt_once!(client, model, temperature, prompt, "Anthropic")
            }
            GatewayKind::OpenAI => {
                let client = self.build_openai_client(api_key, "OpenAI")?;
                prompt_once!(client, model, temperature, prompt, "OpenAI")
            }
            GatewayKind::OpenAICompatible => {
                let client = self.build_openai_client(api_key, "OpenAI-compatible")?;
                prompt_once!(client, model, temperature, prompt, "OpenAI-compatible")
            }
            GatewayKind::Gemini => {
                let client = new_client!(providers::gemini::Client, api_key, "Gemini")?;
                prompt_once!(client, model, temperature, prompt, "Gemini")
            }
            GatewayKind::DeepSeek => {
                let client = new_client!(providers::deepseek::Client, api_key, "DeepSeek")?;
                prompt_once!(client, model, temperature, prompt, "DeepSeek")
            }
            GatewayKind::Groq => {
                let client = new_client!(providers::groq::Client, api_key, "Groq")?;
                prompt_once!(client, model, temperature, prompt, "Groq")
            }
            GatewayKind::Ollama => Err(GatewayError::NotConfigured(
                "ollama is served by the Ollama gateway, not rig".to_string(),
            )),
        }
    }
}

#[async_trait]
impl LanguageModelGateway for RigGateway {
    async fn generate_one(&self, prompt: &str, timeout: Duration) -> Result<String, GatewayError> {
        tokio::time::timeout(timeout, self.call_rig(prompt))
            .await
            .map_err(|_| GatewayError::Timeout(timeout))?
    }
}
