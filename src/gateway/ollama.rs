//! Ollama gateway for locally hosted models.
//!
//! Talks to the non-streaming `/api/generate` endpoint. No API key is needed.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;

use super::{GatewayError, LanguageModelGateway, http_status_error, transport_error};

const DEFAULT_HOST: &str = "http://localhost:11434";
const LABEL: &str = "Ollama";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaGateway {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f64,
}

impl OllamaGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        if config.model.trim().is_empty() {
            return Err(GatewayError::NotConfigured(
                "ollama gateway requires a model name".to_string(),
            ));
        }
        let host = config.base_url.as_deref().unwrap_or(DEFAULT_HOST);
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/generate", host.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LanguageModelGateway for OllamaGateway {
    async fn generate_one(&self, prompt: &str, timeout: Duration) -> Result<String, GatewayError> {
        let payload = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&payload)
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

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| transport_error(LABEL, e, timeout))?;
        Ok(parsed.response)
    }
}
