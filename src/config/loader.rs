//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.patchpilot.toml` in the working directory
//! 4. `~/.config/patchpilot/config.toml`, or `$PATCHPILOT_CONFIG_DIR/config.toml` (global defaults)
//! 5. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::constants;
use crate::env::{Env, Parsed};
use crate::models::{GatewayKind, PlatformKind, PolicyError, ReviewPolicy};

/// Placeholder shown instead of secrets.
const REDACTED: &str = "[REDACTED]";

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to combine config files: {0}")]
    Merge(toml::de::Error),

    #[error("invalid review policy: {0}")]
    Policy(#[from] PolicyError),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub review: ReviewConfig,
    pub gateway: GatewayConfig,
    pub platform: PlatformConfig,
    pub server: ServerConfig,
}

/// Review policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub prompt: String,
    pub maximum_files: usize,
    pub maximum_file_size_characters: usize,
    pub blocked_path_keywords: Vec<String>,
    pub maximum_retries: u32,
    pub retry_backoff_seconds: u64,
    /// Seconds between "still reviewing" notes while a generation runs; 0 disables them.
    pub progress_interval_seconds: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            prompt: constants::DEFAULT_REVIEW_PROMPT.to_string(),
            maximum_files: 1000,
            maximum_file_size_characters: 10_000,
            blocked_path_keywords: Vec::new(),
            maximum_retries: 3,
            retry_backoff_seconds: 30,
            progress_interval_seconds: 420,
        }
    }
}

/// Language-model backend settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub kind: GatewayKind,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub timeout_seconds: u64,
    /// Submit reviews as one provider-side batch job (Anthropic only).
    pub native_batch: bool,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| REDACTED))
            .field("temperature", &self.temperature)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("native_batch", &self.native_batch)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: GatewayKind::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.3,
            timeout_seconds: 300,
            native_batch: false,
        }
    }
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Source-control host settings.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Explicit host kind; detected from `url` and `token` when absent.
    pub kind: Option<PlatformKind>,
    pub url: Option<String>,
    pub token: Option<String>,
    /// Shared secret for inbound webhooks (GitHub HMAC key, GitLab token).
    pub webhook_secret: Option<String>,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("kind", &self.kind)
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| REDACTED))
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| REDACTED))
            .finish()
    }
}

impl PlatformConfig {
    /// The configured kind, or one detected from URL and token.
    pub fn resolved_kind(&self) -> Option<PlatformKind> {
        self.kind.or_else(|| {
            PlatformKind::detect(
                self.url.as_deref().unwrap_or_default(),
                self.token.as_deref().unwrap_or_default(),
            )
        })
    }
}

/// Webhook server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address `serve` binds to.
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: constants::DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads from global config, the working-directory config, then
    /// applies environment variable overrides.
    pub fn load(work_dir: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut files = Vec::new();
        if let Some(global_path) = Self::global_config_path(env) {
            files.push(global_path);
        }
        if let Some(dir) = work_dir {
            files.push(dir.join(constants::CONFIG_FILENAME));
        }

        let mut config = Self::load_layers(&files)?;
        config.apply_env_vars(env);

        Ok(config)
    }

    /// Build the review policy described by this config.
    pub fn policy(&self) -> Result<ReviewPolicy, ConfigError> {
        let review = &self.review;
        let policy = ReviewPolicy::new(
            review.prompt.clone(),
            review.maximum_files,
            review.maximum_file_size_characters,
        )?
        .with_blocked_path_keywords(&review.blocked_path_keywords)
        .with_retries(review.maximum_retries, review.retry_backoff_seconds)
        .with_progress_interval(
            (review.progress_interval_seconds > 0)
                .then(|| Duration::from_secs(review.progress_interval_seconds)),
        )
        .with_generation_timeout(self.gateway.timeout())?;
        Ok(policy)
    }

    /// A copy with API keys and tokens masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.gateway.api_key.is_some() {
            copy.gateway.api_key = Some(REDACTED.to_string());
        }
        if copy.platform.token.is_some() {
            copy.platform.token = Some(REDACTED.to_string());
        }
        if copy.platform.webhook_secret.is_some() {
            copy.platform.webhook_secret = Some(REDACTED.to_string());
        }
        copy
    }

    /// Layer config files in order, skipping missing ones.
    ///
    /// Keys present in a later file win even when they restate a default,
    /// so a local file can switch a global `native_batch = true` back off.
    fn load_layers(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        for path in paths.iter().filter(|p| p.exists()) {
            overlay(&mut merged, Self::load_table(path)?);
        }
        toml::Value::Table(merged)
            .try_into()
            .map_err(ConfigError::Merge)
    }

    /// Read one config file as a raw table, type-checked against [`Config`]
    /// so errors name the offending file.
    fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str::<Config>(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn global_config_path(env: &Env) -> Option<PathBuf> {
        env.var(constants::ENV_CONFIG_DIR)
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join(constants::CONFIG_DIR)))
            .map(|d| d.join("config.toml"))
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        if let Some(val) = env.var(constants::ENV_GATEWAY) {
            match val.parse::<GatewayKind>() {
                Ok(kind) => self.gateway.kind = kind,
                Err(_) => warn!(var = constants::ENV_GATEWAY, value = %val, "ignoring invalid value"),
            }
        }
        if let Some(val) = env.var(constants::ENV_MODEL) {
            self.gateway.model = val;
        }
        if let Some(val) = env.var(constants::ENV_BASE_URL) {
            self.gateway.base_url = Some(val);
        }

        // Provider-specific API key resolution
        let api_key = env.var(constants::ENV_API_KEY).or_else(|| {
            self.gateway
                .kind
                .api_key_env_var()
                .and_then(|name| env.var(name))
        });
        if api_key.is_some() {
            self.gateway.api_key = api_key;
        }

        if let Some(val) = env.var(constants::ENV_PLATFORM_URL) {
            self.platform.url = Some(val);
        }
        if let Some(val) = env.var(constants::ENV_PLATFORM_TOKEN) {
            self.platform.token = Some(val);
        }
        if let Some(val) = env.var(constants::ENV_WEBHOOK_SECRET) {
            self.platform.webhook_secret = Some(val);
        }
        if let Some(val) = env.var(constants::ENV_LISTEN) {
            self.server.listen = val;
        }

        match env.parse::<usize>(constants::ENV_MAX_FILES) {
            Parsed::Value(n) => self.review.maximum_files = n,
            Parsed::Invalid(raw) => {
                warn!(var = constants::ENV_MAX_FILES, value = %raw, "ignoring invalid value")
            }
            Parsed::Absent => {}
        }
        match env.parse::<usize>(constants::ENV_MAX_FILE_SIZE) {
            Parsed::Value(n) => self.review.maximum_file_size_characters = n,
            Parsed::Invalid(raw) => {
                warn!(var = constants::ENV_MAX_FILE_SIZE, value = %raw, "ignoring invalid value")
            }
            Parsed::Absent => {}
        }
        if let Some(val) = env.var(constants::ENV_REVIEW_PROMPT) {
            self.review.prompt = val;
        }
    }
}

/// Recursively copy `layer` onto `base`; nested tables merge key by key.
fn overlay(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                overlay(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}
