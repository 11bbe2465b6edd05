//! Shared types used across all modules.
//!
//! This module defines the request, policy and outcome data structures.
//! Other modules import from here rather than reaching into each other's
//! internals.

pub mod outcome;
pub mod policy;
pub mod request;

pub use outcome::{ReviewOutcome, SkipReason};
pub use policy::{PolicyError, ReviewPolicy};
pub use request::{FileChange, FileStatus, RequestKey, ReviewRequest, ValidationError};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported language-model backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
    #[serde(rename = "deepseek")]
    DeepSeek,
    Groq,
    /// Any OpenAI-compatible API (e.g. Together, vLLM, local servers).
    #[serde(rename = "openai-compatible")]
    OpenAICompatible,
    /// A locally hosted Ollama server.
    Ollama,
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayKind::Anthropic => write!(f, "anthropic"),
            GatewayKind::OpenAI => write!(f, "openai"),
            GatewayKind::Gemini => write!(f, "gemini"),
            GatewayKind::DeepSeek => write!(f, "deepseek"),
            GatewayKind::Groq => write!(f, "groq"),
            GatewayKind::OpenAICompatible => write!(f, "openai-compatible"),
            GatewayKind::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for GatewayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(GatewayKind::Anthropic),
            "openai" => Ok(GatewayKind::OpenAI),
            "gemini" => Ok(GatewayKind::Gemini),
            "deepseek" => Ok(GatewayKind::DeepSeek),
            "groq" => Ok(GatewayKind::Groq),
            "openai-compatible" => Ok(GatewayKind::OpenAICompatible),
            "ollama" => Ok(GatewayKind::Ollama),
            other => Err(format!(
                "unsupported gateway: '{other}'. Supported: anthropic, openai, gemini, \
                 deepseek, groq, openai-compatible, ollama"
            )),
        }
    }
}

impl GatewayKind {
    /// Provider-specific environment variable holding the API key, if the
    /// backend needs one.
    pub fn api_key_env_var(self) -> Option<&'static str> {
        match self {
            GatewayKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            GatewayKind::OpenAI | GatewayKind::OpenAICompatible => Some("OPENAI_API_KEY"),
            GatewayKind::Gemini => Some("GEMINI_API_KEY"),
            GatewayKind::DeepSeek => Some("DEEPSEEK_API_KEY"),
            GatewayKind::Groq => Some("GROQ_API_KEY"),
            GatewayKind::Ollama => None,
        }
    }
}

/// Supported source-control hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformKind::GitHub => write!(f, "github"),
            PlatformKind::GitLab => write!(f, "gitlab"),
        }
    }
}

impl std::str::FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github" => Ok(PlatformKind::GitHub),
            "gitlab" => Ok(PlatformKind::GitLab),
            other => Err(format!(
                "unsupported platform: '{other}'. Supported: github, gitlab"
            )),
        }
    }
}

const GITHUB_TOKEN_PREFIXES: &[&str] = &["ghp_", "github_pat_", "gho_", "ghu_", "ghs_", "ghr_"];
const GITLAB_TOKEN_PREFIXES: &[&str] = &["glpat-", "gloas-", "glgat-", "gldt-", "glagent-"];

impl PlatformKind {
    /// Guess the host from its URL, falling back to the token's prefix.
    pub fn detect(url: &str, token: &str) -> Option<Self> {
        let url = url.to_lowercase();
        if url.contains("github") {
            return Some(PlatformKind::GitHub);
        }
        if url.contains("gitlab") {
            return Some(PlatformKind::GitLab);
        }
        if GITHUB_TOKEN_PREFIXES.iter().any(|p| token.starts_with(p)) {
            return Some(PlatformKind::GitHub);
        }
        if GITLAB_TOKEN_PREFIXES.iter().any(|p| token.starts_with(p)) {
            return Some(PlatformKind::GitLab);
        }
        None
    }
}
