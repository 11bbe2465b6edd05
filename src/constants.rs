//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! and the fixed report texts so a rename only requires changing this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "patchpilot";

/// Crate version, as compiled.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local config filename (e.g. `.patchpilot.toml` in the working directory).
pub const CONFIG_FILENAME: &str = ".patchpilot.toml";

/// Directory name under `~/.config/` for global config.
pub const CONFIG_DIR: &str = "patchpilot";

// ── Report texts ────────────────────────────────────────────────────

/// Interim message posted when a review starts.
pub const GREETING: &str = "🤖 Hello! I'm reviewing your changes now. This may take a moment...";

/// Disclaimer that opens every report.
pub const REPORT_PREAMBLE: &str = "# 🤖 Automated Review\n\n\
    Please note that while I strive for accuracy, it's important to \
    **verify all recommendations before implementing them**. This review \
    is not meant to replace human review, but to accelerate it by \
    catching common issues early.";

/// Interim message posted while a generation is still running; `{subject}`
/// names the file or the number of files.
pub const PROGRESS_TEMPLATE: &str = "🔄 Still reviewing {subject}... Thanks for your patience!";

/// Separator placed between report sections.
pub const REPORT_SEPARATOR: &str = "\n\n---\n\n";

/// Line appended when no file produced an outcome.
pub const NO_CHANGES_LINE: &str = "No changes to review.";

/// Default review prompt prepended to every file's diff.
pub const DEFAULT_REVIEW_PROMPT: &str = "As a senior software engineer and expert code reviewer, \
    analyze the following code changes for correctness, clarity, maintainability, security, \
    and performance, then provide concise, actionable feedback with specific improvement \
    suggestions. If the changes look good, reply with \"No issues found.\"";

// ── Environment variable names ──────────────────────────────────────

pub const ENV_GATEWAY: &str = "PATCHPILOT_GATEWAY";
pub const ENV_MODEL: &str = "PATCHPILOT_MODEL";
pub const ENV_API_KEY: &str = "PATCHPILOT_API_KEY";
pub const ENV_BASE_URL: &str = "PATCHPILOT_BASE_URL";
pub const ENV_PLATFORM_URL: &str = "PATCHPILOT_PLATFORM_URL";
pub const ENV_PLATFORM_TOKEN: &str = "PATCHPILOT_PLATFORM_TOKEN";
pub const ENV_MAX_FILES: &str = "PATCHPILOT_MAX_FILES";
pub const ENV_MAX_FILE_SIZE: &str = "PATCHPILOT_MAX_FILE_SIZE";
pub const ENV_REVIEW_PROMPT: &str = "PATCHPILOT_REVIEW_PROMPT";
pub const ENV_WEBHOOK_SECRET: &str = "PATCHPILOT_WEBHOOK_SECRET";
pub const ENV_LISTEN: &str = "PATCHPILOT_LISTEN";

/// Directory holding the global `config.toml`, overriding `~/.config/patchpilot`.
pub const ENV_CONFIG_DIR: &str = "PATCHPILOT_CONFIG_DIR";

// ── Webhook server ──────────────────────────────────────────────────

/// Default bind address for `serve`.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
