//! Clap argument types.

use clap::{Args, Parser};
use std::path::PathBuf;

use patchpilot::config::Config;
use patchpilot::constants;
use patchpilot::env::Env;
use patchpilot::models::GatewayKind;

/// Automated pull/merge request reviewer.
#[derive(Parser, Debug)]
#[command(
    name = "patchpilot",
    version = patchpilot::constants::VERSION,
    about = "Review pull/merge request changes with a language model."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Review the changes of one pull/merge request.
    Review(ReviewArgs),

    /// Run the webhook service that reviews requests as they are opened or updated.
    Serve(ServeArgs),

    /// Print the effective configuration with secrets redacted.
    Config(ConfigArgs),

    /// Print version information.
    Version,
}

/// Model selection flags shared by `review` and `serve`.
#[derive(Args, Debug, Default)]
pub struct ModelArgs {
    /// Language-model backend.
    #[arg(long)]
    pub gateway: Option<GatewayKind>,

    /// Model name for the selected backend.
    #[arg(long)]
    pub model: Option<String>,
}

impl ModelArgs {
    /// Apply CLI flags on top of loaded configuration.
    pub fn apply_to(&self, config: &mut Config, env: &Env) {
        if let Some(kind) = self.gateway {
            if kind != config.gateway.kind {
                // The loaded key belongs to the other provider.
                config.gateway.api_key = env
                    .var(constants::ENV_API_KEY)
                    .or_else(|| kind.api_key_env_var().and_then(|var| env.var(var)));
            }
            config.gateway.kind = kind;
        }
        if let Some(ref model) = self.model {
            config.gateway.model = model.clone();
        }
    }
}

/// Arguments for the `review` subcommand.
#[derive(Parser, Debug)]
pub struct ReviewArgs {
    /// JSON file holding the review request (reads stdin when omitted).
    #[arg(long, short = 'r')]
    pub request: Option<PathBuf>,

    /// Post the report as a comment on the pull/merge request.
    #[arg(long, default_value_t = false)]
    pub post: bool,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Directory to look for `.patchpilot.toml` in.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides `server.listen`).
    #[arg(long)]
    pub listen: Option<String>,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Directory to look for `.patchpilot.toml` in.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

impl ServeArgs {
    pub fn apply_to(&self, config: &mut Config, env: &Env) {
        self.model.apply_to(config, env);
        if let Some(ref listen) = self.listen {
            config.server.listen = listen.clone();
        }
    }
}

/// Arguments for the `config` subcommand.
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Directory to look for `.patchpilot.toml` in.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}
