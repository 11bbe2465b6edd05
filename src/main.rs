//! patchpilot: automated pull/merge request reviewer.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use patchpilot::config;
use patchpilot::constants;
use patchpilot::env;
use patchpilot::gateway;
use patchpilot::notify;
use patchpilot::orchestrator;
use patchpilot::platform;
use patchpilot::webhook;

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::args::{Cli, Command, ConfigArgs, ReviewArgs, ServeArgs};
use config::Config;
use env::Env;
use notify::NotificationSink;
use orchestrator::ReviewOrchestrator;

#[tokio::main]
async fn main() {
    // Logs go to stderr so stdout carries only the report.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Review(args) => run_review(args).await,
        Command::Serve(args) => run_serve(args).await,
        Command::Config(args) => run_config(args),
        Command::Version => run_version(),
    }
}

/// Print version information.
fn run_version() -> Result<()> {
    use colored::Colorize;

    println!(
        "{} {}",
        constants::APP_NAME.bold(),
        constants::VERSION.green().bold()
    );
    Ok(())
}

/// Print the effective configuration as TOML, secrets redacted.
fn run_config(args: ConfigArgs) -> Result<()> {
    let config = Config::load(Some(args.path.as_path()), &Env::real())
        .context("failed to load configuration")?;
    let rendered =
        toml::to_string_pretty(&config.redacted()).context("failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

async fn run_review(args: ReviewArgs) -> Result<()> {
    let request = cli::read_request(args.request.as_deref())?;

    let env = Env::real();
    let mut config =
        Config::load(Some(args.path.as_path()), &env).context("failed to load configuration")?;
    args.model.apply_to(&mut config, &env);

    let policy = config.policy().context("invalid review settings")?;
    let gateway = gateway::build_gateway(&config.gateway).context("failed to set up gateway")?;
    let poster = platform::build_poster(&config.platform).context("failed to set up platform")?;
    if args.post && poster.is_none() {
        anyhow::bail!(
            "--post needs a platform token; set {} or platform.token",
            constants::ENV_PLATFORM_TOKEN
        );
    }

    info!(
        request = %request.key(),
        gateway = %config.gateway.kind,
        model = %config.gateway.model,
        "reviewing"
    );

    let orchestrator = ReviewOrchestrator::new(
        gateway,
        NotificationSink::from_poster(poster.clone()),
        policy,
    );
    let report = orchestrator.review_request(&request).await;
    let body = report.render();
    println!("{body}");

    if let Some(poster) = poster.filter(|_| args.post) {
        poster
            .post_comment(&request.key(), &body)
            .await
            .context("failed to post review report")?;
        info!(request = %request.key(), "report posted");
    }

    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let env = Env::real();
    let mut config =
        Config::load(Some(args.path.as_path()), &env).context("failed to load configuration")?;
    args.apply_to(&mut config, &env);

    let secret = config.platform.webhook_secret.clone().with_context(|| {
        format!(
            "serve needs a webhook secret; set {} or platform.webhook_secret",
            constants::ENV_WEBHOOK_SECRET
        )
    })?;
    let kind = config
        .platform
        .resolved_kind()
        .context("cannot tell whether the platform is GitHub or GitLab; set platform.kind")?;
    let poster = platform::build_poster(&config.platform)
        .context("failed to set up platform")?
        .with_context(|| {
            format!(
                "serve needs a platform token; set {} or platform.token",
                constants::ENV_PLATFORM_TOKEN
            )
        })?;
    let fetcher = platform::build_fetcher(&config.platform).context("failed to set up platform")?;

    let policy = config.policy().context("invalid review settings")?;
    let gateway = gateway::build_gateway(&config.gateway).context("failed to set up gateway")?;
    let orchestrator = Arc::new(ReviewOrchestrator::new(
        gateway,
        NotificationSink::new(poster.clone()),
        policy,
    ));
    let state = Arc::new(webhook::WebhookState::new(
        kind,
        secret,
        fetcher,
        poster,
        orchestrator,
    ));

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen))?;
    info!(
        address = %listener.local_addr()?,
        platform = %kind,
        gateway = %config.gateway.kind,
        model = %config.gateway.model,
        "webhook service listening"
    );

    webhook::serve(listener, state, shutdown_signal())
        .await
        .context("webhook service failed")
}

/// Resolve on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutting down");
}
