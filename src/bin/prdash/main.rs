mod commands;
mod display;

use std::{fs::OpenOptions, path::Path, sync::Arc};

use anyhow::{Context, Result};
use commands::run_settings_command;
use display::{display_failures, display_report};
use prdash::{
    Action, CredentialStore, Dashboard, FetchErrorKind, GitHub, RefreshRequest, RepositoryRef,
    Settings, SystemClock, parse_args, token_from_environment,
};
use tracing::{debug, info, warn};

fn handle_clap_help_version(clap_err: &clap::Error) -> ! {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            std::process::exit(0);
        }
        _ => {
            eprint!("{clap_err}");
            std::process::exit(2);
        }
    }
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .with(filter)
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    }
    Ok(())
}

/// Resolves once Ctrl-C is pressed. Never resolves if the handler cannot be
/// installed.
async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Stored repositories first, then those given on the command line.
fn merge_repositories(stored: Vec<RepositoryRef>, extra: Vec<RepositoryRef>) -> Vec<RepositoryRef> {
    let mut merged: Vec<RepositoryRef> = Vec::with_capacity(stored.len() + extra.len());
    for repo in stored.into_iter().chain(extra) {
        if !merged.contains(&repo) {
            merged.push(repo);
        }
    }
    merged
}

async fn run_refresh(settings: Settings, request: RefreshRequest) -> Result<()> {
    let settings = if settings.has_stored_token() {
        settings
    } else {
        settings.with_fallback_token(token_from_environment())
    };
    let settings = Arc::new(settings);

    let username = request
        .username
        .or_else(|| settings.username())
        .context(
            "No username configured; pass --username or run 'prdash settings set-username <USERNAME>'",
        )?;

    let repositories = merge_repositories(settings.repositories(), request.extra_repositories);
    if repositories.is_empty() {
        eprintln!("No repositories watched; run 'prdash settings add-repo <OWNER/REPO>'");
        return Ok(());
    }

    let Some(token) = settings.token() else {
        eprintln!("No GitHub token configured; run 'prdash settings set-token <TOKEN>'");
        return Ok(());
    };

    let dashboard = Dashboard::new(
        GitHub::new(&token)?,
        settings.clone(),
        Arc::new(SystemClock),
        request.fetch,
    );

    info!(
        username = %username,
        repositories = repositories.len(),
        "refreshing pull requests"
    );
    let refresh = dashboard.refresh(&username, &repositories);
    tokio::pin!(refresh);
    let report = tokio::select! {
        report = &mut refresh => report,
        _ = interrupted() => {
            info!("interrupted; cancelling refresh");
            dashboard.shutdown();
            refresh.await
        }
    };

    if report.cancelled {
        eprintln!("Refresh cancelled");
        std::process::exit(130);
    }
    debug!(fetched_at = %report.fetched_at, "refresh finished");

    let mut stderr = std::io::stderr();
    display_failures(&report, &mut stderr)?;

    let auth_failed = report
        .failures
        .iter()
        .any(|f| f.error.kind() == FetchErrorKind::Auth);
    if auth_failed && !settings.has_token() {
        eprintln!(
            "GitHub rejected the token and it has been cleared; run 'prdash settings set-token <TOKEN>'"
        );
    }

    display_report(&report, request.display, &mut std::io::stdout())
}

#[tokio::main]
async fn main() -> Result<()> {
    let invocation = match parse_args(std::env::args_os()) {
        Ok(result) => result,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                handle_clap_help_version(clap_err);
            } else {
                return Err(err);
            }
        }
    };

    init_tracing(invocation.log_file.as_deref())?;

    let config_path = match invocation.config_path {
        Some(path) => path,
        None => Settings::default_path()?,
    };
    let settings = Settings::load(&config_path)?;

    match invocation.action {
        Action::Settings(command) => {
            let settings = if settings.has_stored_token() {
                settings
            } else {
                settings.with_fallback_token(token_from_environment())
            };
            run_settings_command(&settings, command, &mut std::io::stdout())
        }
        Action::Refresh(request) => run_refresh(settings, request).await,
    }
}
