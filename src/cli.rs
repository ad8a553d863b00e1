use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::{fetch::FetchConfig, types::RepositoryRef};

/// How the refreshed list is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Normal,
    /// URLs only, one per line.
    Quiet,
    /// The table followed by each pull request's reviews and requests.
    Detailed,
}

#[derive(Args, Debug, Clone, Default)]
struct RefreshArgs {
    /// Show the review queue of this GitHub user (defaults to the stored username)
    #[arg(short = 'u', long, value_name = "USERNAME")]
    pub username: Option<String>,

    /// Also watch this repository for this run (can specify multiple)
    #[arg(short = 'r', long = "repo", value_name = "OWNER/REPO|URL")]
    pub repo: Vec<String>,

    /// Per-repository query timeout (e.g. 15, 30s, 5m, 2h; unitless implies seconds)
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Number of repositories queried at the same time
    #[arg(long = "max-concurrent", default_value = "8", value_name = "NUM")]
    pub max_concurrent: usize,

    /// Retries after a transient failure (0 disables retrying)
    #[arg(long, default_value = "2", value_name = "NUM")]
    pub retries: u32,

    /// Show detailed PR information
    #[arg(short = 'd', long, conflicts_with = "quiet")]
    pub detailed: bool,

    /// Print PR URLs only
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// View or edit the settings file
    Settings {
        #[command(subcommand)]
        command: SettingsArgs,
    },
}

#[derive(Subcommand, Debug, Clone)]
enum SettingsArgs {
    /// Print the current settings (the token is masked)
    Show,
    /// Store a GitHub personal access token
    SetToken {
        #[arg(value_name = "TOKEN")]
        token: String,
    },
    /// Forget the stored token
    ClearToken,
    /// Store the GitHub username whose review queue is shown
    SetUsername {
        #[arg(value_name = "USERNAME")]
        username: String,
    },
    /// Watch a repository
    AddRepo {
        #[arg(value_name = "OWNER/REPO|URL")]
        repository: String,
    },
    /// Stop watching a repository
    RemoveRepo {
        #[arg(value_name = "OWNER/REPO|URL")]
        repository: String,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "prdash",
    version,
    about = "Show the open pull requests waiting on your review across your watched repositories",
    args_conflicts_with_subcommands = true
)]
struct CliArgs {
    /// Settings file (defaults to ~/.prdash.json)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long = "log-file", global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub refresh: RefreshArgs,
}

/// A settings edit requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsCommand {
    Show,
    SetToken(String),
    ClearToken,
    SetUsername(String),
    AddRepository(String),
    RemoveRepository(String),
}

/// A refresh requested on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshRequest {
    pub username: Option<String>,
    /// Repositories given with `--repo`, watched for this run only.
    pub extra_repositories: Vec<RepositoryRef>,
    pub fetch: FetchConfig,
    pub display: DisplayMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Refresh(RefreshRequest),
    Settings(SettingsCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub config_path: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub action: Action,
}

/// Parses `15`, `30s`, `5m` or `2h`. Unitless values are seconds.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    if let Some(seconds_str) = value.strip_suffix('s') {
        let seconds: u64 = seconds_str
            .parse()
            .with_context(|| format!("Invalid seconds: '{}'", seconds_str))?;
        return Ok(Duration::from_secs(seconds));
    }

    if let Some(minutes_str) = value.strip_suffix('m') {
        let minutes: u64 = minutes_str
            .parse()
            .with_context(|| format!("Invalid minutes: '{}'", minutes_str))?;
        let seconds = minutes
            .checked_mul(60)
            .with_context(|| format!("Duration '{}' is too large", value))?;
        return Ok(Duration::from_secs(seconds));
    }

    if let Some(hours_str) = value.strip_suffix('h') {
        let hours: u64 = hours_str
            .parse()
            .with_context(|| format!("Invalid hours: '{}'", hours_str))?;
        let seconds = hours
            .checked_mul(3600)
            .with_context(|| format!("Duration '{}' is too large", value))?;
        return Ok(Duration::from_secs(seconds));
    }

    anyhow::bail!(
        "Invalid duration '{}'. Supported formats: unitless number (seconds), '30s', '5m', '2h'",
        value
    )
}

fn determine_display_mode(args: &RefreshArgs) -> DisplayMode {
    match (args.quiet, args.detailed) {
        (true, _) => DisplayMode::Quiet,
        (_, true) => DisplayMode::Detailed,
        _ => DisplayMode::Normal,
    }
}

fn create_refresh_request(args: RefreshArgs) -> Result<RefreshRequest> {
    if args.max_concurrent == 0 {
        anyhow::bail!("--max-concurrent must be at least 1");
    }

    let mut fetch = FetchConfig {
        max_concurrent: args.max_concurrent,
        max_retries: args.retries,
        ..FetchConfig::default()
    };
    if let Some(timeout) = args.timeout.as_deref().filter(|t| !t.trim().is_empty()) {
        fetch.timeout = parse_duration(timeout)?;
        if fetch.timeout.is_zero() {
            anyhow::bail!("--timeout must be greater than zero");
        }
    }

    let extra_repositories = args
        .repo
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(|r| {
            RepositoryRef::parse_any(r)
                .map_err(|e| anyhow::anyhow!("Invalid repository '{}': {}", r, e))
        })
        .collect::<Result<Vec<_>>>()?;

    let username = args
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string);

    Ok(RefreshRequest {
        display: determine_display_mode(&args),
        username,
        extra_repositories,
        fetch,
    })
}

fn create_settings_command(args: SettingsArgs) -> SettingsCommand {
    match args {
        SettingsArgs::Show => SettingsCommand::Show,
        SettingsArgs::SetToken { token } => SettingsCommand::SetToken(token),
        SettingsArgs::ClearToken => SettingsCommand::ClearToken,
        SettingsArgs::SetUsername { username } => SettingsCommand::SetUsername(username),
        SettingsArgs::AddRepo { repository } => SettingsCommand::AddRepository(repository),
        SettingsArgs::RemoveRepo { repository } => SettingsCommand::RemoveRepository(repository),
    }
}

/// Parses command-line arguments into an [`Invocation`].
///
/// Clap errors (including `--help` and `--version`) are returned as
/// `anyhow::Error` wrapping a `clap::Error` so the caller can decide how to
/// print them.
pub fn parse_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = CliArgs::try_parse_from(args)?;

    let action = match cli.command {
        Some(Command::Settings { command }) => Action::Settings(create_settings_command(command)),
        None => Action::Refresh(create_refresh_request(cli.refresh)?),
    };

    Ok(Invocation {
        config_path: cli.config,
        log_file: cli.log_file,
        action,
    })
}
