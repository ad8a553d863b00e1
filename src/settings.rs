use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::types::{CredentialStore, RepositoryRef};

pub const SETTINGS_FILE_NAME: &str = ".prdash.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SettingsData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    github_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    repositories: Vec<String>,
}

/// Settings persisted as JSON: the GitHub token, the username whose review
/// queue is shown, and the watched repository URLs.
///
/// A fallback token discovered from the environment can be attached; it is
/// used when no token is stored but is never written to disk.
#[derive(Debug)]
pub struct Settings {
    path: PathBuf,
    data: Mutex<SettingsData>,
    fallback_token: Mutex<Option<String>>,
}

impl Settings {
    /// `~/.prdash.json`.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(SETTINGS_FILE_NAME))
    }

    /// Loads settings from `path`, creating an empty settings file when it
    /// does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            info!(path = %path.display(), "creating settings file");
            fs::write(&path, "{}\n")
                .with_context(|| format!("Failed to create settings file {}", path.display()))?;
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let data: SettingsData = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        debug!(
            path = %path.display(),
            has_token = data.github_token.is_some(),
            repositories = data.repositories.len(),
            "loaded settings"
        );

        Ok(Self {
            path,
            data: Mutex::new(data),
            fallback_token: Mutex::new(None),
        })
    }

    pub fn with_fallback_token(self, token: Option<String>) -> Self {
        *lock(&self.fallback_token) = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save_data(&self, data: &SettingsData) -> Result<()> {
        let json = serde_json::to_string_pretty(data).context("Failed to serialise settings")?;
        fs::write(&self.path, json + "\n")
            .with_context(|| format!("Failed to write settings file {}", self.path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_data(&lock(&self.data))
    }

    /// Applies `change` to a copy, and only keeps it once it is on disk.
    fn update(&self, change: impl FnOnce(&mut SettingsData)) -> Result<()> {
        let mut data = lock(&self.data);
        let mut next = data.clone();
        change(&mut next);
        self.save_data(&next)?;
        *data = next;
        Ok(())
    }

    /// The stored token, or the fallback token when none is stored.
    pub fn token(&self) -> Option<String> {
        lock(&self.data)
            .github_token
            .clone()
            .or_else(|| lock(&self.fallback_token).clone())
    }

    pub fn has_stored_token(&self) -> bool {
        lock(&self.data).github_token.is_some()
    }

    pub fn update_token(&self, token: Option<String>) -> Result<()> {
        let token = token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        self.update(|data| data.github_token = token)
    }

    pub fn username(&self) -> Option<String> {
        lock(&self.data).username.clone()
    }

    pub fn update_username(&self, username: &str) -> Result<()> {
        let username = username.trim();
        if username.is_empty() {
            anyhow::bail!("Username cannot be empty");
        }
        let username = username.to_string();
        self.update(|data| data.username = Some(username))
    }

    pub fn repository_urls(&self) -> Vec<String> {
        lock(&self.data).repositories.clone()
    }

    /// Parsed watched repositories. Entries that do not parse are skipped.
    pub fn repositories(&self) -> Vec<RepositoryRef> {
        self.repository_urls()
            .iter()
            .filter_map(|url| match RepositoryRef::parse_any(url) {
                Ok(repo) => Some(repo),
                Err(err) => {
                    warn!(url = %url, error = %err, "ignoring malformed repository entry");
                    None
                }
            })
            .collect()
    }

    /// Adds a repository URL; returns false when it is already watched.
    pub fn add_repository_url(&self, url: &str) -> Result<bool> {
        let url = url.trim();
        let repo = RepositoryRef::parse_any(url)
            .with_context(|| format!("Invalid repository '{url}'"))?;

        let mut data = lock(&self.data);
        let exists = data
            .repositories
            .iter()
            .filter_map(|existing| RepositoryRef::parse_any(existing).ok())
            .any(|existing| existing == repo);
        if exists {
            return Ok(false);
        }
        let mut next = data.clone();
        next.repositories.push(url.to_string());
        self.save_data(&next)?;
        *data = next;
        Ok(true)
    }

    /// Removes a repository by URL or `owner/name`; returns false when
    /// nothing matched.
    pub fn remove_repository_url(&self, url: &str) -> Result<bool> {
        let url = url.trim();
        let target = RepositoryRef::parse_any(url).ok();

        let mut data = lock(&self.data);
        let mut next = data.clone();
        next.repositories.retain(|existing| {
            if existing == url {
                return false;
            }
            match (&target, RepositoryRef::parse_any(existing)) {
                (Some(target), Ok(existing)) => *target != existing,
                _ => true,
            }
        });
        if next.repositories.len() == data.repositories.len() {
            return Ok(false);
        }
        self.save_data(&next)?;
        *data = next;
        Ok(true)
    }
}

impl CredentialStore for Settings {
    fn has_token(&self) -> bool {
        self.token().is_some()
    }

    fn clear_token(&self) {
        lock(&self.fallback_token).take();

        let mut data = lock(&self.data);
        if data.github_token.take().is_none() {
            return;
        }
        if let Err(err) = self.save_data(&data) {
            error!(error = %format!("{err:#}"), "failed to persist cleared token");
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
