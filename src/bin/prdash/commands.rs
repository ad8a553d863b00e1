use std::io::Write;

use anyhow::Result;
use prdash::{CredentialStore, Settings, SettingsCommand};

/// Keeps the last four characters so the user can tell tokens apart.
fn mask_token(token: &str) -> String {
    let count = token.chars().count();
    if count <= 8 {
        return "*".repeat(count);
    }
    let tail: String = token.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), tail)
}

fn show_settings<W: Write>(settings: &Settings, writer: &mut W) -> Result<()> {
    writeln!(writer, "Settings file: {}", settings.path().display())?;

    let token = match settings.token() {
        Some(token) if settings.has_stored_token() => mask_token(&token),
        Some(token) => format!("{} (from environment, not saved)", mask_token(&token)),
        None => "not set".to_string(),
    };
    writeln!(writer, "Token:         {token}")?;
    writeln!(
        writer,
        "Username:      {}",
        settings.username().as_deref().unwrap_or("not set")
    )?;

    let repositories = settings.repository_urls();
    if repositories.is_empty() {
        writeln!(writer, "Repositories:  none")?;
    } else {
        writeln!(writer, "Repositories:")?;
        for url in repositories {
            writeln!(writer, "  {url}")?;
        }
    }
    Ok(())
}

pub fn run_settings_command<W: Write>(
    settings: &Settings,
    command: SettingsCommand,
    writer: &mut W,
) -> Result<()> {
    match command {
        SettingsCommand::Show => show_settings(settings, writer)?,
        SettingsCommand::SetToken(token) => {
            if token.trim().is_empty() {
                anyhow::bail!("Token cannot be empty");
            }
            settings.update_token(Some(token))?;
            writeln!(writer, "Token saved to {}", settings.path().display())?;
        }
        SettingsCommand::ClearToken => {
            settings.clear_token();
            writeln!(writer, "Token cleared")?;
        }
        SettingsCommand::SetUsername(username) => {
            settings.update_username(&username)?;
            writeln!(writer, "Username set to {}", username.trim())?;
        }
        SettingsCommand::AddRepository(url) => {
            if settings.add_repository_url(&url)? {
                writeln!(writer, "Watching {}", url.trim())?;
            } else {
                writeln!(writer, "{} is already watched", url.trim())?;
            }
        }
        SettingsCommand::RemoveRepository(url) => {
            if !settings.remove_repository_url(&url)? {
                anyhow::bail!("{} is not a watched repository", url.trim());
            }
            writeln!(writer, "Stopped watching {}", url.trim())?;
        }
    }
    Ok(())
}
