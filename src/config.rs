//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILTIDE_CONFIG` (environment variable)
//! 2. `~/.config/mailtide/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailtide\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! The account address and application password can also come from
//! `$MAILTIDE_ADDRESS` and `$MAILTIDE_PASSWORD`, which take precedence.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{MailError, Result};

/// Environment variable overriding the account address.
pub const ADDRESS_ENV: &str = "MAILTIDE_ADDRESS";
/// Environment variable overriding the application password.
pub const PASSWORD_ENV: &str = "MAILTIDE_PASSWORD";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Account identity.
    pub account: AccountConfig,
    /// Incoming mail server.
    pub imap: ImapConfig,
    /// Outgoing mail server.
    pub smtp: SmtpConfig,
    /// Retrieval defaults.
    pub retrieval: RetrievalConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Interface language ("en", "ru"). Defaults to the system locale.
    pub lang: Option<String>,
}

/// Account identity. The password is an application-specific secret,
/// not the interactive account password.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Mail address, also used as the login name.
    pub address: String,
    /// Application password.
    pub app_password: String,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("address", &self.address)
            .field("app_password", &"<redacted>")
            .finish()
    }
}

/// Incoming (IMAP over TLS) server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapConfig {
    pub host: String,
    /// Implicit-TLS port.
    pub port: u16,
    /// Folder read by retrieval.
    pub folder: String,
}

/// Outgoing (SMTP submission with STARTTLS) server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
}

/// Retrieval defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Messages read when no valid count is given.
    pub default_limit: usize,
    /// Body characters shown per message.
    pub preview_chars: usize,
    /// Where attachments are saved (relative paths are relative to the
    /// working directory).
    pub attachment_dir: PathBuf,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
            lang: None,
        }
    }
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            folder: "INBOX".to_string(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            preview_chars: 800,
            attachment_dir: PathBuf::from("attachments"),
        }
    }
}

// ── Credentials ─────────────────────────────────────────────────

/// Login name and secret for both servers.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Resolve credentials, preferring the environment over the file.
    pub fn credentials(&self) -> Result<Credentials> {
        self.credentials_with(|key| std::env::var(key).ok())
    }

    fn credentials_with(&self, env: impl Fn(&str) -> Option<String>) -> Result<Credentials> {
        let pick = |key: &str, file_value: &str| {
            env(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| file_value.to_string())
        };
        let username = pick(ADDRESS_ENV, &self.account.address);
        // App passwords are often shown in groups of four; spaces are not part of them.
        let password: String = pick(PASSWORD_ENV, &self.account.app_password)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        if username.trim().is_empty() {
            return Err(MailError::Config(format!(
                "no account address: set [account] address or ${ADDRESS_ENV}"
            )));
        }
        if password.is_empty() {
            return Err(MailError::Config(format!(
                "no application password: set [account] app_password or ${PASSWORD_ENV}"
            )));
        }
        Ok(Credentials {
            username: username.trim().to_string(),
            password,
        })
    }
}

/// Map user input to a message count: positive integers are kept, anything
/// else becomes `default`.
pub fn clamp_limit(input: &str, default: usize) -> usize {
    match input.trim().parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => default.max(1),
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location and return the path written.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(path)
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILTIDE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mailtide").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailtide")
}
