//! CLI argument definitions for the sqlchat terminal client.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use sqlchat_core::SqlChatConfig;

/// sqlchat — ask sales questions in plain language and get answers as text,
/// tables or charts.
#[derive(Parser, Debug)]
#[command(name = "sqlchat", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Directory holding the local state database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Base URL of the query service.
    #[arg(short = 'u', long = "base-url")]
    pub base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Keep all state in memory; nothing is written to disk.
    #[arg(long = "in-memory")]
    pub in_memory: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SQLCHAT_CONFIG env var > ~/.sqlchat/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SQLCHAT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the query service base URL.
    ///
    /// Priority: --base-url flag > SQLCHAT_BASE_URL env var > config file value.
    pub fn resolve_base_url(&self, config: &SqlChatConfig) -> String {
        if let Some(ref url) = self.base_url {
            return url.clone();
        }
        if let Ok(url) = std::env::var("SQLCHAT_BASE_URL") {
            if !url.trim().is_empty() {
                return url;
            }
        }
        config.backend.base_url.clone()
    }

    /// Resolve the data directory: --data-dir flag > config file value.
    pub fn resolve_data_dir(&self, config: &SqlChatConfig) -> PathBuf {
        match self.data_dir {
            Some(ref p) => p.clone(),
            None => expand_home(&config.general.data_dir),
        }
    }

    /// Resolve the log level: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config: &SqlChatConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config.general.log_level.clone())
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        return home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest);
    }
    PathBuf::from(path)
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".sqlchat").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}
