use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SqlChatError};

/// Top-level configuration for the sqlchat client.
///
/// Loaded from `~/.sqlchat/config.toml` by default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlChatConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl SqlChatConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SqlChatConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SqlChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding the local state database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.sqlchat".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Remote query service endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Request timeout in seconds. 0 leaves the transport default (none).
    pub timeout_secs: u64,
    pub intent_path: String,
    pub sql_path: String,
    pub tables_path: String,
    pub kpi_path: String,
    pub examples_path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 0,
            intent_path: "/api/intent".to_string(),
            sql_path: "/api/sql_from_intent".to_string(),
            tables_path: "/api/tables".to_string(),
            kpi_path: "/api/kpi_strip".to_string(),
            examples_path: "/api/examples".to_string(),
        }
    }
}

/// Conversational front-end settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Maximum accepted question length in characters.
    pub max_question_length: usize,
    /// Greet new sessions with the welcome messages.
    pub welcome_messages: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_question_length: 2000,
            welcome_messages: true,
        }
    }
}
