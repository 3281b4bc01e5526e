//! # Configuration Management Module
//!
//! Process-wide settings for the bot, loaded once at startup and threaded into
//! the components that need them.
//!
//! ## Configuration Structure
//!
//! - [`BotConfig`] - Command marker and reply truncation bound
//! - [`TransportConfig`] - Chunk size, pacing interval and hand-off queue size
//! - [`ProviderSettings`] - Completion backend kind and the default provider config
//! - [`StorageConfig`] - Session store location
//! - [`LoggingConfig`] - Log level and optional log file
//!
//! ## Configuration File Format
//!
//! ```toml
//! [bot]
//! command_prefix = "/"
//! reply_max_chars = 175
//!
//! [transport]
//! max_chunk_bytes = 200
//! chunk_gap_ms = 2000
//! event_queue_capacity = 256
//!
//! [provider]
//! kind = "openai"
//! model = "cognitivecomputations/dolphin-mistral-24b-venice-edition:free"
//! api_key = ""
//! api_key_file = ".key"
//! base_url = "https://api.proxyapi.ru/openrouter/v1"
//! max_tokens = 200
//!
//! [storage]
//! store_file = "history.json"
//!
//! [logging]
//! level = "info"
//! file = "meshai.log"
//! ```
//!
//! Every section may be omitted; missing values take the defaults shown above.

use anyhow::{anyhow, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

use crate::storage::ProviderConfig;

/// Smallest slice that can carry any UTF-8 scalar value.
pub const MIN_CHUNK_BYTES: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Marker every command verb must start with.
    pub command_prefix: String,
    /// Upper bound (in characters) for assistant replies kept in history and sent back.
    pub reply_max_chars: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: "/".to_string(),
            reply_max_chars: 175,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum payload bytes per outgoing slice.
    pub max_chunk_bytes: usize,
    /// Pause between consecutive slices of one reply (ms).
    pub chunk_gap_ms: u64,
    /// Capacity of the bounded queue between transport callbacks and the router.
    pub event_queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: 200, // ~30 bytes below the 230-byte radio frame for protocol overhead
            chunk_gap_ms: 2000,
            event_queue_capacity: 256,
        }
    }
}

impl TransportConfig {
    pub fn chunk_gap(&self) -> Duration {
        Duration::from_millis(self.chunk_gap_ms)
    }
}

/// Which completion backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible `/chat/completions` endpoint.
    #[default]
    Openai,
    /// Offline: answer with the last user turn.
    Echo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: String,
    /// File holding the default API key, read when `api_key` is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_file: Option<String>,
    pub base_url: String,
    pub max_tokens: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Openai,
            model: "cognitivecomputations/dolphin-mistral-24b-venice-edition:free".to_string(),
            api_key: String::new(),
            api_key_file: Some(".key".to_string()),
            base_url: "https://api.proxyapi.ru/openrouter/v1".to_string(),
            max_tokens: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding every user's history and provider config.
    pub store_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_file: "history.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some("meshai.log".to_string()),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject values the core cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.bot.command_prefix.is_empty() {
            return Err(anyhow!("bot.command_prefix must not be empty"));
        }
        if self.bot.reply_max_chars == 0 {
            return Err(anyhow!("bot.reply_max_chars must be greater than zero"));
        }
        if self.transport.max_chunk_bytes < MIN_CHUNK_BYTES {
            return Err(anyhow!(
                "transport.max_chunk_bytes must be at least {} (got {})",
                MIN_CHUNK_BYTES,
                self.transport.max_chunk_bytes
            ));
        }
        if self.transport.event_queue_capacity == 0 {
            return Err(anyhow!("transport.event_queue_capacity must be greater than zero"));
        }
        Ok(())
    }

    /// Process-wide provider defaults that every session's overrides merge over.
    ///
    /// When no key is configured inline, the key file is consulted; a missing
    /// file leaves the key empty.
    pub fn provider_defaults(&self) -> ProviderConfig {
        let mut api_key = self.provider.api_key.trim().to_string();
        if api_key.is_empty() {
            if let Some(path) = &self.provider.api_key_file {
                match std::fs::read_to_string(path) {
                    Ok(contents) => api_key = contents.trim().to_string(),
                    Err(e) => warn!("No default API key: cannot read key file {}: {}", path, e),
                }
            }
        }
        ProviderConfig {
            model: self.provider.model.clone(),
            api_key,
            base_url: self.provider.base_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bot.command_prefix, "/");
        assert_eq!(config.bot.reply_max_chars, 175);
        assert_eq!(config.transport.max_chunk_bytes, 200);
        assert_eq!(config.transport.chunk_gap(), Duration::from_millis(2000));
        assert_eq!(config.provider.kind, ProviderKind::Openai);
        assert_eq!(config.provider.max_tokens, 200);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [bot]
            reply_max_chars = 360

            [provider]
            kind = "echo"
            "#,
        )
        .unwrap();
        assert_eq!(config.bot.reply_max_chars, 360);
        assert_eq!(config.bot.command_prefix, "/");
        assert_eq!(config.provider.kind, ProviderKind::Echo);
        assert_eq!(config.storage.store_file, "history.json");
    }

    #[test]
    fn tiny_chunks_are_rejected() {
        let mut config = Config::default();
        config.transport.max_chunk_bytes = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_reply_bound_is_rejected() {
        let mut config = Config::default();
        config.bot.reply_max_chars = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inline_key_wins_over_key_file() {
        let mut config = Config::default();
        config.provider.api_key = " sk-inline \n".to_string();
        config.provider.api_key_file = Some("/nonexistent/.key".to_string());
        let defaults = config.provider_defaults();
        assert_eq!(defaults.api_key, "sk-inline");
        assert_eq!(defaults.model, config.provider.model);
        assert_eq!(defaults.base_url, config.provider.base_url);
    }

    #[test]
    fn key_file_is_read_when_inline_key_missing() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join(".key");
        std::fs::write(&key_path, "sk-from-file\n").unwrap();
        let mut config = Config::default();
        config.provider.api_key_file = Some(key_path.to_string_lossy().to_string());
        assert_eq!(config.provider_defaults().api_key, "sk-from-file");
    }

    #[test]
    fn missing_key_file_leaves_key_empty() {
        let mut config = Config::default();
        config.provider.api_key_file = Some("/nonexistent/.key".to_string());
        assert_eq!(config.provider_defaults().api_key, "");
    }

    #[tokio::test]
    async fn default_file_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_string_lossy().to_string();
        Config::create_default(&path).await.unwrap();
        let loaded = Config::load(&path).await.unwrap();
        assert_eq!(loaded.transport.event_queue_capacity, 256);
        assert_eq!(loaded.logging.file.as_deref(), Some("meshai.log"));
    }
}
