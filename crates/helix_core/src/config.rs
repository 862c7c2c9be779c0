use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Application configuration stored at `~/.helix/config.json`.
///
/// The API key may also come from the environment (`HELIX_API_KEY`, falling
/// back to `OPENAI_API_KEY`); an env key always wins over the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelixConfig {
    /// API key for the chat-completion endpoint. Not written back to disk
    /// when it came from the environment.
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,
    /// Model used for planning and answer synthesis.
    pub primary_model: String,
    /// Smaller model used for the single automatic retry.
    pub fallback_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for HelixConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            primary_model: "gpt-4o".into(),
            fallback_model: "gpt-4o-mini".into(),
            temperature: 0.2,
            max_tokens: 1024,
            log_level: "info,helix_core=debug,helix_ai=debug,helix_agent=debug".into(),
        }
    }
}

impl HelixConfig {
    /// `~/.helix`
    pub fn base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".helix"))
    }

    /// `~/.helix/logs`
    pub fn logs_dir() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("logs"))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("config.json"))
    }

    /// Load the config file, falling back to defaults if it is missing or
    /// unreadable, then apply environment overrides.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Ok(path) => match std::fs::read_to_string(&path) {
                Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                    warn!("Malformed config at {}: {e}, using defaults", path.display());
                    Self::default()
                }),
                Err(_) => Self::default(),
            },
            Err(_) => Self::default(),
        };
        config.apply_env();
        config
    }

    /// Load from an explicit path (tests, embedded scenarios). Env overrides
    /// are not applied.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Malformed config: {}", path.display()))?;
        Ok(config)
    }

    /// Persist to `~/.helix/config.json`, creating the directory if needed.
    /// The API key is written only if it did not come from the environment.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut on_disk = self.clone();
        if env_api_key().is_some() {
            on_disk.api_key = None;
        }
        let content = serde_json::to_string_pretty(&on_disk)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Some(key) = env_api_key() {
            self.api_key = Some(key);
        }
    }
}

fn env_api_key() -> Option<String> {
    std::env::var("HELIX_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok()
        .filter(|k| !k.is_empty())
}
