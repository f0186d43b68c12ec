//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.dochi/config.json`). The
//! backend handles authentication; the client only needs to know who it is
//! talking to and as whom it renders.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::provider::Provider;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Backend connection settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Who the client renders and filters as.
    #[serde(default)]
    pub user: UserConfig,

    /// Chat defaults (persona, provider).
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Backend base URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Base URL of the chat backend (default "http://127.0.0.1:5000").
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// Identity used for ownership checks and turn labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    #[serde(default = "default_username")]
    pub username: String,

    /// Administrators see every persona and every entry's options.
    #[serde(default)]
    pub is_admin: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            is_admin: false,
        }
    }
}

/// Defaults applied when a chat starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConfig {
    /// Persona role key selected on startup.
    #[serde(default = "default_persona")]
    pub default_persona: String,

    /// Provider selected on startup.
    #[serde(default)]
    pub default_provider: Provider,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_persona: default_persona(),
            default_provider: Provider::default(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_username() -> String {
    "Guest".to_string()
}

fn default_persona() -> String {
    "general".to_string()
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("DOCHI_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".dochi").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the default path (or DOCHI_CONFIG_PATH). Missing file =>
/// default config. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
