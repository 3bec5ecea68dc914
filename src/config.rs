use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_BASE_URL: &str = "https://localhost:7129/api/";
pub const DEFAULT_WEBSOCKET_URL: &str = "ws://localhost:9999/websocket";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub config_version: u32,
    pub api_base_url: String,
    pub websocket_url: String,
    pub auth_token: Option<String>,
    pub request_timeout_secs: u64,
    /// Development backends usually serve a self-signed certificate.
    pub accept_invalid_certs: bool,
    pub transaction_log_capacity: usize,
    pub require_two_step_confirmation: bool,
    pub start_view: String,
    pub log_level: String,
    /// Column keys shown per view, overriding the built-in defaults.
    pub columns: BTreeMap<String, Vec<String>>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: 1,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            websocket_url: DEFAULT_WEBSOCKET_URL.to_string(),
            auth_token: None,
            request_timeout_secs: 30,
            accept_invalid_certs: false,
            transaction_log_capacity: 1000,
            require_two_step_confirmation: true,
            start_view: "employees".to_string(),
            log_level: "info".to_string(),
            columns: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn load_or_default() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;

        let parsed = toml::from_str::<AppConfig>(&raw)
            .with_context(|| format!("failed to parse config: {}", path.display()))?;

        Ok(parsed)
    }

    pub fn save(&self) -> Result<PathBuf> {
        let path = config_path()?;
        ensure_parent_dir(&path)?;

        let body = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&path, body)
            .with_context(|| format!("failed to write config: {}", path.display()))?;

        Ok(path)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("could not resolve config directory")?;
    Ok(base.join("nclock-tui").join("config.toml"))
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}
