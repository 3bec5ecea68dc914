use crate::config::{AppConfig, ensure_parent_dir};
use anyhow::{Context, Result, anyhow};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub fn log_path() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("could not resolve data directory")?;
    Ok(base.join("nclock-tui").join("nclock-tui.log"))
}

/// `RUST_LOG` wins over the configured level.
fn filter_from(env: Option<String>, configured: &str) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(configured))
}

/// Sends tracing output to a log file; the terminal belongs to the UI.
pub fn init_tracing(config: &AppConfig) -> Result<PathBuf> {
    let path = log_path()?;
    ensure_parent_dir(&path)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file: {}", path.display()))?;

    let filter = filter_from(std::env::var(EnvFilter::DEFAULT_ENV).ok(), &config.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_applies_without_env() {
        assert_eq!(filter_from(None, "debug").to_string(), "debug");
    }

    #[test]
    fn env_directives_take_priority() {
        assert_eq!(filter_from(Some("warn".to_string()), "debug").to_string(), "warn");
    }

    #[test]
    fn log_file_lives_under_app_dir() {
        let path = log_path().expect("data dir");
        assert!(path.ends_with("nclock-tui/nclock-tui.log"));
    }
}
