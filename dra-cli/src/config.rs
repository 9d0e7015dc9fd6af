//! Settings file handling

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dra_control::Settings;
use tracing::{debug, info};

const APP_DIR: &str = "dorji";
const SETTINGS_FILE: &str = "settings.json";

/// Get the XDG config directory for dorji
/// Uses $XDG_CONFIG_HOME/dorji when absolute, falls back to ~/.config/dorji
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config);
        if path.is_absolute() {
            return Some(path.join(APP_DIR));
        }
    }

    dirs::home_dir().map(|h| h.join(".config").join(APP_DIR))
}

/// Default settings file path
pub fn default_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join(SETTINGS_FILE))
}

/// Load settings; a missing file yields the defaults
pub fn load(path: &Path) -> Result<Settings> {
    if !path.exists() {
        debug!("No settings at {}, using defaults", path.display());
        return Ok(Settings::default());
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let settings = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(settings)
}

/// Save settings, creating the directory if needed
pub fn save(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(settings).context("failed to serialize settings")?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;

    info!("Saved settings to {}", path.display());
    Ok(())
}
