//! On-disk settings, stored as TOML under the platform config dir.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use bedside_voice::VoiceTurnConfig;

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root of the consultation service API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token from the login flow, if any.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Voice turn tuning; absent fields keep their defaults.
    #[serde(default)]
    pub voice: VoiceTurnConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            voice: VoiceTurnConfig::default(),
        }
    }
}

impl Settings {
    pub fn settings_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("bedside").join("settings.toml"))
    }

    /// Load settings from the settings file, or return defaults if not found.
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::default();
        };
        toml::from_str(&content).unwrap_or_default()
    }

    /// Save settings to the settings file.
    pub fn save(&self) -> Result<()> {
        let path = Self::settings_path().context("could not determine settings path")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create config dir")?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize settings")?;
        fs::write(&path, content).context("failed to write settings")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.base_url, "http://localhost:5000/api");
        assert!(settings.api_token.is_none());
        assert_eq!(settings.voice.silence_window_ms, 3_500);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            base_url = "https://clinic.example/api"

            [voice]
            silence_window_ms = 2000
            "#,
        )
        .unwrap();
        assert_eq!(settings.base_url, "https://clinic.example/api");
        assert_eq!(settings.voice.silence_window_ms, 2_000);
        assert_eq!(settings.voice.max_restarts, 20);
    }
}
