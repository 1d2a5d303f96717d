//! Per-persona settings (`persona.toml` in the persona's folder).

use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::ConfigError;

/// Placeholder in [`PersonaSettings::webhook_body`] replaced by the response.
pub const WEBHOOK_TEXT_PLACEHOLDER: &str = "%text%";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSettings {
    /// Display name
    #[serde(default = "default_name")]
    pub name: String,

    /// Model override; empty uses the general default
    #[serde(default)]
    pub model: String,

    /// Minutes between timer generations; `0` disables the timer
    #[serde(default)]
    pub timer_cycle_minutes: u64,

    /// Completion webhook endpoint; empty disables it
    #[serde(default)]
    pub webhook_url: String,

    /// JSON body template; `%text%` is replaced by the escaped response
    #[serde(default = "default_webhook_body")]
    pub webhook_body: String,
}

fn default_name() -> String {
    "Persona".into()
}
fn default_webhook_body() -> String {
    r#"{"content":"%text%"}"#.into()
}

impl Default for PersonaSettings {
    fn default() -> Self {
        Self {
            name: default_name(),
            model: String::new(),
            timer_cycle_minutes: 0,
            webhook_url: String::new(),
            webhook_body: default_webhook_body(),
        }
    }
}

impl PersonaSettings {
    /// Load from a `persona.toml`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No persona settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Write to a `persona.toml`, creating the folder if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
