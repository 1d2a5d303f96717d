//! Immutable per-generation view of the settings.

use parlor_core::PersonaId;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;
use crate::{AppConfig, ConfigError, FeatureConfig, PersonaSettings};

/// Where a finished response is posted.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookTarget {
    pub url: String,
    pub body_template: String,
}

impl WebhookTarget {
    /// Substitute the JSON-escaped response for every `%text%`.
    pub fn render_body(&self, text: &str) -> String {
        let quoted = serde_json::Value::String(text.to_string()).to_string();
        let escaped = &quoted[1..quoted.len() - 1];
        self.body_template
            .replace(crate::persona::WEBHOOK_TEXT_PLACEHOLDER, escaped)
    }
}

/// Everything one generation reads from configuration, resolved once when
/// it starts. Later edits to the files only affect the next generation.
#[derive(Debug, Clone)]
pub struct GenerationSnapshot {
    pub persona: PersonaId,
    pub persona_name: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub token_budget: usize,
    pub overhead_tokens: usize,
    pub attachment_cutoff: i32,
    pub max_tool_iterations: u32,
    pub break_reminder_threshold: usize,
    pub utc_offset_minutes: i32,
    pub features: FeatureConfig,
    pub webhook: Option<WebhookTarget>,
}

impl GenerationSnapshot {
    pub fn resolve(persona: PersonaId, config: &AppConfig, settings: &PersonaSettings) -> Self {
        let model = if settings.model.trim().is_empty() {
            config.default_model.clone()
        } else {
            settings.model.clone()
        };

        let webhook = (config.features.webhook
            && !settings.webhook_url.trim().is_empty()
            && !settings.webhook_body.trim().is_empty())
        .then(|| WebhookTarget {
            url: settings.webhook_url.clone(),
            body_template: settings.webhook_body.clone(),
        });

        Self {
            persona,
            persona_name: settings.name.clone(),
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
            token_budget: config.history_token_budget,
            overhead_tokens: config.context_overhead_tokens,
            attachment_cutoff: config.attachment_cutoff,
            max_tool_iterations: config.max_tool_iterations,
            break_reminder_threshold: config.break_reminder_threshold,
            utc_offset_minutes: config.utc_offset_minutes,
            features: config.features.clone(),
            webhook,
        }
    }
}

/// Source of the general settings, re-read for every generation.
///
/// A file-backed source keeps the last configuration that loaded cleanly and
/// falls back to it when the file is mid-edit or invalid.
pub struct ConfigSource {
    path: Option<PathBuf>,
    last_good: RwLock<AppConfig>,
}

impl ConfigSource {
    /// A source that never changes (tests, embedding).
    pub fn fixed(config: AppConfig) -> Self {
        Self {
            path: None,
            last_good: RwLock::new(config),
        }
    }

    /// A source backed by a config file with environment overrides.
    pub fn file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let mut config = AppConfig::load_from(&path)?;
        config.apply_env();
        Ok(Self {
            path: Some(path),
            last_good: RwLock::new(config),
        })
    }

    /// The current configuration.
    pub fn current(&self) -> AppConfig {
        if let Some(path) = &self.path {
            match AppConfig::load_from(path) {
                Ok(mut config) => {
                    config.apply_env();
                    let mut guard = self.last_good.write().unwrap_or_else(|e| e.into_inner());
                    *guard = config.clone();
                    return config;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Config reload failed, keeping previous settings");
                }
            }
        }
        self.last_good
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
