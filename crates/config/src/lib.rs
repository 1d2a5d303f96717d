//! Configuration loading, validation, and management for Parlor.
//!
//! General settings load from `~/.parlor/config.toml` with environment
//! variable overrides; per-persona settings load from each persona's
//! `persona.toml`. A generation never reads either directly: it works from
//! an immutable [`GenerationSnapshot`] taken when it starts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub mod persona;
pub mod snapshot;

pub use persona::PersonaSettings;
pub use snapshot::{ConfigSource, GenerationSnapshot, WebhookTarget};

/// The root configuration structure.
///
/// Maps directly to `~/.parlor/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the LLM endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider name used in logs
    #[serde(default = "default_provider")]
    pub provider: String,

    /// OpenAI-compatible base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used when a persona does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Wall-clock limit of one generation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Ceiling for system prompt + history + overhead
    #[serde(default = "default_history_token_budget")]
    pub history_token_budget: usize,

    /// Allowance for tool schemas and automatic insertions
    #[serde(default = "default_context_overhead_tokens")]
    pub context_overhead_tokens: usize,

    /// Turns older than this many positions from the end lose their
    /// attachments; `0` or less keeps them all
    #[serde(default = "default_attachment_cutoff")]
    pub attachment_cutoff: i32,

    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    /// User messages in 8 hours before the rest reminder flag is raised
    #[serde(default = "default_break_reminder_threshold")]
    pub break_reminder_threshold: usize,

    /// Offset used when rendering timestamps and the current time
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Root of the persona folders (default `~/.parlor/data`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub timer: TimerConfig,

    #[serde(default)]
    pub lock: LockConfig,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_api_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "google/gemini-2.5-flash".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_timeout_secs() -> u64 {
    180
}
fn default_history_token_budget() -> usize {
    40_000
}
fn default_context_overhead_tokens() -> usize {
    200
}
fn default_attachment_cutoff() -> i32 {
    10
}
fn default_max_tool_iterations() -> u32 {
    30
}
fn default_break_reminder_threshold() -> usize {
    60
}
fn default_true() -> bool {
    true
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("history_token_budget", &self.history_token_budget)
            .field("context_overhead_tokens", &self.context_overhead_tokens)
            .field("attachment_cutoff", &self.attachment_cutoff)
            .field("max_tool_iterations", &self.max_tool_iterations)
            .field("break_reminder_threshold", &self.break_reminder_threshold)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .field("data_dir", &self.data_dir)
            .field("features", &self.features)
            .field("timer", &self.timer)
            .field("lock", &self.lock)
            .finish()
    }
}

/// Optional behaviors, all switchable from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Append `<timestamp>` to user-side turns
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Add `<current_time>` to the system prompt when timestamps are off
    #[serde(default = "default_true")]
    pub current_time: bool,

    /// Persona memories in the prompt and the `update_memory` tool
    #[serde(default = "default_true")]
    pub memory: bool,

    /// Conversation statistics and rest reminder in the prompt
    #[serde(default = "default_true")]
    pub statistics: bool,

    /// The `howto` tool
    #[serde(default = "default_true")]
    pub howto: bool,

    /// Project folder tools
    #[serde(default = "default_true")]
    pub project: bool,

    /// POST finished responses to the persona's webhook
    #[serde(default)]
    pub webhook: bool,

    /// Timer-driven generations
    #[serde(default)]
    pub timer: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            timestamps: true,
            current_time: true,
            memory: true,
            statistics: true,
            howto: true,
            project: true,
            webhook: false,
            timer: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Consecutive timer generations allowed without a user message
    #[serde(default = "default_timer_generate_limit")]
    pub generate_limit: u32,

    /// Text of the notice inserted before a timer generation
    #[serde(default = "default_timer_message")]
    pub message: String,

    /// How often the timer checks the personas
    #[serde(default = "default_timer_tick_secs")]
    pub tick_secs: u64,
}

fn default_timer_generate_limit() -> u32 {
    30
}
fn default_timer_message() -> String {
    "Timer event: you may talk to yourself freely or call tools.".into()
}
fn default_timer_tick_secs() -> u64 {
    60
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            generate_limit: default_timer_generate_limit(),
            message: default_timer_message(),
            tick_secs: default_timer_tick_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Delay between attempts while another holder owns the lock
    #[serde(default = "default_lock_poll_ms")]
    pub poll_interval_ms: u64,

    /// Total wait before giving up
    #[serde(default = "default_lock_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_lock_poll_ms() -> u64 {
    100
}
fn default_lock_timeout_secs() -> u64 {
    300
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_lock_poll_ms(),
            timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.parlor/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides.
    ///
    /// API key, first match wins when the file has none:
    /// - `PARLOR_API_KEY`
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn apply_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("PARLOR_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(url) = std::env::var("PARLOR_API_URL") {
            self.api_url = url;
        }

        if let Ok(model) = std::env::var("PARLOR_MODEL") {
            self.default_model = model;
        }

        if let Ok(dir) = std::env::var("PARLOR_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parlor")
    }

    /// Directory holding the persona folders.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("data"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.history_token_budget == 0 {
            return Err(ConfigError::ValidationError(
                "history_token_budget must be > 0".into(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("timeout_secs must be > 0".into()));
        }

        if self.lock.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "lock.poll_interval_ms must be > 0".into(),
            ));
        }

        if self.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::ValidationError(
                "utc_offset_minutes must be within ±1439".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: default_provider(),
            api_url: default_api_url(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            history_token_budget: default_history_token_budget(),
            context_overhead_tokens: default_context_overhead_tokens(),
            attachment_cutoff: default_attachment_cutoff(),
            max_tool_iterations: default_max_tool_iterations(),
            break_reminder_threshold: default_break_reminder_threshold(),
            utc_offset_minutes: 0,
            data_dir: None,
            features: FeatureConfig::default(),
            timer: TimerConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for parlor_core::Error {
    fn from(err: ConfigError) -> Self {
        parlor_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history_token_budget, 40_000);
        assert_eq!(config.timeout_secs, 180);
        assert_eq!(config.max_tool_iterations, 30);
        assert_eq!(config.attachment_cutoff, 10);
        assert_eq!(config.lock.poll_interval_ms, 100);
        assert!(!config.features.webhook);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.timer.generate_limit, config.timer.generate_limit);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            history_token_budget = 8000
            [features]
            webhook = true
            "#,
        )
        .unwrap();
        assert_eq!(parsed.history_token_budget, 8000);
        assert!(parsed.features.webhook);
        assert!(parsed.features.timestamps);
        assert_eq!(parsed.context_overhead_tokens, 200);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_budget_rejected() {
        let config = AppConfig {
            history_token_budget: 0,
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider, "openrouter");
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "temperature = \"hot\"").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn explicit_data_dir_wins() {
        let config = AppConfig {
            data_dir: Some(PathBuf::from("/srv/parlor")),
            ..AppConfig::default()
        };
        assert_eq!(config.data_dir(), PathBuf::from("/srv/parlor"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("openrouter"));
        assert!(toml_str.contains("40000"));
    }
}
