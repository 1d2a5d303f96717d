//! LLM provider and outbound notification clients for Parlor.
//!
//! All providers implement the `parlor_core::Provider` trait. Every backend
//! Parlor talks to exposes an OpenAI-compatible `/chat/completions` endpoint,
//! so a single client covers OpenRouter, OpenAI, Ollama and friends.

pub mod openai_compat;
pub mod webhook;

pub use openai_compat::OpenAiCompatProvider;
pub use webhook::WebhookNotifier;

use parlor_config::AppConfig;
use parlor_core::error::ProviderError;
use parlor_core::provider::Provider;
use std::sync::Arc;

/// Build the configured provider.
///
/// A missing API key is only accepted for endpoints on the local machine.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let base_url = if config.api_url.trim().is_empty() {
        default_base_url(&config.provider)
    } else {
        config.api_url.clone()
    };

    let api_key = match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => key.to_string(),
        None if is_local(&base_url) => String::new(),
        None => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{}'",
                config.provider
            )));
        }
    };

    let provider = OpenAiCompatProvider::new(&config.provider, &base_url, api_key)?;
    Ok(Arc::new(provider))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "https://openrouter.ai/api/v1".into(),
    }
}

fn is_local(base_url: &str) -> bool {
    let rest = base_url
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    rest.starts_with("localhost") || rest.starts_with("127.0.0.1") || rest.starts_with("[::1]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn missing_key_is_not_configured() {
        let config = AppConfig::default();
        let err = build_from_config(&config).err().unwrap();
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn local_endpoint_needs_no_key() {
        let config = AppConfig {
            provider: "ollama".into(),
            api_url: "http://localhost:11434/v1".into(),
            ..AppConfig::default()
        };
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn build_with_key() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        assert_eq!(build_from_config(&config).unwrap().name(), "openrouter");
    }
}
