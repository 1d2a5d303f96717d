//! Subcommand implementations.

pub mod chat;
pub mod daemon;
pub mod doctor;
pub mod history;
pub mod init;

use parlor_agent::ChatEngine;
use parlor_config::ConfigSource;
use parlor_core::event::CompletionNotifier;
use parlor_providers::WebhookNotifier;
use std::path::Path;
use std::sync::Arc;

/// Build the engine from the config file at `path`, wired to the configured
/// provider and the webhook client.
pub fn build_engine(path: &Path) -> Result<ChatEngine, Box<dyn std::error::Error>> {
    let source = ConfigSource::file(path).map_err(|e| format!("Failed to load config: {e}"))?;
    let config = source.current();

    if !config.has_api_key() {
        tracing::warn!(
            provider = %config.provider,
            "No API key configured; set PARLOR_API_KEY unless the endpoint is local"
        );
    }

    let provider = parlor_providers::build_from_config(&config)?;
    let notifier: Arc<dyn CompletionNotifier> = Arc::new(WebhookNotifier::new()?);
    Ok(ChatEngine::with_notifier(source, provider, Some(notifier)))
}
