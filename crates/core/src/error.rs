//! Error types for the Parlor domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Parlor operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Conversation store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Outbound notification (webhook) ---
    #[error("Notification failed: {0}")]
    Notify(String),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Errors reported by an LLM provider.
///
/// Every variant maps onto an HTTP-like status code via [`ProviderError::status_code`],
/// which the generation orchestrator uses to classify failures.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request refused: {0}")]
    Forbidden(String),

    #[error("Insufficient credits or quota: {0}")]
    QuotaExceeded(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// The HTTP status this error corresponds to. `0` means the request never
    /// produced a response (network failure, broken stream).
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ApiError { status_code, .. } => *status_code,
            Self::RateLimited { .. } => 429,
            Self::AuthenticationFailed(_) => 401,
            Self::Forbidden(_) => 403,
            Self::QuotaExceeded(_) => 402,
            Self::ModelNotFound(_) => 404,
            Self::Timeout(_) => 408,
            Self::StreamInterrupted(_) | Self::Network(_) => 0,
            Self::NotConfigured(_) => 503,
        }
    }

    /// Map a non-success HTTP status and its body onto the matching variant.
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 => Self::AuthenticationFailed(message),
            402 => Self::QuotaExceeded(message),
            403 => Self::Forbidden(message),
            404 => Self::ModelNotFound(message),
            408 => Self::Timeout(message),
            429 => Self::RateLimited { retry_after_secs: 5 },
            _ => Self::ApiError {
                status_code,
                message,
            },
        }
    }
}

/// Errors raised by the conversation store and its lock.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Timed out after {waited_ms}ms waiting for lock {path}")]
    LockTimeout { path: String, waited_ms: u64 },

    #[error("Lock acquisition canceled: {0}")]
    Canceled(String),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 500,
            message: "upstream exploded".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("upstream exploded"));
    }

    #[test]
    fn status_codes_round_trip_through_from_status() {
        for code in [401u16, 402, 403, 404, 408, 429, 500, 502, 503] {
            assert_eq!(ProviderError::from_status(code, "x").status_code(), code);
        }
        assert_eq!(ProviderError::Network("dns".into()).status_code(), 0);
        assert_eq!(ProviderError::StreamInterrupted("eof".into()).status_code(), 0);
    }

    #[test]
    fn store_error_displays_lock_path() {
        let err = Error::Store(StoreError::LockTimeout {
            path: "persona_1/talk.jsonl.lock".into(),
            waited_ms: 30_000,
        });
        assert!(err.to_string().contains("talk.jsonl.lock"));
        assert!(err.to_string().contains("30000"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::PermissionDenied {
            tool_name: "write_project_file".into(),
            reason: "path escapes project folder".into(),
        });
        assert!(err.to_string().contains("write_project_file"));
        assert!(err.to_string().contains("escapes"));
    }
}
