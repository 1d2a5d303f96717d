//! Failure classification and the notices persisted for each failure.
//!
//! Every failure that ends a generation is written to the log as a
//! `SystemNotice` so the user sees what went wrong next to the message that
//! caused it. The diagnosis goes in the entry text and the raw error in its
//! reasoning.

use parlor_core::error::ProviderError;

const NOTICE_HEADER: &str = "[Parlor system error]";

/// Budgets below this are almost certainly a configuration mistake.
pub const SMALL_BUDGET_WARNING: usize = 32_000;

/// Provider failures grouped by the HTTP status that reported them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    MalformedRequest,
    Auth,
    Quota,
    Forbidden,
    ModelNotFound,
    Timeout,
    RateLimited,
    ServerError,
    BadGateway,
    NoProvider,
    Unknown,
}

impl FailureKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            0 => Self::Network,
            400 => Self::MalformedRequest,
            401 => Self::Auth,
            402 => Self::Quota,
            403 => Self::Forbidden,
            404 => Self::ModelNotFound,
            408 => Self::Timeout,
            429 => Self::RateLimited,
            500 => Self::ServerError,
            502 => Self::BadGateway,
            503 => Self::NoProvider,
            _ => Self::Unknown,
        }
    }

    /// A hint telling the user what most likely went wrong.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Could not reach the network. Check the endpoint URL.",
            Self::MalformedRequest => "The request was malformed.",
            Self::Auth => "Authentication failed. The API key may be invalid.",
            Self::Quota => "Insufficient credits.",
            Self::Forbidden => {
                "Not permitted. The URL may be wrong, or the input was judged harmful."
            }
            Self::ModelNotFound => "The model was not found.",
            Self::Timeout => "The request timed out.",
            Self::RateLimited => "Too many requests.",
            Self::ServerError => "The server had an internal error.",
            Self::BadGateway => {
                "Communication failed. The model may be down or returned an invalid response."
            }
            Self::NoProvider => {
                "No provider satisfies the request. Review the routing and model settings."
            }
            Self::Unknown => "An unknown communication error occurred.",
        }
    }
}

/// Why a generation ended in `Failed`.
#[derive(Debug, Clone)]
pub enum GenerationFailure {
    /// The provider rejected the request or the stream broke.
    Provider(ProviderError),

    /// The model kept calling tools past the iteration limit.
    ToolLoopLimit(u32),

    /// Not a single history entry fits next to the system prompt.
    BudgetExhausted {
        budget: usize,
        built_prompt_tokens: usize,
        raw_prompt_tokens: usize,
    },

    /// Anything else (storage I/O, a broken invariant).
    Internal(String),
}

impl GenerationFailure {
    /// Short reason carried by the `failed` event.
    pub fn reason(&self) -> String {
        match self {
            Self::Provider(e) => e.to_string(),
            Self::ToolLoopLimit(limit) => format!("tool loop exceeded {limit} iterations"),
            Self::BudgetExhausted { budget, .. } => {
                format!("no history fits the token budget of {budget}")
            }
            Self::Internal(reason) => reason.clone(),
        }
    }

    /// The notice text and the raw error stored as its reasoning.
    pub fn notice(&self) -> (String, Option<String>) {
        match self {
            Self::Provider(e) => {
                let status = e.status_code();
                let text = format!(
                    "{NOTICE_HEADER}\nAn error occurred during generation and processing was interrupted.\nYou can retry by editing and resending.\nReason: {status} {}",
                    FailureKind::from_status(status).description()
                );
                (text, Some(e.to_string()))
            }
            Self::ToolLoopLimit(limit) => {
                let text = format!(
                    "{NOTICE_HEADER}\nThe model called tools more than {limit} times in a row and processing was stopped.\nYou can retry by editing and resending."
                );
                (text, Some(self.reason()))
            }
            Self::BudgetExhausted {
                budget,
                built_prompt_tokens,
                raw_prompt_tokens,
            } => {
                let warning = if *budget < SMALL_BUDGET_WARNING {
                    "Warning: the token budget is below 32K, which looks like a configuration mistake.\n\n"
                } else {
                    ""
                };
                let text = format!(
                    "{NOTICE_HEADER}\nThe whole conversation history was cut off, so nothing can be sent to the model.\n\n\
                     The token budget (history_token_budget) is too low, or the system prompt or memories are too large \
                     (too many tools, too many project files or a huge last message can also cause this).\n\
                     If the budget cannot be raised, turning off unneeded features often helps.\n\n\
                     + Token budget (history_token_budget): {budget}\n\
                     + Built system prompt tokens: {built_prompt_tokens}\n\
                     + Of which the persona prompt: {raw_prompt_tokens}\n\n\
                     {warning}Unless the last message is huge, deleting or recreating the history will not fix this. \
                     Adjust one of the settings above."
                );
                (text, None)
            }
            Self::Internal(reason) => {
                let text = format!(
                    "{NOTICE_HEADER}\nAn unexpected error occurred and processing was interrupted.\nYou can retry by editing and resending."
                );
                (text, Some(reason.clone()))
            }
        }
    }
}

impl From<ProviderError> for GenerationFailure {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}
