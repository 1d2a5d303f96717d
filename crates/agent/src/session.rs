//! The live state of one generation.

use parlor_core::PersonaId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Where a persona's generation currently is.
///
/// `Idle -> Requesting -> Streaming -> {ExecutingTool -> Requesting}* ->
/// {Completed | Canceled | Failed} -> Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    #[default]
    Idle,
    Requesting,
    Streaming,
    ExecutingTool,
    Completed,
    Canceled,
    Failed,
}

impl GenerationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Canceled | Self::Failed)
    }

    /// Whether a generation is running (anything but idle or finished).
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle) && !self.is_terminal()
    }
}

/// Shared status cell of one persona. Observers hold receivers from
/// [`watch::Sender::subscribe`].
pub type StatusCell = Arc<watch::Sender<GenerationStatus>>;

pub fn status_cell() -> StatusCell {
    Arc::new(watch::Sender::new(GenerationStatus::Idle))
}

/// One generation: status, accumulated response, tool-loop counter and its
/// cancellation signal. Owned by the orchestrator for the run's duration.
pub struct GenerationSession {
    persona: PersonaId,
    status: StatusCell,
    cancel: CancellationToken,
    /// Response text of the current request round
    pub text: String,
    /// Completed tool rounds
    pub iteration: u32,
}

impl GenerationSession {
    pub fn new(persona: PersonaId, status: StatusCell, cancel: CancellationToken) -> Self {
        Self {
            persona,
            status,
            cancel,
            text: String::new(),
            iteration: 0,
        }
    }

    pub fn persona(&self) -> PersonaId {
        self.persona
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn status(&self) -> GenerationStatus {
        *self.status.borrow()
    }

    pub fn set_status(&self, status: GenerationStatus) {
        trace!(persona = %self.persona, ?status, "Generation status");
        self.status.send_replace(status);
    }
}
