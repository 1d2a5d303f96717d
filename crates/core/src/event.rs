//! Generation status events and the completion notifier seam.
//!
//! Observers (a UI socket, the CLI) subscribe to the [`EventBus`] and receive
//! every status transition of every persona's generation. Publishing never
//! blocks and never fails; a slow subscriber only loses its own backlog.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use crate::entry::EntryId;
use crate::persona::PersonaId;

/// A status transition of one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// A generation was accepted and is about to request the model.
    Started { persona: PersonaId },

    /// A text delta arrived; `text` is everything accumulated so far.
    Generating { persona: PersonaId, text: String },

    /// A tool entry was written (pending or finished).
    ToolUpdate {
        persona: PersonaId,
        entry_id: EntryId,
        text: String,
    },

    /// The final assistant entry was persisted.
    Completed {
        persona: PersonaId,
        entry_id: EntryId,
        text: String,
    },

    /// The generation was canceled; `text` is the partial response.
    Canceled { persona: PersonaId, text: String },

    /// The generation ended in a failure notice.
    Failed { persona: PersonaId, reason: String },
}

impl GenerationEvent {
    pub fn persona(&self) -> PersonaId {
        match self {
            Self::Started { persona }
            | Self::Generating { persona, .. }
            | Self::ToolUpdate { persona, .. }
            | Self::Completed { persona, .. }
            | Self::Canceled { persona, .. }
            | Self::Failed { persona, .. } => *persona,
        }
    }

    /// The event status string (for wire protocols and logging).
    pub fn status(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Generating { .. } => "generating",
            Self::ToolUpdate { .. } => "tool_update",
            Self::Completed { .. } => "completed",
            Self::Canceled { .. } => "canceled",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether this event ends a generation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Canceled { .. } | Self::Failed { .. }
        )
    }
}

/// A broadcast-based event bus for generation events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<GenerationEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: GenerationEvent) {
        tracing::trace!(persona = %event.persona(), status = event.status(), "Publishing generation event");
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<GenerationEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Best-effort outbound notification of a finished response (e.g. a webhook).
///
/// `body` is already rendered for the endpoint. Failures are reported to the
/// caller, which only logs them.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify(&self, persona: PersonaId, endpoint: &str, body: String) -> crate::Result<()>;
}
