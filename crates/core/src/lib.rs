//! # Parlor Core
//!
//! Domain types, traits, and error definitions for the Parlor conversation
//! engine. Everything the other crates agree on lives here: the persisted
//! conversation entry, the outbound chat turn, and the seams to the LLM
//! provider, the tools, the log storage and the completion notifier.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in their
//! respective crates, which keeps the engine testable with scripted providers
//! and in-memory logs.

pub mod error;
pub mod persona;
pub mod entry;
pub mod token;
pub mod message;
pub mod provider;
pub mod tool;
pub mod store;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use persona::PersonaId;
pub use entry::{ConversationEntry, EntryDraft, EntryFields, EntryId, EntryRole, ToolDetail};
pub use message::{ChatTurn, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use store::LogBackend;
pub use event::{CompletionNotifier, EventBus, GenerationEvent};
