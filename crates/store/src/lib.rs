//! Persona storage for Parlor.
//!
//! Each persona owns a folder under the data directory:
//!
//! ```text
//! persona_{id}/
//!   talk.jsonl         conversation log, one entry per line
//!   memory.json        short persona memories
//!   system_prompt.txt  persona prompt
//!   persona.toml       persona settings
//!   project/           files the persona may read and write
//! ```
//!
//! Writers coordinate through `*.lock` markers next to the files they guard.

pub mod paths;
pub mod jsonl;
pub mod in_memory;
pub mod lock;
pub mod conversation;
pub mod memory;

pub use paths::{PersonaPaths, list_personas};
pub use jsonl::JsonlLog;
pub use in_memory::InMemoryLog;
pub use lock::{LockGuard, PersonaLock, recover_stale_locks};
pub use conversation::ConversationStore;
pub use memory::{MemoryItem, MemoryStore};
