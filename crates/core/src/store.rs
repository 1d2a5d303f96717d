//! Log storage abstraction.
//!
//! A [`LogBackend`] persists one persona's ordered entry sequence. The
//! conversation store keeps the in-memory mirror and decides when to append
//! and when to rewrite; backends only move bytes.

use async_trait::async_trait;
use crate::entry::ConversationEntry;
use crate::error::StoreError;

#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Backend name for logging (e.g., "jsonl", "memory").
    fn name(&self) -> &str;

    /// Load every entry in storage order.
    async fn load(&self) -> Result<Vec<ConversationEntry>, StoreError>;

    /// Durably append one entry at the end.
    async fn append(&self, entry: &ConversationEntry) -> Result<(), StoreError>;

    /// Replace the whole log with `entries`.
    async fn rewrite(&self, entries: &[ConversationEntry]) -> Result<(), StoreError>;
}
