//! In-memory log backend, useful for testing and ephemeral personas.

use async_trait::async_trait;
use parlor_core::entry::ConversationEntry;
use parlor_core::error::StoreError;
use parlor_core::store::LogBackend;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A backend that keeps the "persisted" log in a shared Vec.
///
/// Clones share the same storage, so a test can keep a handle and inspect
/// what the store wrote.
#[derive(Clone, Default)]
pub struct InMemoryLog {
    entries: Arc<RwLock<Vec<ConversationEntry>>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing entries.
    pub fn with_entries(entries: Vec<ConversationEntry>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Snapshot of the stored entries.
    pub async fn snapshot(&self) -> Vec<ConversationEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl LogBackend for InMemoryLog {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self) -> Result<Vec<ConversationEntry>, StoreError> {
        Ok(self.entries.read().await.clone())
    }

    async fn append(&self, entry: &ConversationEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn rewrite(&self, entries: &[ConversationEntry]) -> Result<(), StoreError> {
        *self.entries.write().await = entries.to_vec();
        Ok(())
    }
}
