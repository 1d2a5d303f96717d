//! Persona memories: short facts the persona keeps across a long history.
//!
//! Stored as a JSON array in `memory.json`, guarded by its own lock marker
//! so a memory update never waits on the conversation log.

use chrono::{DateTime, Utc};
use parlor_core::error::StoreError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use crate::lock::PersonaLock;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: u32,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct MemoryStore {
    path: PathBuf,
    lock: PersonaLock,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>, lock: PersonaLock) -> Self {
        Self {
            path: path.into(),
            lock,
        }
    }

    /// All memories in id order. A missing file is an empty list.
    pub async fn list(&self) -> Result<Vec<MemoryItem>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Storage(format!("Failed to read memories: {e}"))),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut items: Vec<MemoryItem> = serde_json::from_str(&content)
            .map_err(|e| StoreError::Storage(format!("Corrupted memory file: {e}")))?;
        items.sort_by_key(|m| m.id);
        Ok(items)
    }

    async fn save(&self, items: &[MemoryItem]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Storage(format!("Failed to create memory directory: {e}")))?;
        }
        let json = serde_json::to_string_pretty(items)
            .map_err(|e| StoreError::Storage(format!("Failed to serialize memories: {e}")))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write memories: {e}")))
    }

    /// Update memory `id`, or add a new one when `id` is 0 or unknown.
    /// Returns the id written.
    pub async fn upsert(&self, cancel: &CancellationToken, id: u32, text: &str) -> Result<u32, StoreError> {
        let _guard = self.lock.acquire(cancel).await?;
        let mut items = self.list().await?;
        let now = Utc::now();

        let written = match items.iter_mut().find(|m| id != 0 && m.id == id) {
            Some(item) => {
                item.text = text.to_string();
                item.updated_at = now;
                item.id
            }
            None => {
                let next = items.iter().map(|m| m.id).max().unwrap_or(0) + 1;
                items.push(MemoryItem {
                    id: next,
                    text: text.to_string(),
                    created_at: now,
                    updated_at: now,
                });
                next
            }
        };

        self.save(&items).await?;
        debug!(memory_id = written, "Memory written");
        Ok(written)
    }

    /// Delete memory `id`. Returns whether it existed.
    pub async fn remove(&self, cancel: &CancellationToken, id: u32) -> Result<bool, StoreError> {
        let _guard = self.lock.acquire(cancel).await?;
        let mut items = self.list().await?;
        let before = items.len();
        items.retain(|m| m.id != id);
        let removed = items.len() < before;
        if removed {
            self.save(&items).await?;
            debug!(memory_id = id, "Memory removed");
        }
        Ok(removed)
    }
}
