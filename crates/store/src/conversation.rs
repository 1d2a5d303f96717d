//! The conversation store: one persona's ordered, lockable log with an
//! in-memory mirror.
//!
//! Reads are served from the mirror. Every write goes to the backend first
//! and updates the mirror only after the backend accepted it, so the mirror
//! never shows an entry storage does not have.
//!
//! `append` and `upsert` are not serialized against each other. Callers that
//! read and then write based on what they read hold [`ConversationStore::lock`]
//! (or use [`ConversationStore::with_lock`]) around both.

use parlor_core::entry::{ConversationEntry, EntryDraft, EntryFields, EntryId};
use parlor_core::error::StoreError;
use parlor_core::store::LogBackend;
use parlor_core::token::entry_tokens;
use parlor_core::PersonaId;
use std::future::Future;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use crate::jsonl::JsonlLog;
use crate::lock::{LockGuard, PersonaLock};
use crate::paths::PersonaPaths;

pub struct ConversationStore {
    persona: PersonaId,
    backend: Box<dyn LogBackend>,
    mirror: RwLock<Vec<ConversationEntry>>,
    lock: PersonaLock,
}

impl ConversationStore {
    /// Open a store over `backend`, loading the mirror from it.
    pub async fn open(
        persona: PersonaId,
        backend: Box<dyn LogBackend>,
        lock: PersonaLock,
    ) -> Result<Self, StoreError> {
        let entries = backend.load().await?;
        info!(
            persona = %persona,
            backend = backend.name(),
            entries = entries.len(),
            "Conversation store opened"
        );
        Ok(Self {
            persona,
            backend,
            mirror: RwLock::new(entries),
            lock,
        })
    }

    /// Open the persona's `talk.jsonl` guarded by `talk.jsonl.lock`.
    pub async fn open_jsonl(persona: PersonaId, paths: &PersonaPaths, lock: PersonaLock) -> Result<Self, StoreError> {
        Self::open(persona, Box::new(JsonlLog::new(paths.talk_log())), lock).await
    }

    pub fn persona(&self) -> PersonaId {
        self.persona
    }

    fn materialize(id: EntryId, fields: EntryFields) -> ConversationEntry {
        let mut entry = ConversationEntry::from_fields(id, fields);
        entry.token_count = entry_tokens(&entry);
        entry
    }

    /// Append a new entry and return its fresh id.
    pub async fn append(&self, fields: EntryFields) -> Result<EntryId, StoreError> {
        let entry = Self::materialize(EntryId::new(), fields);
        let id = entry.id.clone();

        let mut mirror = self.mirror.write().await;
        self.backend.append(&entry).await?;
        mirror.push(entry);

        debug!(persona = %self.persona, entry_id = %id, "Entry appended");
        Ok(id)
    }

    /// Apply a draft. `New` appends; `Edit` overwrites the entry in place and
    /// discards everything after it.
    pub async fn upsert(&self, draft: EntryDraft) -> Result<EntryId, StoreError> {
        let (id, fields) = match draft {
            EntryDraft::New(fields) => return self.append(fields).await,
            EntryDraft::Edit { id, fields } => (id, fields),
        };

        let mut mirror = self.mirror.write().await;
        let index = mirror
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut fields = fields;
        if fields.timestamp.is_none() {
            fields.timestamp = Some(mirror[index].timestamp);
        }
        let entry = Self::materialize(id.clone(), fields);

        let mut updated: Vec<ConversationEntry> = mirror[..index].to_vec();
        updated.push(entry);
        let discarded = mirror.len() - updated.len();

        self.backend.rewrite(&updated).await?;
        *mirror = updated;

        debug!(persona = %self.persona, entry_id = %id, discarded, "Entry edited");
        Ok(id)
    }

    /// Entries `[start, start + count)` clamped to the log, or the last
    /// `count` entries when `start` is negative. Also returns the total.
    pub async fn read_range(&self, start: i64, count: usize) -> (Vec<ConversationEntry>, usize) {
        let mirror = self.mirror.read().await;
        let total = mirror.len();
        let from = if start < 0 {
            total.saturating_sub(count)
        } else {
            usize::try_from(start).unwrap_or(usize::MAX).min(total)
        };
        let to = from.saturating_add(count).min(total);
        (mirror[from..to].to_vec(), total)
    }

    /// The whole log, from the mirror.
    pub async fn read_all_cached(&self) -> Vec<ConversationEntry> {
        self.mirror.read().await.clone()
    }

    pub async fn get(&self, id: &EntryId) -> Option<ConversationEntry> {
        self.mirror.read().await.iter().find(|e| &e.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.mirror.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.mirror.read().await.is_empty()
    }

    /// Acquire the persona's log lock for as long as the guard lives.
    pub async fn lock(&self, cancel: &CancellationToken) -> Result<LockGuard, StoreError> {
        self.lock.acquire(cancel).await
    }

    /// Run `action` while holding the log lock. The lock is released on every
    /// exit path of `action`.
    pub async fn with_lock<F, Fut, T>(&self, cancel: &CancellationToken, action: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock.acquire(cancel).await?;
        Ok(action().await)
    }
}
