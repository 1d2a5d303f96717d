//! The engine facade: per-persona generation slots over one provider.
//!
//! Each persona gets a slot the first time it is touched: its conversation
//! store, memory store, status cell and timer state. At most one generation
//! runs per persona. Writes from callers go through the store lock, so they
//! queue behind a running generation instead of interleaving with it.

use chrono::{FixedOffset, Offset, Utc};
use parlor_config::{AppConfig, ConfigError, ConfigSource, GenerationSnapshot, PersonaSettings};
use parlor_core::entry::{ConversationEntry, EntryDraft, EntryFields, EntryId};
use parlor_core::error::StoreError;
use parlor_core::event::{CompletionNotifier, EventBus, GenerationEvent};
use parlor_core::provider::Provider;
use parlor_core::PersonaId;
use parlor_store::{ConversationStore, MemoryStore, PersonaLock, PersonaPaths, list_personas};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::orchestrator::{GenerationRun, Orchestrator, Outcome};
use crate::session::{GenerationSession, GenerationStatus, StatusCell, status_cell};
use crate::stats::{TalkStats, page_hash};
use crate::system_prompt::PromptParts;
use crate::timer::{TimerState, timer_notice};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("A generation is already running for persona {0}")]
    AlreadyGenerating(PersonaId),

    #[error("Persona {0} has no conversation history to answer")]
    EmptyHistory(PersonaId),

    #[error("The engine is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One page of a persona's history.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<ConversationEntry>,
    pub total: usize,
    pub stats: TalkStats,
    /// Hex SHA-256 of `entries`
    pub hash: String,
}

struct PersonaSlot {
    persona: PersonaId,
    paths: PersonaPaths,
    store: Arc<ConversationStore>,
    memory: Arc<MemoryStore>,
    status: StatusCell,
    active: StdMutex<Option<CancellationToken>>,
    timer: StdMutex<TimerState>,
}

impl PersonaSlot {
    fn is_generating(&self) -> bool {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    fn timer(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.timer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Clears the slot's active generation when the run task ends, however it
/// ends.
struct ActiveGuard(Arc<PersonaSlot>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = self.0.active.lock().unwrap_or_else(|e| e.into_inner());
        *active = None;
        self.0.status.send_replace(GenerationStatus::Idle);
    }
}

pub struct ChatEngine {
    data_dir: PathBuf,
    config: Arc<ConfigSource>,
    orchestrator: Arc<Orchestrator>,
    events: Arc<EventBus>,
    slots: Mutex<HashMap<PersonaId, Arc<PersonaSlot>>>,
    shutdown: CancellationToken,
}

impl ChatEngine {
    /// An engine storing personas under the configured data directory.
    pub fn new(config: ConfigSource, provider: Arc<dyn Provider>) -> Self {
        Self::with_notifier(config, provider, None)
    }

    /// Like [`ChatEngine::new`], posting finished responses through
    /// `notifier` for personas with a webhook.
    pub fn with_notifier(
        config: ConfigSource,
        provider: Arc<dyn Provider>,
        notifier: Option<Arc<dyn CompletionNotifier>>,
    ) -> Self {
        let data_dir = config.current().data_dir();
        // Markers left by a crashed process would block every writer
        match parlor_store::recover_stale_locks(&data_dir) {
            Ok(0) => {}
            Ok(recovered) => warn!(recovered, "Removed stale lock markers"),
            Err(e) => warn!(data_dir = %data_dir.display(), error = %e, "Stale lock sweep failed"),
        }
        let events = Arc::new(EventBus::default());
        let mut orchestrator = Orchestrator::new(provider, events.clone());
        if let Some(notifier) = notifier {
            orchestrator = orchestrator.with_notifier(notifier);
        }
        info!(data_dir = %data_dir.display(), "Chat engine ready");
        Self {
            data_dir,
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            events,
            slots: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn data_dir(&self) -> &std::path::Path {
        &self.data_dir
    }

    pub fn config(&self) -> AppConfig {
        self.config.current()
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        self.orchestrator.provider()
    }

    /// Receive every status event of every persona.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<GenerationEvent>> {
        self.events.subscribe()
    }

    pub fn personas(&self) -> std::io::Result<Vec<PersonaId>> {
        list_personas(&self.data_dir)
    }

    async fn slot(&self, persona: PersonaId) -> Result<Arc<PersonaSlot>, EngineError> {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get(&persona) {
            return Ok(slot.clone());
        }

        let config = self.config.current();
        let poll = Duration::from_millis(config.lock.poll_interval_ms);
        let wait = Duration::from_secs(config.lock.timeout_secs);
        let paths = PersonaPaths::new(&self.data_dir, persona);

        let talk_lock = PersonaLock::with_marker(PersonaPaths::lock_marker(&paths.talk_log())).with_timing(poll, wait);
        let store = ConversationStore::open_jsonl(persona, &paths, talk_lock).await?;
        let memory_lock = PersonaLock::with_marker(PersonaPaths::lock_marker(&paths.memory())).with_timing(poll, wait);
        let memory = MemoryStore::new(paths.memory(), memory_lock);

        let slot = Arc::new(PersonaSlot {
            persona,
            paths,
            store: Arc::new(store),
            memory: Arc::new(memory),
            status: status_cell(),
            active: StdMutex::new(None),
            timer: StdMutex::new(TimerState::new(Utc::now().timestamp())),
        });
        slots.insert(persona, slot.clone());
        Ok(slot)
    }

    fn snapshot(&self, slot: &PersonaSlot, config: &AppConfig) -> Result<GenerationSnapshot, EngineError> {
        let settings = PersonaSettings::load_from(&slot.paths.settings())?;
        Ok(GenerationSnapshot::resolve(slot.persona, config, &settings))
    }

    /// Start a generation for `persona` in the background.
    ///
    /// Fails with [`EngineError::AlreadyGenerating`] while one is running.
    /// Progress and the outcome arrive as events.
    pub async fn trigger_generation(&self, persona: PersonaId) -> Result<(), EngineError> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }
        let slot = self.slot(persona).await?;
        if slot.store.is_empty().await {
            return Err(EngineError::EmptyHistory(persona));
        }

        let config = self.config.current();
        let snapshot = self.snapshot(&slot, &config)?;

        let cancel = {
            let mut active = slot.active.lock().unwrap_or_else(|e| e.into_inner());
            if active.is_some() {
                return Err(EngineError::AlreadyGenerating(persona));
            }
            let token = self.shutdown.child_token();
            *active = Some(token.clone());
            slot.status.send_replace(GenerationStatus::Requesting);
            token
        };

        let tools = parlor_tools::persona_registry(
            &snapshot.features,
            &slot.paths,
            slot.memory.clone(),
            cancel.clone(),
        );
        let run = GenerationRun {
            snapshot,
            store: slot.store.clone(),
            memory: slot.memory.clone(),
            paths: slot.paths.clone(),
            tools,
        };
        let session = GenerationSession::new(persona, slot.status.clone(), cancel);
        let orchestrator = self.orchestrator.clone();

        debug!(persona = %persona, "Generation accepted");
        tokio::spawn(async move {
            let guard = ActiveGuard(slot);
            let outcome = orchestrator.run(run, session).await;
            if matches!(outcome, Outcome::Failed { .. }) {
                // A failure stops the timer until the user speaks again
                guard.0.timer().halt();
            }
            drop(guard);
        });
        Ok(())
    }

    /// Signal the running generation of `persona` to stop. Returns whether
    /// one was running.
    pub async fn cancel_generation(&self, persona: PersonaId) -> bool {
        let slot = self.slots.lock().await.get(&persona).cloned();
        let Some(slot) = slot else {
            return false;
        };
        let active = slot.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.as_ref() {
            Some(token) => {
                info!(persona = %persona, "Cancel requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Append a new entry or edit an existing one (discarding everything
    /// after it). Waits for a running generation to release the log.
    pub async fn append_or_edit_entry(&self, persona: PersonaId, draft: EntryDraft) -> Result<EntryId, EngineError> {
        let slot = self.slot(persona).await?;
        let store = slot.store.clone();
        let id = slot
            .store
            .with_lock(&self.shutdown, || async move { store.upsert(draft).await })
            .await??;
        Ok(id)
    }

    /// Write a user entry and answer it.
    ///
    /// The entry stays written even when the generation cannot start.
    pub async fn submit(&self, persona: PersonaId, draft: EntryDraft) -> Result<EntryId, EngineError> {
        let id = self.append_or_edit_entry(persona, draft).await?;
        let slot = self.slot(persona).await?;
        slot.timer().reset(Utc::now().timestamp());
        self.trigger_generation(persona).await?;
        Ok(id)
    }

    /// Entries `[index, index + count)`, or the last `count` when `index` is
    /// negative, with the persona's statistics.
    pub async fn read_history(&self, persona: PersonaId, index: i64, count: usize) -> Result<HistoryPage, EngineError> {
        let slot = self.slot(persona).await?;
        let (entries, total) = slot.store.read_range(index, count).await;

        let config = self.config.current();
        let snapshot = self.snapshot(&slot, &config)?;
        let offset = FixedOffset::east_opt(snapshot.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        let parts = PromptParts::gather(&slot.paths, &slot.memory, &snapshot.features, offset).await?;
        let all = slot.store.read_all_cached().await;
        let stats = TalkStats::compute(
            &all,
            &parts.persona_prompt,
            &parts.render(None),
            &snapshot,
            Utc::now().timestamp(),
        );

        let hash = page_hash(&entries);
        Ok(HistoryPage {
            entries,
            total,
            stats,
            hash,
        })
    }

    /// Current status of `persona`.
    pub async fn status(&self, persona: PersonaId) -> GenerationStatus {
        match self.slots.lock().await.get(&persona) {
            Some(slot) => *slot.status.borrow(),
            None => GenerationStatus::Idle,
        }
    }

    /// Wait until `persona` has no generation running.
    pub async fn wait_idle(&self, persona: PersonaId) {
        let slot = self.slots.lock().await.get(&persona).cloned();
        let Some(slot) = slot else {
            return;
        };
        let mut rx = slot.status.subscribe();
        // The sender lives in the slot, which we hold
        let _ = rx.wait_for(|s| *s == GenerationStatus::Idle).await;
    }

    /// Run one timer pass at `now` over every persona on disk. Returns the
    /// personas a timer generation was started for.
    pub async fn tick_timers(&self, now: i64) -> Vec<PersonaId> {
        let config = self.config.current();
        if !config.features.timer || self.shutdown.is_cancelled() {
            return Vec::new();
        }

        let personas = match self.personas() {
            Ok(personas) => personas,
            Err(e) => {
                warn!(error = %e, "Failed to list personas for the timer");
                return Vec::new();
            }
        };

        let mut started = Vec::new();
        for persona in personas {
            match self.tick_persona(persona, &config, now).await {
                Ok(true) => started.push(persona),
                Ok(false) => {}
                Err(e) => warn!(persona = %persona, error = %e, "Timer generation failed to start"),
            }
        }
        started
    }

    async fn tick_persona(&self, persona: PersonaId, config: &AppConfig, now: i64) -> Result<bool, EngineError> {
        let slot = self.slot(persona).await?;
        let settings = PersonaSettings::load_from(&slot.paths.settings())?;
        let due = slot.timer().poll(
            now,
            settings.timer_cycle_minutes,
            config.timer.generate_limit,
            slot.is_generating(),
        );
        if !due {
            return Ok(false);
        }

        let consecutive = slot.timer().consecutive;
        info!(
            persona = %persona,
            consecutive,
            cycle_minutes = settings.timer_cycle_minutes,
            "Timer generation"
        );
        let notice = EntryFields::system_notice(timer_notice(&config.timer.message));
        self.append_or_edit_entry(persona, EntryDraft::New(notice)).await?;
        self.trigger_generation(persona).await?;
        Ok(true)
    }

    /// Cancel every running generation and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down chat engine");
        self.shutdown.cancel();
        let slots: Vec<_> = self.slots.lock().await.values().cloned().collect();
        for slot in slots {
            let mut rx = slot.status.subscribe();
            let _ = rx.wait_for(|s| *s == GenerationStatus::Idle).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, Step, make_tool_call, text_reply, tool_round};
    use parlor_core::entry::EntryRole;
    use parlor_core::error::ProviderError;

    fn engine(dir: &tempfile::TempDir, provider: Arc<ScriptedProvider>, config: AppConfig) -> ChatEngine {
        let config = AppConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..config
        };
        ChatEngine::new(ConfigSource::fixed(config), provider)
    }

    async fn next_terminal(rx: &mut broadcast::Receiver<Arc<GenerationEvent>>) -> GenerationEvent {
        loop {
            let event = rx.recv().await.unwrap();
            if event.is_terminal() {
                return event.as_ref().clone();
            }
        }
    }

    #[tokio::test]
    async fn submit_generates_and_returns_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![text_reply("Hello back!")]));
        let engine = engine(&dir, provider, AppConfig::default());
        let mut rx = engine.subscribe();

        let persona = PersonaId(1);
        engine
            .submit(persona, EntryDraft::New(EntryFields::user("hello")))
            .await
            .unwrap();
        let terminal = next_terminal(&mut rx).await;
        assert_eq!(terminal.status(), "completed");

        engine.wait_idle(persona).await;
        assert_eq!(engine.status(persona).await, GenerationStatus::Idle);

        let page = engine.read_history(persona, -1, 10).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.entries[1].text, "Hello back!");
        assert_eq!(page.stats.total, 2);
        assert_eq!(page.stats.user_last_8h, 1);
        assert_eq!(page.hash, page_hash(&page.entries));

        // Persisted to the persona folder
        assert!(dir.path().join("persona_1").join("talk.jsonl").exists());
    }

    #[tokio::test]
    async fn second_trigger_is_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![Step::Stall]));
        let engine = engine(&dir, provider, AppConfig::default());
        let persona = PersonaId(1);

        engine
            .submit(persona, EntryDraft::New(EntryFields::user("hello")))
            .await
            .unwrap();
        let err = engine.trigger_generation(persona).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyGenerating(p) if p == persona));
        assert!(engine.status(persona).await.is_active());

        assert!(engine.cancel_generation(persona).await);
        engine.wait_idle(persona).await;
        assert!(!engine.cancel_generation(persona).await);
        // Canceling wrote nothing
        assert_eq!(engine.read_history(persona, 0, 10).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn empty_history_is_not_triggered() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let engine = engine(&dir, provider.clone(), AppConfig::default());

        let err = engine.trigger_generation(PersonaId(4)).await.unwrap_err();
        assert!(matches!(err, EngineError::EmptyHistory(_)));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn edit_truncates_and_regenerates() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![text_reply("first"), text_reply("second")]));
        let engine = engine(&dir, provider, AppConfig::default());
        let persona = PersonaId(2);
        let mut rx = engine.subscribe();

        let id = engine
            .submit(persona, EntryDraft::New(EntryFields::user("question")))
            .await
            .unwrap();
        next_terminal(&mut rx).await;
        engine.wait_idle(persona).await;

        engine
            .submit(
                persona,
                EntryDraft::Edit {
                    id: id.clone(),
                    fields: EntryFields::user("better question"),
                },
            )
            .await
            .unwrap();
        next_terminal(&mut rx).await;
        engine.wait_idle(persona).await;

        let page = engine.read_history(persona, 0, 10).await.unwrap();
        let texts: Vec<_> = page.entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["better question", "second"]);
        assert_eq!(page.entries[0].id, id);
    }

    #[tokio::test]
    async fn failed_generation_halts_the_timer() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Step::Reject(ProviderError::from_status(500, "boom")),
            text_reply("timer reply"),
        ]));
        let mut config = AppConfig::default();
        config.features.timer = true;
        let engine = engine(&dir, provider, config);
        let persona = PersonaId(3);
        let mut rx = engine.subscribe();

        let paths = PersonaPaths::new(dir.path(), persona);
        std::fs::create_dir_all(paths.root()).unwrap();
        PersonaSettings {
            timer_cycle_minutes: 1,
            ..PersonaSettings::default()
        }
        .save_to(&paths.settings())
        .unwrap();

        engine
            .submit(persona, EntryDraft::New(EntryFields::user("hi")))
            .await
            .unwrap();
        assert_eq!(next_terminal(&mut rx).await.status(), "failed");
        engine.wait_idle(persona).await;

        let later = Utc::now().timestamp() + 3600;
        assert!(engine.tick_timers(later).await.is_empty());

        // The user speaking again re-arms it
        engine
            .append_or_edit_entry(persona, EntryDraft::New(EntryFields::user("again")))
            .await
            .unwrap();
        engine.slot(persona).await.unwrap().timer().reset(Utc::now().timestamp());
        assert_eq!(engine.tick_timers(later).await, vec![persona]);
        assert_eq!(next_terminal(&mut rx).await.status(), "completed");
        engine.wait_idle(persona).await;

        let entries = engine.read_history(persona, -1, 100).await.unwrap().entries;
        let notice = entries.iter().rev().find(|e| e.role == EntryRole::SystemNotice).unwrap();
        assert!(notice.text.starts_with("<system>Timer event"));
    }

    #[tokio::test]
    async fn timer_is_off_without_feature() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let engine = engine(&dir, provider, AppConfig::default());
        std::fs::create_dir_all(dir.path().join("persona_1")).unwrap();
        assert!(engine.tick_timers(Utc::now().timestamp() + 86_400).await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_cancels_running_generations() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![Step::Stall]));
        let engine = engine(&dir, provider, AppConfig::default());
        let mut rx = engine.subscribe();

        engine
            .submit(PersonaId(1), EntryDraft::New(EntryFields::user("hello")))
            .await
            .unwrap();
        engine.shutdown().await;
        assert_eq!(next_terminal(&mut rx).await.status(), "canceled");
        assert!(matches!(
            engine.trigger_generation(PersonaId(1)).await,
            Err(EngineError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn stale_lock_markers_are_swept_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("persona_1").join("talk.jsonl.lock");
        std::fs::create_dir_all(marker.parent().unwrap()).unwrap();
        std::fs::write(&marker, "").unwrap();

        let mut config = AppConfig::default();
        config.lock.timeout_secs = 1;
        let provider = Arc::new(ScriptedProvider::new(vec![text_reply("Still here.")]));
        let engine = engine(&dir, provider, config);
        assert!(!marker.exists());
        let mut rx = engine.subscribe();

        engine
            .submit(PersonaId(1), EntryDraft::New(EntryFields::user("are you there?")))
            .await
            .unwrap();
        assert_eq!(next_terminal(&mut rx).await.status(), "completed");
    }

    #[tokio::test]
    async fn cancel_reaches_a_tool_waiting_on_a_lock() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_round(
                "",
                vec![make_tool_call("m1", "update_memory", serde_json::json!({"content": "likes tea"}))],
            ),
            text_reply("Noted."),
        ]));
        let mut config = AppConfig::default();
        config.lock.timeout_secs = 60;
        let engine = engine(&dir, provider, config);
        let persona = PersonaId(1);
        let mut rx = engine.subscribe();

        // Another process owns the memory file
        let marker = dir.path().join("persona_1").join("memory.json.lock");
        std::fs::create_dir_all(marker.parent().unwrap()).unwrap();
        std::fs::write(&marker, "").unwrap();

        engine
            .submit(persona, EntryDraft::New(EntryFields::user("I like tea")))
            .await
            .unwrap();
        loop {
            let event = rx.recv().await.unwrap();
            if matches!(&*event, GenerationEvent::ToolUpdate { .. }) {
                break;
            }
        }
        assert!(engine.cancel_generation(persona).await);

        let terminal = tokio::time::timeout(Duration::from_secs(5), next_terminal(&mut rx))
            .await
            .unwrap();
        assert_eq!(terminal.status(), "canceled");
        engine.wait_idle(persona).await;

        let entries = engine.read_history(persona, 0, 10).await.unwrap().entries;
        let roles: Vec<_> = entries.iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![EntryRole::User, EntryRole::Tool]);
        assert!(entries[1].text.ends_with("failed."));
        assert!(marker.exists());
    }
}
