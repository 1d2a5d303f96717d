//! The generation orchestrator: one persona turn from lock to terminal
//! status.
//!
//! A run holds the persona's log lock for its whole duration. Each request
//! round rebuilds the context from the store, streams the model's reply and,
//! when the model asks for tools, writes a tool entry per call before looping
//! back. Every run ends in exactly one terminal event (`completed`,
//! `canceled` or `failed`), and failures are persisted as notices.

use chrono::{FixedOffset, Offset, Utc};
use parlor_config::GenerationSnapshot;
use parlor_core::entry::{EntryDraft, EntryFields, EntryId, ToolDetail};
use parlor_core::error::StoreError;
use parlor_core::event::{CompletionNotifier, EventBus, GenerationEvent};
use parlor_core::message::ChatTurn;
use parlor_core::provider::{Provider, ProviderRequest};
use parlor_core::token::{estimate_tokens, trim_to_budget};
use parlor_core::tool::{ToolCall, ToolRegistry};
use parlor_store::{ConversationStore, MemoryStore, PersonaPaths};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::context::build_turns;
use crate::failure::GenerationFailure;
use crate::reasoning::split_reasoning;
use crate::session::{GenerationSession, GenerationStatus};
use crate::stats::TalkStats;
use crate::system_prompt::PromptParts;

/// Everything one run works on. Built by the engine when the generation is
/// accepted.
pub struct GenerationRun {
    pub snapshot: GenerationSnapshot,
    pub store: Arc<ConversationStore>,
    pub memory: Arc<MemoryStore>,
    pub paths: PersonaPaths,
    pub tools: ToolRegistry,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { entry_id: EntryId, text: String },
    Canceled { text: String },
    Failed { reason: String },
}

/// Why a run stopped before completing.
enum Interrupt {
    Canceled,
    Failed(GenerationFailure),
}

impl From<GenerationFailure> for Interrupt {
    fn from(f: GenerationFailure) -> Self {
        Self::Failed(f)
    }
}

impl From<StoreError> for Interrupt {
    fn from(e: StoreError) -> Self {
        Self::Failed(GenerationFailure::Internal(e.to_string()))
    }
}

/// A finished request round.
struct Round {
    text: String,
    tool_calls: Vec<ToolCall>,
}

pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    events: Arc<EventBus>,
    notifier: Option<Arc<dyn CompletionNotifier>>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>, events: Arc<EventBus>) -> Self {
        Self {
            provider,
            events,
            notifier: None,
        }
    }

    /// Post finished responses through `notifier` when the persona has a
    /// webhook configured.
    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Run one generation to its terminal state. Never fails: every error is
    /// turned into a notice and a `failed` event.
    pub async fn run(&self, run: GenerationRun, mut session: GenerationSession) -> Outcome {
        let persona = session.persona();
        session.set_status(GenerationStatus::Requesting);

        let _guard = match run.store.lock(session.cancel_token()).await {
            Ok(guard) => guard,
            Err(StoreError::Canceled(_)) => {
                return self.finish_canceled(&session, String::new());
            }
            Err(e) => {
                // Without the lock the notice cannot be written safely
                warn!(persona = %persona, error = %e, "Could not acquire the conversation lock");
                let reason = e.to_string();
                session.set_status(GenerationStatus::Failed);
                self.events.publish(GenerationEvent::Failed {
                    persona,
                    reason: reason.clone(),
                });
                return Outcome::Failed { reason };
            }
        };

        info!(persona = %persona, model = %run.snapshot.model, "Generation started");
        self.events.publish(GenerationEvent::Started { persona });

        match self.generate(&run, &mut session).await {
            Ok((entry_id, text)) => {
                session.set_status(GenerationStatus::Completed);
                info!(persona = %persona, entry_id = %entry_id, "Generation completed");
                self.events.publish(GenerationEvent::Completed {
                    persona,
                    entry_id: entry_id.clone(),
                    text: text.clone(),
                });
                self.notify_completion(&run.snapshot, &text);
                Outcome::Completed { entry_id, text }
            }
            Err(Interrupt::Canceled) => {
                let partial = std::mem::take(&mut session.text);
                self.finish_canceled(&session, partial)
            }
            Err(Interrupt::Failed(failure)) => self.finish_failed(&run, &session, failure).await,
        }
    }

    fn finish_canceled(&self, session: &GenerationSession, text: String) -> Outcome {
        let persona = session.persona();
        info!(persona = %persona, "Generation canceled");
        session.set_status(GenerationStatus::Canceled);
        self.events.publish(GenerationEvent::Canceled {
            persona,
            text: text.clone(),
        });
        Outcome::Canceled { text }
    }

    async fn finish_failed(
        &self,
        run: &GenerationRun,
        session: &GenerationSession,
        failure: GenerationFailure,
    ) -> Outcome {
        let persona = session.persona();
        let reason = failure.reason();
        warn!(persona = %persona, reason = %reason, "Generation failed");

        let (text, raw) = failure.notice();
        let mut notice = EntryFields::system_notice(text);
        if let Some(raw) = raw {
            notice = notice.with_reasoning(raw);
        }
        if let Err(e) = run.store.append(notice).await {
            warn!(persona = %persona, error = %e, "Failed to persist failure notice");
        }

        session.set_status(GenerationStatus::Failed);
        self.events.publish(GenerationEvent::Failed {
            persona,
            reason: reason.clone(),
        });
        Outcome::Failed { reason }
    }

    /// The request/tool loop under one deadline of `snapshot.timeout` that
    /// spans every round and tool call. Returns the persisted final entry.
    async fn generate(
        &self,
        run: &GenerationRun,
        session: &mut GenerationSession,
    ) -> Result<(EntryId, String), Interrupt> {
        let deadline = session.cancel_token().child_token();
        let timer = {
            let token = deadline.clone();
            let timeout = run.snapshot.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                token.cancel();
            })
        };

        let result = self.request_loop(run, session, &deadline).await;
        timer.abort();

        if matches!(result, Err(Interrupt::Canceled)) && !session.is_cancelled() {
            warn!(
                persona = %session.persona(),
                timeout_secs = run.snapshot.timeout.as_secs(),
                "Generation timed out"
            );
        }
        result
    }

    async fn request_loop(
        &self,
        run: &GenerationRun,
        session: &mut GenerationSession,
        deadline: &CancellationToken,
    ) -> Result<(EntryId, String), Interrupt> {
        let snapshot = &run.snapshot;
        let offset = FixedOffset::east_opt(snapshot.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        let definitions = run.tools.definitions();

        loop {
            if deadline.is_cancelled() {
                return Err(Interrupt::Canceled);
            }
            session.set_status(GenerationStatus::Requesting);

            let messages = self.build_messages(run, offset).await?;
            let request = ProviderRequest {
                model: snapshot.model.clone(),
                messages,
                temperature: snapshot.temperature,
                max_tokens: Some(snapshot.max_tokens),
                tools: definitions.clone(),
                stream: true,
                stop: vec![],
            };

            let round = self.read_stream(request, session, deadline).await?;

            if round.tool_calls.is_empty() {
                let (text, reasoning) = split_reasoning(&round.text);
                let mut fields = EntryFields::assistant(text.clone());
                if let Some(reasoning) = reasoning {
                    fields = fields.with_reasoning(reasoning);
                }
                let entry_id = run.store.append(fields).await?;
                return Ok((entry_id, text));
            }

            self.flush_text(run, session, round.text).await?;

            session.iteration += 1;
            if session.iteration > snapshot.max_tool_iterations {
                return Err(GenerationFailure::ToolLoopLimit(snapshot.max_tool_iterations).into());
            }
            debug!(
                persona = %session.persona(),
                iteration = session.iteration,
                tool_count = round.tool_calls.len(),
                "Executing tool calls"
            );

            for call in &round.tool_calls {
                if deadline.is_cancelled() {
                    return Err(Interrupt::Canceled);
                }
                self.execute_tool(run, session, call).await?;
            }
        }
    }

    /// System prompt plus the trimmed, merged history.
    async fn build_messages(&self, run: &GenerationRun, offset: FixedOffset) -> Result<Vec<ChatTurn>, Interrupt> {
        let snapshot = &run.snapshot;
        let parts = PromptParts::gather(&run.paths, &run.memory, &snapshot.features, offset).await?;
        let entries = run.store.read_all_cached().await;
        if entries.is_empty() {
            return Err(GenerationFailure::Internal("conversation history is empty".into()).into());
        }

        let counting_prompt = parts.render(None);
        let stats = TalkStats::compute(
            &entries,
            &parts.persona_prompt,
            &counting_prompt,
            snapshot,
            Utc::now().timestamp(),
        );
        let system_prompt = parts.render(Some(&stats));

        let window = trim_to_budget(
            estimate_tokens(&system_prompt),
            &entries,
            snapshot.overhead_tokens,
            snapshot.token_budget,
        );
        if window.is_empty() {
            return Err(GenerationFailure::BudgetExhausted {
                budget: snapshot.token_budget,
                built_prompt_tokens: stats.built_system_prompt_tokens,
                raw_prompt_tokens: stats.raw_system_prompt_tokens,
            }
            .into());
        }
        debug!(
            persona = %snapshot.persona,
            total = entries.len(),
            window = window.len(),
            "History trimmed"
        );

        let timestamps = snapshot.features.timestamps.then_some(offset);
        let mut messages = vec![ChatTurn::system(system_prompt)];
        messages.extend(build_turns(window, snapshot.attachment_cutoff, timestamps));
        Ok(messages)
    }

    /// Send one request and read its stream to the end.
    async fn read_stream(
        &self,
        request: ProviderRequest,
        session: &mut GenerationSession,
        cancel: &CancellationToken,
    ) -> Result<Round, Interrupt> {
        session.text.clear();
        let opened = tokio::select! {
            _ = cancel.cancelled() => return Err(Interrupt::Canceled),
            opened = self.provider.stream(request) => opened,
        };
        let mut rx = opened.map_err(GenerationFailure::from)?;
        session.set_status(GenerationStatus::Streaming);

        let persona = session.persona();
        let mut tool_calls = Vec::new();
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return Err(Interrupt::Canceled),
                item = rx.recv() => item,
            };
            let chunk = match item {
                None => break,
                Some(Err(e)) => return Err(GenerationFailure::from(e).into()),
                Some(Ok(chunk)) => chunk,
            };

            if let Some(delta) = chunk.content.filter(|d| !d.is_empty()) {
                session.text.push_str(&delta);
                self.events.publish(GenerationEvent::Generating {
                    persona,
                    text: session.text.clone(),
                });
            }
            tool_calls.extend(chunk.tool_calls);
            if chunk.done {
                break;
            }
        }

        Ok(Round {
            text: session.text.clone(),
            tool_calls,
        })
    }

    /// Persist text the model produced before asking for tools.
    async fn flush_text(&self, run: &GenerationRun, session: &mut GenerationSession, text: String) -> Result<(), Interrupt> {
        session.text.clear();
        if text.trim().is_empty() {
            return Ok(());
        }
        let (text, reasoning) = split_reasoning(&text);
        let mut fields = EntryFields::assistant(text);
        if let Some(reasoning) = reasoning {
            fields = fields.with_reasoning(reasoning);
        }
        run.store.append(fields).await?;
        Ok(())
    }

    /// Write the pending tool entry, run the call, then overwrite the entry
    /// with the outcome. Tool errors are recorded, not raised.
    async fn execute_tool(&self, run: &GenerationRun, session: &GenerationSession, call: &ToolCall) -> Result<(), Interrupt> {
        let persona = session.persona();
        session.set_status(GenerationStatus::ExecutingTool);

        let mut detail = ToolDetail::pending(&call.id, &call.name, call.arguments.clone());
        let running = format!("[{}] running...", call.name);
        let entry_id = run.store.append(EntryFields::tool(running.clone(), detail.clone())).await?;
        self.events.publish(GenerationEvent::ToolUpdate {
            persona,
            entry_id: entry_id.clone(),
            text: running,
        });

        let fields = match run.tools.execute(call).await {
            Ok(result) if result.success => {
                debug!(persona = %persona, tool = %call.name, "Tool succeeded");
                detail.result = Some(result.to_value());
                EntryFields::tool(format!("[{}] succeeded", call.name), detail)
            }
            Ok(result) => {
                warn!(persona = %persona, tool = %call.name, "Tool reported failure");
                detail.error = Some(result.output.clone());
                EntryFields::tool(format!("[{}] failed.", call.name), detail).with_reasoning(result.output)
            }
            Err(e) => {
                warn!(persona = %persona, tool = %call.name, error = %e, "Tool execution failed");
                detail.error = Some(e.to_string());
                EntryFields::tool(format!("[{}] failed.", call.name), detail).with_reasoning(e.to_string())
            }
        };

        let text = fields.text.clone();
        run.store
            .upsert(EntryDraft::Edit {
                id: entry_id.clone(),
                fields,
            })
            .await?;
        self.events.publish(GenerationEvent::ToolUpdate {
            persona,
            entry_id,
            text,
        });
        Ok(())
    }

    /// Fire the webhook without waiting for it.
    fn notify_completion(&self, snapshot: &GenerationSnapshot, text: &str) {
        let (Some(target), Some(notifier)) = (snapshot.webhook.clone(), self.notifier.clone()) else {
            return;
        };
        let persona = snapshot.persona;
        let body = target.render_body(text);
        tokio::spawn(async move {
            match notifier.notify(persona, &target.url, body).await {
                Ok(()) => debug!(persona = %persona, "Completion webhook delivered"),
                Err(e) => warn!(persona = %persona, error = %e, "Completion webhook failed"),
            }
        });
    }
}
