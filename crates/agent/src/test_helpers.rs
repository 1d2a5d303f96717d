//! Shared test helpers: a provider that replays scripted streams.

use parlor_core::error::ProviderError;
use parlor_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
use parlor_core::tool::ToolCall;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// What one request round receives.
pub enum Step {
    /// The stream yields these items, then closes.
    Chunks(Vec<Result<StreamChunk, ProviderError>>),
    /// The request itself is rejected.
    Reject(ProviderError),
    /// The stream opens and never yields anything.
    Stall,
    /// The stream yields these items, then stays open without closing.
    ThenStall(Vec<Result<StreamChunk, ProviderError>>),
    /// The stream waits this long before replaying the inner step's items.
    Slow(Duration, Box<Step>),
}

/// A mock provider that answers each `stream` call with the next scripted
/// step. Runs out with a 500 error.
pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::from_status(500, "complete is not scripted"))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let step = self.steps.lock().unwrap().pop_front();

        match step {
            None => Err(ProviderError::from_status(500, "script exhausted")),
            Some(Step::Reject(e)) => Err(e),
            Some(step) => Ok(replay(step, Duration::ZERO)),
        }
    }
}

fn replay(step: Step, delay: Duration) -> ChunkReceiver {
    let (items, stall) = match step {
        Step::Chunks(items) => (items, false),
        Step::Stall => (Vec::new(), true),
        Step::ThenStall(items) => (items, true),
        Step::Slow(extra, inner) => return replay(*inner, delay + extra),
        Step::Reject(e) => (vec![Err(e)], false),
    };

    let (tx, rx) = tokio::sync::mpsc::channel(items.len().max(1));
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        for item in items {
            if tx.send(item).await.is_err() {
                return;
            }
        }
        if stall {
            tx.closed().await;
        }
    });
    rx
}

/// `step`, delivered only after `delay`.
pub fn slow(delay: Duration, step: Step) -> Step {
    Step::Slow(delay, Box::new(step))
}

/// A streamed text reply, delivered in two deltas.
pub fn text_reply(text: &str) -> Step {
    let split = text.char_indices().nth(text.chars().count() / 2).map_or(text.len(), |(i, _)| i);
    Step::Chunks(vec![
        Ok(StreamChunk::text(&text[..split])),
        Ok(StreamChunk::text(&text[split..])),
        Ok(StreamChunk::finish(vec![], None)),
    ])
}

/// A round that streams `text` and then asks for `calls`.
pub fn tool_round(text: &str, calls: Vec<ToolCall>) -> Step {
    let mut items = Vec::new();
    if !text.is_empty() {
        items.push(Ok(StreamChunk::text(text)));
    }
    items.push(Ok(StreamChunk::finish(calls, None)));
    Step::Chunks(items)
}

/// Helper to create a tool call.
pub fn make_tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: args,
    }
}
