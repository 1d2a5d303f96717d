//! The generation engine: one LLM turn per persona, from the trimmed
//! history to the persisted reply.
//!
//! A generation follows a **Request → Stream → Tools → Request** cycle:
//!
//! 1. **Lock** the persona's conversation log
//! 2. **Build context** (system prompt, statistics, trimmed and merged history)
//! 3. **Stream** the model's reply, broadcasting the accumulated text
//! 4. **If tool calls**: write a tool entry per call, execute it, loop to step 2
//! 5. **If text only**: persist the reply and broadcast `completed`
//!
//! Failures are persisted as notices; cancellation persists nothing.
//! [`ChatEngine`] is the entry point for callers.

pub mod context;
pub mod engine;
pub mod failure;
pub mod orchestrator;
pub mod reasoning;
pub mod session;
pub mod stats;
pub mod system_prompt;
pub mod timer;

#[cfg(test)]
mod test_helpers;

pub use context::build_turns;
pub use engine::{ChatEngine, EngineError, HistoryPage};
pub use failure::{FailureKind, GenerationFailure};
pub use orchestrator::{GenerationRun, Orchestrator, Outcome};
pub use session::{GenerationSession, GenerationStatus};
pub use stats::{TalkStats, page_hash};
pub use system_prompt::PromptParts;
pub use timer::TimerState;
