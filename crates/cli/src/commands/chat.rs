//! `parlor chat`: interactive or single-message chat with one persona.

use parlor_agent::ChatEngine;
use parlor_core::entry::{EntryDraft, EntryFields};
use parlor_core::event::GenerationEvent;
use parlor_core::PersonaId;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

pub async fn run(config_path: &Path, persona: u32, message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::build_engine(config_path)?;
    let persona = PersonaId(persona);
    let mut events = BroadcastStream::new(engine.subscribe());

    if let Some(msg) = message {
        // Single message mode
        send(&engine, persona, &msg, &mut events).await?;
        engine.shutdown().await;
        return Ok(());
    }

    let config = engine.config();
    println!();
    println!("  Parlor: interactive chat");
    println!();
    println!("  Persona:   {}", persona.0);
    println!("  Model:     {}", config.default_model);
    println!("  Data:      {}", engine.data_dir().display());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C stops a response; type 'exit' to quit.");
    println!();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        if let Err(e) = send(&engine, persona, line, &mut events).await {
            eprintln!("  [Error] {e}");
        }
        println!();
    }

    engine.shutdown().await;
    println!();
    Ok(())
}

/// Submit `text` as a user entry and stream the answer to stdout.
async fn send(
    engine: &ChatEngine,
    persona: PersonaId,
    text: &str,
    events: &mut BroadcastStream<Arc<GenerationEvent>>,
) -> Result<(), Box<dyn std::error::Error>> {
    engine
        .submit(persona, EntryDraft::New(EntryFields::user(text)))
        .await?;

    match follow(engine, persona, events).await {
        Some(GenerationEvent::Failed { reason, .. }) => Err(reason.into()),
        Some(GenerationEvent::Canceled { .. }) => {
            eprintln!("  (canceled)");
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Print the running generation of `persona` until it ends. Ctrl+C cancels
/// it. Returns the terminal event, or `None` when the bus closed.
async fn follow(
    engine: &ChatEngine,
    persona: PersonaId,
    events: &mut BroadcastStream<Arc<GenerationEvent>>,
) -> Option<GenerationEvent> {
    let mut printer = StreamPrinter::default();
    let mut cancel_sent = false;

    loop {
        tokio::select! {
            item = events.next() => {
                let event = match item? {
                    Ok(event) => event,
                    Err(BroadcastStreamRecvError::Lagged(n)) => {
                        tracing::debug!(skipped = n, "Event stream lagged");
                        continue;
                    }
                };
                if event.persona() != persona {
                    continue;
                }
                match &*event {
                    GenerationEvent::Generating { text, .. } => {
                        let delta = printer.delta(text);
                        if !delta.is_empty() {
                            print!("{delta}");
                            let _ = std::io::stdout().flush();
                        }
                    }
                    GenerationEvent::ToolUpdate { text, .. } => {
                        printer.end_line();
                        eprintln!("  [tool] {text}");
                    }
                    GenerationEvent::Completed { text, .. } => {
                        if printer.printed == 0 {
                            print!("{text}");
                        }
                        printer.end_line();
                        println!();
                    }
                    GenerationEvent::Started { .. } | GenerationEvent::Canceled { .. } | GenerationEvent::Failed { .. } => {
                        printer.end_line();
                    }
                }
                if event.is_terminal() {
                    return Some((*event).clone());
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel_sent => {
                cancel_sent = true;
                engine.cancel_generation(persona).await;
            }
        }
    }
}

/// Turns the accumulated text of each `generating` event into the part not
/// yet printed.
#[derive(Debug, Default)]
struct StreamPrinter {
    printed: usize,
}

impl StreamPrinter {
    fn delta<'a>(&mut self, accumulated: &'a str) -> &'a str {
        // A shorter text means a new request round began
        if accumulated.len() < self.printed {
            println!();
            self.printed = 0;
        }
        let delta = accumulated.get(self.printed..).unwrap_or_default();
        self.printed = accumulated.len();
        delta
    }

    fn end_line(&mut self) {
        if self.printed > 0 {
            println!();
        }
        self.printed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printer_emits_only_new_text() {
        let mut printer = StreamPrinter::default();
        assert_eq!(printer.delta("Hel"), "Hel");
        assert_eq!(printer.delta("Hello"), "lo");
        assert_eq!(printer.delta("Hello"), "");
    }

    #[test]
    fn printer_restarts_after_tool_round() {
        let mut printer = StreamPrinter::default();
        assert_eq!(printer.delta("Looking it up"), "Looking it up");
        printer.end_line();
        assert_eq!(printer.delta("Found"), "Found");
    }
}
