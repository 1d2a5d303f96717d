//! `parlor daemon`: run timer-driven generations until interrupted.

use chrono::Utc;
use std::path::Path;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::build_engine(config_path)?;
    let config = engine.config();

    println!("Parlor daemon: starting");
    println!("   Data:    {}", engine.data_dir().display());
    println!(
        "   Timer:   {}",
        if config.features.timer { "enabled" } else { "disabled" }
    );
    println!("   Tick:    {}s", config.timer.tick_secs);

    // Log every finished generation
    let mut events = BroadcastStream::new(engine.subscribe());
    tokio::spawn(async move {
        while let Some(item) = events.next().await {
            let Ok(event) = item else { continue };
            if event.is_terminal() {
                info!(persona = %event.persona(), status = event.status(), "Generation finished");
            }
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(config.timer.tick_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let started = engine.tick_timers(Utc::now().timestamp()).await;
                if !started.is_empty() {
                    info!(count = started.len(), "Timer generations started");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
        }
    }

    engine.shutdown().await;
    println!("Parlor daemon: stopped");
    Ok(())
}
