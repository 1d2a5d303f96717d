//! Parlor CLI, the main entry point.
//!
//! Commands:
//! - `init`     Write a default config and create the data directory
//! - `chat`     Talk to a persona, interactively or with one message
//! - `history`  Print a page of a persona's conversation
//! - `daemon`   Run timer generations until interrupted
//! - `doctor`   Diagnose configuration and provider health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "parlor",
    about = "Parlor: persona chat generation engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.parlor/config.toml)
    #[arg(long, global = true, env = "PARLOR_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file and create the data directory
    Init,

    /// Chat with a persona
    Chat {
        /// Persona number
        #[arg(short, long, default_value_t = 1)]
        persona: u32,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Print part of a persona's conversation
    History {
        /// Persona number
        #[arg(short, long, default_value_t = 1)]
        persona: u32,

        /// First entry; negative reads the most recent entries
        #[arg(short, long, default_value_t = -1, allow_hyphen_values = true)]
        index: i64,

        /// Number of entries
        #[arg(short, long, default_value_t = 20)]
        count: usize,

        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run timer-driven generations until Ctrl+C
    Daemon,

    /// Diagnose configuration and provider health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let config_path = cli
        .config
        .unwrap_or_else(|| parlor_config::AppConfig::config_dir().join("config.toml"));

    match cli.command {
        Commands::Init => commands::init::run(&config_path).await?,
        Commands::Chat { persona, message } => commands::chat::run(&config_path, persona, message).await?,
        Commands::History {
            persona,
            index,
            count,
            json,
        } => commands::history::run(&config_path, persona, index, count, json).await?,
        Commands::Daemon => commands::daemon::run(&config_path).await?,
        Commands::Doctor => commands::doctor::run(&config_path).await?,
    }

    Ok(())
}
