//! # Telemetry Relay
//!
//! Samples device position and battery level and uploads them in batches.
//!
//! The session is driven from standard input, one command per line:
//!
//! | Command | Effect |
//! |---------|--------|
//! | `start` | Start both samplers (no-op if running) |
//! | `stop` | Stop sampling and drop unsent observations (no-op if idle) |
//! | `status` | Log session state and buffer counters |
//! | `quit` | Stop and exit |
//!
//! Ctrl+C behaves like `quit`.
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use telemetry_relay::config::{Config, LoggingConfig};
use telemetry_relay::session::SessionController;

/// Config file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Operator command read from stdin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    Status,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "stop" => Some(Command::Stop),
            "status" => Some(Command::Status),
            "quit" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// Install the stdout subscriber, plus a daily rolling file if configured
///
/// The returned guard must be held until exit so buffered file output is
/// flushed.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let (file_layer, guard) = match &logging.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

async fn handle(controller: &SessionController, command: Command) {
    match command {
        Command::Start => {
            if !controller.start().await {
                info!("Session already running");
            }
        }
        Command::Stop => {
            if !controller.stop().await {
                info!("Session not running");
            }
        }
        Command::Status => {
            let state = controller.state().await;
            let stats = controller.buffer().stats();
            info!(
                ?state,
                buffered = controller.buffer().len(),
                max_items = controller.config().max_items,
                appended = stats.appended,
                flushed_batches = stats.flushed_batches,
                discarded = stats.discarded,
                "Status"
            );
        }
        Command::Quit => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let _log_guard = init_logging(&config.logging);

    info!("Telemetry Relay v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(config = %config_path.display(), endpoint = %config.upload.url, "Configuration loaded");

    let controller = SessionController::from_config(&config)?;

    info!("Commands: start | stop | status | quit (Ctrl+C to exit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) if line.trim().is_empty() => {}
                    Ok(Some(line)) => match Command::parse(&line) {
                        Some(Command::Quit) => break,
                        Some(command) => handle(&controller, command).await,
                        None => warn!("Unknown command: {}", line.trim()),
                    },
                    Ok(None) => {
                        info!("stdin closed, waiting for Ctrl+C");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    controller.stop().await;
    info!("Total observations sampled: {}", controller.buffer().stats().appended);

    Ok(())
}
