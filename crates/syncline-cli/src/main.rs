//! syncline - incremental extraction from paginated, rate-limited APIs
//!
//! Syncs configured streams to JSON-lines output, keeping per-stream
//! bookmarks in a state file so each run only fetches what changed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use syncline_core::{EXIT_INTERRUPTED, ProgressContext, SharedProgress, init_logging, install_signal_handlers};
use syncline_engine::SyncError;

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "syncline")]
#[command(about = "Incremental, resumable extraction from paginated APIs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./syncline.toml or ~/.config/syncline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// State file holding bookmarks (overrides `state_path` in config)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Maximum attempts for transient failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    request_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Sync configured streams, emitting JSON-lines messages
    Sync(cmd::sync::SyncArgs),
    /// Inspect or edit stored bookmarks
    State(cmd::state::StateArgs),
    /// Show effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(ProgressContext::new());

    // Logging:
    //   TTY:     quiet (warn) unless --debug; spinners show activity
    //   non-TTY: info unless --debug; logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = is_tty && !cli.debug;
    init_logging(quiet, cli.debug, multi);

    match run(cli, &progress) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if matches!(e.downcast_ref::<SyncError>(), Some(SyncError::Interrupted)) {
                log::warn!("Interrupted; committed bookmarks were saved");
                return ExitCode::from(EXIT_INTERRUPTED);
            }
            log::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli, progress: &SharedProgress) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    // CLI overrides
    if let Some(max_retries) = cli.max_retries {
        config.retry.max_attempts = max_retries;
    }
    if let Some(timeout) = cli.request_timeout {
        config.request_timeout = timeout;
    }
    if let Some(state) = cli.state {
        config.state_path = state;
    }

    match cli.command {
        Command::Sync(args) => {
            install_signal_handlers().context("Failed to register signal handlers")?;
            cmd::sync::run(args, &config, progress)
        }
        Command::State(args) => cmd::state::run(args, &config),
        Command::Config => cmd::config::show(&config),
    }
}
