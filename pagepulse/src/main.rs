//! pagepulse - page session and performance telemetry
//!
//! This tool provides commands for:
//! - Inspecting tracker configuration and persisted session state
//! - Replaying recorded host traces through a tracker
//! - Resetting persisted session state
//!
//! Uses XDG Base Directory specification for file locations:
//! - State: $XDG_DATA_HOME/pagepulse/state.db (~/.local/share/pagepulse/state.db)
//! - Config: $XDG_CONFIG_HOME/pagepulse/config.toml (~/.config/pagepulse/config.toml)

mod replay;
mod trace;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use pagepulse_core::storage::{CLIENT_ID_KEY, SESSION_EXPIRATION_KEY, SESSION_ID_KEY};
use pagepulse_core::{Config, KeyValueStore, SqliteStore};

use crate::replay::ReplayOptions;

#[derive(Parser)]
#[command(name = "pagepulse")]
#[command(about = "Page session and performance telemetry")]
#[command(version)]
struct Args {
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show tracker configuration and persisted state
    Status,

    /// Replay a JSONL trace of host page activity through a tracker
    Replay {
        /// Trace file (one JSON record per line)
        trace: PathBuf,

        /// Print payloads to stdout instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// JSON array of events buffered before the tracker loaded
        #[arg(long)]
        pending: Option<PathBuf>,

        /// URL of the replayed page
        #[arg(long, default_value = "http://localhost/")]
        url: String,

        /// Document referrer of the replayed page
        #[arg(long)]
        referrer: Option<String>,

        /// User-agent string reported by the replayed page
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// Forget the persisted session
    Reset {
        /// Also forget the client id
        #[arg(short, long)]
        all: bool,
    },
}

/// Returns $HOME, falling back to the current directory
fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Sets XDG environment variables to ensure the core library uses XDG paths
fn ensure_xdg_env() {
    let home = home_dir();

    if std::env::var("XDG_DATA_HOME").is_err() {
        std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
    }

    if std::env::var("XDG_STATE_HOME").is_err() {
        std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
    }

    if std::env::var("XDG_CONFIG_HOME").is_err() {
        std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging if verbose; the guard must outlive the command
    let _log_guard = if args.verbose {
        Some(pagepulse_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Replay {
            trace,
            dry_run,
            pending,
            url,
            referrer,
            user_agent,
        } => cmd_replay(
            &config,
            &trace,
            ReplayOptions {
                url,
                referrer,
                user_agent,
                dry_run,
                pending,
            },
        ),
        Command::Reset { all } => cmd_reset(&config, all),
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("pagepulse Configuration");
    println!("=======================");
    println!();

    let tracker = &config.tracker;
    println!("Config File:     {}", Config::config_path().display());
    println!(
        "Endpoint:        {}",
        tracker.endpoint.as_deref().unwrap_or("<not set>")
    );
    println!("Session Length:  {}m", tracker.session_duration_minutes);
    println!("Refresh Every:   {}s", tracker.refresh_interval().as_secs());
    println!("Ready Grace:     {}ms", tracker.ready_grace_ms);
    println!("Max Pending:     {}", tracker.max_pending_events);
    println!("Max Resources:   {}", tracker.max_resources);

    let storage_path = config.storage_path();
    println!();
    println!("State File:      {}", storage_path.display());

    if !storage_path.exists() {
        println!();
        println!("No persisted state yet.");
        return Ok(());
    }

    let store = SqliteStore::open(&storage_path).context("failed to open state store")?;
    let client_id = store.get(CLIENT_ID_KEY)?;
    let session_id = store.get(SESSION_ID_KEY)?;
    let expiration = store
        .get(SESSION_EXPIRATION_KEY)?
        .and_then(|raw| raw.trim().parse::<i64>().ok());

    println!();
    println!(
        "Client ID:       {}",
        client_id.as_deref().unwrap_or("<none>")
    );
    println!(
        "Session ID:      {}",
        session_id.as_deref().unwrap_or("<none>")
    );

    if let Some(expiration) = expiration {
        let expires_at = DateTime::from_timestamp_millis(expiration)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| expiration.to_string());
        let status = if chrono::Utc::now().timestamp_millis() < expiration {
            "active"
        } else {
            "expired"
        };
        println!("Expires:         {} ({})", expires_at, status);
    }

    Ok(())
}

fn cmd_replay(config: &Config, trace_path: &PathBuf, options: ReplayOptions) -> Result<()> {
    let content = std::fs::read_to_string(trace_path)
        .with_context(|| format!("failed to read trace {}", trace_path.display()))?;
    let records = trace::parse_trace(&content)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let local = tokio::task::LocalSet::new();
    let summary = local.block_on(&runtime, replay::run(config, records, options))?;

    // Stdout carries payloads on dry runs, so the summary goes to stderr
    eprintln!(
        "Replayed {} record(s): {} refresh(es), {} fault(s)",
        summary.records, summary.refreshes, summary.faults
    );
    if let Some(printed) = summary.printed {
        eprintln!("Printed {} payload(s)", printed);
    }

    Ok(())
}

fn cmd_reset(config: &Config, all: bool) -> Result<()> {
    let storage_path = config.storage_path();
    if !storage_path.exists() {
        println!("No persisted state at {}", storage_path.display());
        return Ok(());
    }

    let store = SqliteStore::open(&storage_path).context("failed to open state store")?;
    store.remove(SESSION_ID_KEY)?;
    store.remove(SESSION_EXPIRATION_KEY)?;
    if all {
        store.remove(CLIENT_ID_KEY)?;
        println!("Session and client id removed.");
    } else {
        println!("Session removed.");
    }

    Ok(())
}
