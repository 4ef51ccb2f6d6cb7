//! chimed - per-guild chime scheduling daemon.
//!
//! Wires the `chime-core` reconciliation engine to the filesystem: loads the
//! guild store, derives live trigger jobs, watches the config directory for
//! operator edits, and reconciles each change back into the schedule. The
//! chat platform sits behind a transport; by default outbound actions are
//! logged, so the daemon runs headless without gateway credentials.

#![forbid(unsafe_code)]

mod transport;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use chime_core::service::{ChimeService, ServicePaths};
use chime_core::store::GuildStore;
use chime_core::timespec;
use chime_core::transport::{ChatTransport, MockTransport};
use chime_core::watcher::ConfigWatcher;

use transport::LogTransport;

#[derive(Parser)]
#[command(name = "chimed")]
#[command(author, version, about = "Chime daemon - per-guild schedules synced with editable config files")]
struct Cli {
    /// Path to the guild store document
    #[arg(long, env = "CHIMED_STORE")]
    store: Option<PathBuf>,

    /// Directory of per-guild config files and the catalog
    #[arg(long, env = "CHIMED_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Directory of audio assets
    #[arg(long, env = "CHIMED_AUDIO_DIR")]
    audio_dir: Option<PathBuf>,

    /// Default IANA timezone for guilds without one of their own
    #[arg(long, env = "CHIMED_TZ", default_value = "Asia/Tokyo")]
    timezone: String,

    /// How long a change event after our own export counts as an echo
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    debounce: Duration,

    /// Also write daily-rolling log files into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Outbound transport implementation
    #[arg(long, value_enum, default_value_t = TransportKind::Log)]
    transport: TransportKind,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    /// Log every outbound action; playback checks the asset exists
    Log,
    /// Record actions in memory and drop them (dry runs)
    Mock,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_dir.as_deref())?;

    info!("Starting chimed {}...", env!("CARGO_PKG_VERSION"));

    let default_tz = timespec::parse_timezone(&cli.timezone)
        .context("the --timezone flag must name an IANA zone like Asia/Tokyo")?;

    let data_dir = default_data_dir();
    let store_path = cli.store.unwrap_or_else(|| data_dir.join("store.json"));
    let config_dir = cli.config_dir.unwrap_or_else(|| data_dir.join("configs"));
    let audio_dir = cli.audio_dir.unwrap_or_else(|| data_dir.join("audio"));
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;
    std::fs::create_dir_all(&audio_dir)
        .with_context(|| format!("creating audio directory {}", audio_dir.display()))?;
    // Watcher events carry absolute paths; the echo stamps must agree.
    let config_dir = config_dir
        .canonicalize()
        .with_context(|| format!("resolving config directory {}", config_dir.display()))?;

    let store = GuildStore::load(&store_path)
        .with_context(|| format!("loading guild store {}", store_path.display()))?;
    info!("Loaded {} guild(s) from {}", store.len(), store_path.display());

    let transport: Arc<dyn ChatTransport> = match cli.transport {
        TransportKind::Log => Arc::new(LogTransport::new()),
        TransportKind::Mock => Arc::new(MockTransport::new()),
    };

    let service = ChimeService::new(
        store,
        transport,
        ServicePaths {
            config_dir: config_dir.clone(),
            audio_dir,
        },
        default_tz,
        cli.debounce,
    );

    service.bootstrap();
    info!(
        "{} trigger job(s) live across {} guild(s); default timezone {}",
        service.scheduler().total_jobs(),
        service.store().len(),
        default_tz.name()
    );

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let _watcher =
        ConfigWatcher::spawn(&config_dir, events_tx).context("starting the config file watcher")?;
    info!("Watching {} for config edits", config_dir.display());

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
            event = events.recv() => match event {
                Some(path) => service.handle_file_event(&path),
                None => {
                    warn!("config watcher stopped unexpectedly");
                    break;
                }
            },
        }
    }

    service.shutdown();
    info!("chimed stopped");
    Ok(())
}

/// Console logging always; a daily-rolling file log when `log_dir` is set.
/// The returned guard flushes the file writer on drop and must outlive main.
fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    let registry = tracing_subscriber::registry().with(fmt::layer()).with(filter);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "chimed.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "chimed")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}
