// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task Queue Daemon (tqd)
//!
//! Background process that runs the task execution engine: the claim
//! loop, the scheduler, the event bus, and the transcript watchers.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use tq_daemon::{lifecycle, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("tqd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("tqd {}", env!("CARGO_PKG_VERSION"));
                println!("Task queue daemon - runs agent sessions for queued tasks");
                println!();
                println!("USAGE:");
                println!("    tqd");
                println!();
                println!("State lives under $TQ_STATE_DIR (default ~/.local/state/tq).");
                println!("Clients talk to the daemon through the task database and the");
                println!("event subscription channel.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: tqd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    rotate_log_if_needed(&config.log_path);
    let _log_guard = setup_logging(&config)?;

    info!("starting tqd {}", env!("CARGO_PKG_VERSION"));

    let daemon = match lifecycle::startup(config).await {
        Ok(daemon) => daemon,
        Err(e @ lifecycle::LifecycleError::LockFailed(_)) => {
            eprintln!("tqd is already running");
            error!("{e}");
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to start daemon: {e}");
            return Err(e.into());
        }
    };

    // Signal ready for whatever started us (CLI, service manager)
    println!("READY");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }

    daemon.shutdown().await;
    Ok(())
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (daemon.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `daemon.log` -> `daemon.log.1` -> `daemon.log.2` -> `daemon.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently ignored
/// so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config
            .log_path
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
        config
            .log_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("daemon.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
