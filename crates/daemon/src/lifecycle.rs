// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, crash recovery, shutdown.

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tq_adapters::session::TmuxSessionHost;
use tq_core::{Clock, SystemClock};
use tq_engine::executor::ExecutorDeps;
use tq_engine::{Executor, HookHandler, Provisioner, Scheduler, TailManager};
use tq_storage::Store;

use crate::api::Api;
use crate::config::{Config, ConfigError};
use crate::event_bus::EventBus;

/// Concrete executor type the daemon runs.
pub type DaemonExecutor = Executor<TmuxSessionHost, SystemClock>;

/// How long shutdown waits for loops to drain before giving up.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Log purge cadence.
const PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Lifecycle errors.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] tq_storage::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A running daemon: the root context every subsystem hangs off.
pub struct Daemon {
    pub config: Config,
    pub store: Store,
    pub bus: EventBus,
    pub executor: Arc<DaemonExecutor>,
    pub api: Api<TmuxSessionHost, SystemClock>,
    // One signal per loop; notify_one leaves a permit even when the loop
    // is mid-tick, so no wakeup is lost.
    shutdown_signals: Vec<Arc<Notify>>,
    // NOTE(lifetime): held to maintain the exclusive PID-file lock
    #[allow(dead_code)]
    lock_file: File,
    handles: Vec<JoinHandle<()>>,
}

/// Start the daemon: lock, open the store, wire subsystems, reconcile,
/// and spawn the long-running loops.
pub async fn startup(mut config: Config) -> Result<Daemon, LifecycleError> {
    // 1. Directories first; the lock file lives in state_dir.
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(&config.hooks_dir)?;

    // 2. Acquire the PID lock before touching shared state. Open without
    // truncating so a losing contender doesn't wipe the winner's PID.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    {
        use std::io::Write;
        let mut f = &lock_file;
        f.set_len(0)?;
        writeln!(f, "{}", std::process::id())?;
    }

    // 3. Open the store and overlay settings-table configuration.
    let store = Store::open(&config.db_path).await?;
    config.overlay_settings(&store).await?;

    // 4. Event bus and its drain worker.
    let (bus, worker) = EventBus::new(store.clone(), config.hooks_dir.clone());
    let worker_handle = tokio::spawn(worker.run());

    // 5. Engine wiring: everything shares the bus queue for events.
    let clock = SystemClock;
    let sessions = TmuxSessionHost::default();
    let provisioner = Provisioner::new();
    let handler = HookHandler::new(store.clone(), bus.sender(), clock.clone());
    let tails = TailManager::new(store.clone(), bus.sender(), sessions.clone(), handler);
    let engine_config = config.engine_config();
    let executor = Arc::new(Executor::new(
        ExecutorDeps {
            store: store.clone(),
            events: bus.sender(),
            sessions: sessions.clone(),
            provisioner,
            tails,
            clock: clock.clone(),
        },
        engine_config.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        bus.sender(),
        clock.clone(),
        engine_config,
    ));

    // 6. Crash recovery before the claim loop starts: windowless
    // `processing` tasks go back to backlog, surviving windows get their
    // watchers back.
    if let Err(e) = executor.reconcile().await {
        warn!(error = %e, "startup reconciliation failed");
    }

    // 7. Long-running loops, each with its own shutdown signal.
    let executor_shutdown = Arc::new(Notify::new());
    let scheduler_shutdown = Arc::new(Notify::new());
    let purge_shutdown = Arc::new(Notify::new());
    let executor_handle =
        tokio::spawn(Arc::clone(&executor).run(Arc::clone(&executor_shutdown)));
    let scheduler_handle =
        tokio::spawn(Arc::clone(&scheduler).run(Arc::clone(&scheduler_shutdown)));
    let purge_handle = tokio::spawn(purge_loop(
        store.clone(),
        config.log_retention_days,
        config.log_keep_per_task,
        Arc::clone(&purge_shutdown),
    ));

    let api = Api::new(store.clone(), bus.clone(), Arc::clone(&executor), clock);

    info!(
        db = %config.db_path.display(),
        ports = %format!("{}..={}", config.port_range_min, config.port_range_max),
        "daemon started"
    );

    Ok(Daemon {
        config,
        store,
        bus,
        executor,
        api,
        shutdown_signals: vec![executor_shutdown, scheduler_shutdown, purge_shutdown],
        lock_file,
        handles: vec![worker_handle, executor_handle, scheduler_handle, purge_handle],
    })
}

impl Daemon {
    /// Graceful shutdown: stop the loops, drain briefly, close the store.
    ///
    /// Agent windows are intentionally left running; reconciliation
    /// reattaches to them on the next startup.
    pub async fn shutdown(mut self) {
        info!("shutting down daemon");
        for signal in &self.shutdown_signals {
            signal.notify_one();
        }
        // Stop transcript watchers; their windows survive the restart.
        self.executor.stop_all_tails();
        // The bus worker stops once every queue sender is gone: the bus
        // handles here, plus the executor/scheduler/watcher clones
        // released as their loops exit.
        drop(self.bus);
        drop(self.api);
        drop(self.executor);

        let drain = async {
            for handle in &mut self.handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
            warn!("drain timed out, aborting remaining loops");
            for handle in &self.handles {
                handle.abort();
            }
        }

        self.store.close().await;

        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!(error = %e, "failed to remove PID file");
            }
        }
        info!("daemon stopped");
    }
}

/// Hourly log rotation per the retention policy.
async fn purge_loop(
    store: Store,
    retention_days: u32,
    keep_per_task: u32,
    shutdown: Arc<Notify>,
) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let cutoff = SystemClock.now_utc() - chrono::Duration::days(i64::from(retention_days));
                match store.purge_logs_older_than(cutoff, keep_per_task).await {
                    Ok(0) => {}
                    Ok(n) => info!(deleted = n, "rotated task logs"),
                    Err(e) => warn!(error = %e, "log rotation failed"),
                }
            }
            _ = shutdown.notified() => break,
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
