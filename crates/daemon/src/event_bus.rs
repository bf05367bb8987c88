// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus: durable log append, live fan-out, and hook script launch.
//!
//! Every delivered event is (a) appended to the `event_log` table before
//! anything else (the durable log is the system of record), (b) broadcast
//! to in-process subscribers with drop-on-lag semantics, and (c) offered
//! to an executable at `<hooks_dir>/<event_type>` with the task snapshot
//! in its environment.
//!
//! The default emit path is asynchronous: a bounded queue drained by one
//! worker. Producers never block; overflow drops the event and bumps a
//! counter. `emit_sync` performs the same three deliveries inline for
//! events that must be durable before the caller's next read.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tq_adapters::subprocess::{run_with_timeout, HOOK_SCRIPT_TIMEOUT};
use tq_core::{Event, Task};
use tq_storage::Store;

/// Producer-side queue capacity.
const QUEUE_CAPACITY: usize = 1024;

/// Per-subscriber broadcast buffer; laggards miss events, never block.
const SUBSCRIBER_CAPACITY: usize = 256;

struct BusInner {
    store: Store,
    hooks_dir: PathBuf,
    broadcast_tx: broadcast::Sender<Event>,
    dropped: AtomicU64,
}

/// Process-wide publish/subscribe fabric.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
    queue_tx: mpsc::Sender<Event>,
}

/// Drains the async emit queue. Run it as a dedicated task; it exits when
/// every queue sender (bus handles and engine components) is gone.
pub struct EventBusWorker {
    inner: Arc<BusInner>,
    queue_rx: mpsc::Receiver<Event>,
}

impl EventBus {
    pub fn new(store: Store, hooks_dir: PathBuf) -> (Self, EventBusWorker) {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (broadcast_tx, _) = broadcast::channel(SUBSCRIBER_CAPACITY);
        let inner = Arc::new(BusInner {
            store,
            hooks_dir,
            broadcast_tx,
            dropped: AtomicU64::new(0),
        });
        let worker = EventBusWorker {
            inner: Arc::clone(&inner),
            queue_rx,
        };
        (Self { inner, queue_tx }, worker)
    }

    /// Queue an event for delivery. Never blocks; a full queue drops the
    /// event (subscribers catch up from the durable log, so a dropped
    /// live event is recoverable).
    pub fn emit(&self, event: Event) {
        if self.queue_tx.try_send(event).is_err() {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("event queue full, dropping event");
        }
    }

    /// Deliver an event inline. Used for events that must be durable with
    /// respect to a subsequent read (`task.created`, audit completions).
    pub async fn emit_sync(&self, event: Event) {
        self.inner.deliver(&event).await;
    }

    /// A sender engine components push their events through; they share
    /// the worker's queue.
    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.queue_tx.clone()
    }

    /// Subscribe to live events. A slow subscriber misses events (the
    /// receiver reports lag) and never slows producers.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Events dropped on the producer side since startup.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl EventBusWorker {
    pub async fn run(mut self) {
        while let Some(event) = self.queue_rx.recv().await {
            self.inner.deliver(&event).await;
        }
        tracing::debug!("event bus worker stopped");
    }
}

impl BusInner {
    /// The three deliveries: durable append, live broadcast, hook script.
    async fn deliver(&self, event: &Event) {
        if event.is_durable() {
            if let Err(e) = self.store.append_event(event, chrono::Utc::now()).await {
                tracing::error!(event = event.name(), error = %e, "event log append failed");
            }
        }

        // Send errors just mean there are no subscribers right now
        let _ = self.broadcast_tx.send(event.clone());

        if event.is_durable() {
            self.spawn_hook_script(event).await;
        }
    }

    /// Launch `<hooks_dir>/<event_type>` if present and executable. Runs
    /// detached with a timeout; failures are logged, never fatal.
    async fn spawn_hook_script(&self, event: &Event) {
        let script = self.hooks_dir.join(event.name());
        if !is_executable(&script) {
            return;
        }

        // Refetch the task for the env snapshot; events only carry ids.
        let task = match event.task_id() {
            Some(id) => self.store.get_task(id).await.ok(),
            None => None,
        };

        let event = event.clone();
        tokio::spawn(async move {
            let mut cmd = tokio::process::Command::new(&script);
            cmd.env("TASK_EVENT", event.name())
                .env("TASK_MESSAGE", event.message())
                .env("TASK_TIMESTAMP", chrono::Utc::now().to_rfc3339())
                .env("TASK_METADATA", event.metadata().to_string());
            if let Some(id) = event.task_id() {
                cmd.env("TASK_ID", id.to_string());
            }
            if let Some(task) = &task {
                apply_task_env(&mut cmd, task);
            }

            match run_with_timeout(cmd, HOOK_SCRIPT_TIMEOUT, "event hook script").await {
                Ok(output) if !output.status.success() => {
                    tracing::warn!(
                        script = %script.display(),
                        code = output.status.code(),
                        stderr = %String::from_utf8_lossy(&output.stderr),
                        "event hook script failed"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(script = %script.display(), error = %e, "event hook script error");
                }
            }
        });
    }
}

fn apply_task_env(cmd: &mut tokio::process::Command, task: &Task) {
    cmd.env("TASK_TITLE", &task.title)
        .env("TASK_STATUS", task.status.as_str())
        .env("TASK_PROJECT", &task.project)
        .env("TASK_TYPE", &task.task_type)
        .env("TASK_EXECUTOR", task.executor.as_str());
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
