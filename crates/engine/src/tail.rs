// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transcript tail: one watcher per started task.
//!
//! The watcher owns two followers (the transcript capture file and the
//! hook file) and a liveness poll. Transcript lines become durable
//! `task_logs` rows plus live `task.log` events; hook lines feed the hook
//! handler; a dead window while the task is still `processing` fails it
//! with reason `agent_terminated`.

use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tokio::sync::{mpsc, oneshot};

use tq_adapters::follow::{follow_local, follow_sprite, FollowFrom, FollowHandle};
use tq_adapters::SessionHost;
use tq_core::{Clock, Event, LineType, Task, TaskId};
use tq_storage::Store;

use crate::config::{HOOKS_FILE, TRANSCRIPT_FILE};
use crate::hooks::HookHandler;

#[allow(clippy::expect_used)]
static SESSION_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)session[-_ ]?id[":=\s]+([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})"#,
    )
    .expect("constant regex pattern is valid")
});

type WatcherMap = HashMap<TaskId, (u64, oneshot::Sender<()>)>;

/// Manages transcript/hook watchers for active tasks.
pub struct TailManager<S: SessionHost, C: Clock> {
    store: Store,
    events: mpsc::Sender<Event>,
    sessions: S,
    handler: HookHandler<C>,
    watchers: Arc<Mutex<WatcherMap>>,
    // Distinguishes a replaced watcher from its successor at unregister time
    generation: Arc<std::sync::atomic::AtomicU64>,
}

impl<S: SessionHost, C: Clock> Clone for TailManager<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            events: self.events.clone(),
            sessions: self.sessions.clone(),
            handler: self.handler.clone(),
            watchers: Arc::clone(&self.watchers),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<S: SessionHost, C: Clock> TailManager<S, C> {
    pub fn new(
        store: Store,
        events: mpsc::Sender<Event>,
        sessions: S,
        handler: HookHandler<C>,
    ) -> Self {
        Self {
            store,
            events,
            sessions,
            handler,
            watchers: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(std::sync::atomic::AtomicU64::new(0)),
        }
    }

    /// Start following a task's transcript and hook files. Replaces any
    /// existing watcher for the task.
    pub fn follow(&self, task: &Task, sprite: Option<String>) {
        let worktree = Path::new(&task.worktree_path);
        let transcript = worktree.join(TRANSCRIPT_FILE);
        let hooks = worktree.join(HOOKS_FILE);

        let (transcript_tx, transcript_rx) = mpsc::channel(256);
        let (hooks_tx, hooks_rx) = mpsc::channel(256);

        let (transcript_handle, hooks_handle) = match sprite.as_deref() {
            Some(host) => (
                follow_sprite(
                    host,
                    &transcript.to_string_lossy(),
                    FollowFrom::End,
                    transcript_tx,
                ),
                follow_sprite(host, &hooks.to_string_lossy(), FollowFrom::Start, hooks_tx),
            ),
            None => (
                follow_local(transcript, FollowFrom::End, transcript_tx),
                follow_local(hooks, FollowFrom::Start, hooks_tx),
            ),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let generation = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.watchers.lock().insert(task.id, (generation, shutdown_tx));

        tokio::spawn(watch_task(WatchParams {
            task_id: task.id,
            generation,
            window: task.window_name(),
            sprite,
            store: self.store.clone(),
            events: self.events.clone(),
            sessions: self.sessions.clone(),
            handler: self.handler.clone(),
            transcript_rx,
            hooks_rx,
            _transcript_handle: transcript_handle,
            _hooks_handle: hooks_handle,
            shutdown_rx,
            watchers: Arc::clone(&self.watchers),
        }));
    }

    /// Stop the task's watcher. Idempotent.
    pub fn stop(&self, task_id: TaskId) {
        if let Some((_, tx)) = self.watchers.lock().remove(&task_id) {
            let _ = tx.send(());
        }
    }

    /// Stop every watcher. Used at daemon shutdown; the agent windows
    /// themselves are left running.
    pub fn stop_all(&self) {
        for (_, (_, tx)) in self.watchers.lock().drain() {
            let _ = tx.send(());
        }
    }

    /// Number of live watchers (reconciliation and tests).
    pub fn active_count(&self) -> usize {
        self.watchers.lock().len()
    }
}

struct WatchParams<S: SessionHost, C: Clock> {
    task_id: TaskId,
    generation: u64,
    window: String,
    sprite: Option<String>,
    store: Store,
    events: mpsc::Sender<Event>,
    sessions: S,
    handler: HookHandler<C>,
    transcript_rx: mpsc::Receiver<String>,
    hooks_rx: mpsc::Receiver<String>,
    // Held so the followers live as long as the watcher
    _transcript_handle: FollowHandle,
    _hooks_handle: FollowHandle,
    shutdown_rx: oneshot::Receiver<()>,
    watchers: Arc<Mutex<WatcherMap>>,
}

async fn watch_task<S: SessionHost, C: Clock>(params: WatchParams<S, C>) {
    let WatchParams {
        task_id,
        generation,
        window,
        sprite,
        store,
        events,
        sessions,
        handler,
        mut transcript_rx,
        mut hooks_rx,
        _transcript_handle,
        _hooks_handle,
        mut shutdown_rx,
        watchers,
    } = params;

    let clock_now = || chrono::Utc::now();
    let mut transcript_open = true;
    let mut hooks_open = true;

    loop {
        tokio::select! {
            line = transcript_rx.recv(), if transcript_open => {
                match line {
                    Some(line) => {
                        process_transcript_line(&store, &events, task_id, &line, clock_now()).await;
                    }
                    None => {
                        // Remote tail pipe closed; liveness poll decides the outcome
                        transcript_open = false;
                    }
                }
            }

            line = hooks_rx.recv(), if hooks_open => {
                match line {
                    Some(line) => {
                        if let Err(e) = handler.apply_line(&line).await {
                            tracing::warn!(%task_id, error = %e, "hook line failed");
                        }
                    }
                    None => {
                        hooks_open = false;
                    }
                }
            }

            _ = tokio::time::sleep(tq_adapters::env::follower_poll_ms()) => {
                match sessions.window_exists(&window, sprite.as_deref()).await {
                    Ok(false) => {
                        tracing::info!(%task_id, %window, "agent window gone");
                        match handler.fail_if_processing(task_id, "agent_terminated").await {
                            Ok(failed) if failed => {
                                tracing::info!(%task_id, "task failed: agent_terminated");
                            }
                            Err(e) => {
                                tracing::warn!(%task_id, error = %e, "failed to record agent death");
                            }
                            _ => {}
                        }
                        break;
                    }
                    Ok(true) => {}
                    Err(e) => {
                        // Transient (ssh hiccup, tmux busy): keep watching
                        tracing::debug!(%task_id, error = %e, "liveness check failed");
                    }
                }
            }

            _ = &mut shutdown_rx => {
                tracing::debug!(%task_id, "watcher shutdown requested");
                break;
            }
        }
    }

    // Only unregister our own entry; a replacement watcher may have taken
    // the slot while this one was winding down.
    let mut map = watchers.lock();
    if map.get(&task_id).is_some_and(|(gen, _)| *gen == generation) {
        map.remove(&task_id);
    }
}

async fn process_transcript_line(
    store: &Store,
    events: &mpsc::Sender<Event>,
    task_id: TaskId,
    line: &str,
    now: chrono::DateTime<chrono::Utc>,
) {
    if let Err(e) = store.append_log(task_id, LineType::Output, line, now).await {
        tracing::warn!(%task_id, error = %e, "transcript append failed");
        return;
    }

    let _ = events
        .send(Event::TaskLog {
            task_id,
            line_type: LineType::Output,
            content: line.to_string(),
        })
        .await;

    // The agent announces its session id early in the transcript; capture
    // it so retries can --resume.
    if let Some(session_id) = extract_session_id(line) {
        if let Err(e) = store.record_agent_session(task_id, &session_id).await {
            tracing::warn!(%task_id, error = %e, "failed to record agent session");
        }
    }
}

/// Pull an agent session id out of a transcript line: a JSON field or a
/// `Session ID: <uuid>` announcement.
fn extract_session_id(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.starts_with('{') {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(sid) = json
                .get("session_id")
                .or_else(|| json.get("sessionId"))
                .and_then(|v| v.as_str())
            {
                return Some(sid.to_string());
            }
        }
    }
    SESSION_ID_RE
        .captures(line)
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
#[path = "tail_tests.rs"]
mod tests;
