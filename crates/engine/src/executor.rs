// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor: the scheduling loop that turns queued tasks into running
//! agent sessions.
//!
//! One executor task owns the `queued -> processing` transition, which is
//! what makes port and worktree allocation race-free. Once a task is
//! started, its lifecycle is driven by the hook handler and the transcript
//! tail; the executor only returns to it to release resources after a
//! terminal transition.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tq_adapters::{SessionHost, WindowSpec};
use tq_core::{Clock, Event, LineType, Task, TaskId, TaskStatus};
use tq_storage::Store;

use crate::allocator::Allocator;
use crate::config::{EngineConfig, PROMPT_FILE, TRANSCRIPT_FILE};
use crate::error::EngineError;
use crate::provisioner::Provisioner;
use crate::tail::TailManager;
use crate::template;

/// Dependencies handed to the executor at startup.
pub struct ExecutorDeps<S: SessionHost, C: Clock> {
    pub store: Store,
    pub events: mpsc::Sender<Event>,
    pub sessions: S,
    pub provisioner: Provisioner,
    pub tails: TailManager<S, C>,
    pub clock: C,
}

/// The task scheduling loop.
pub struct Executor<S: SessionHost, C: Clock> {
    store: Store,
    events: mpsc::Sender<Event>,
    sessions: S,
    provisioner: Provisioner,
    allocator: Allocator,
    tails: TailManager<S, C>,
    clock: C,
    config: EngineConfig,
    ticks: AtomicU64,
}

impl<S: SessionHost, C: Clock> Executor<S, C> {
    pub fn new(deps: ExecutorDeps<S, C>, config: EngineConfig) -> Self {
        let allocator = Allocator::new(deps.store.clone(), &config);
        Self {
            store: deps.store,
            events: deps.events,
            sessions: deps.sessions,
            provisioner: deps.provisioner,
            allocator,
            tails: deps.tails,
            clock: deps.clock,
            config,
            ticks: AtomicU64::new(0),
        }
    }

    /// Run the claim loop until shutdown is signalled.
    pub async fn run(self: Arc<Self>, shutdown: Arc<Notify>) {
        let mut interval = tokio::time::interval(self.config.exec_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!(error = %e, "executor tick failed");
                    }
                }
                _ = shutdown.notified() => {
                    tracing::info!("executor stopping");
                    break;
                }
            }
        }
    }

    /// One pass: release finished tasks, then start at most one queued task.
    pub async fn tick(&self) -> Result<(), EngineError> {
        self.release_finished().await;
        self.try_start_next().await?;

        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if tick % self.config.sweep_every_ticks == 0 {
            if let Err(e) = self.sweep_stale_worktrees().await {
                tracing::warn!(error = %e, "worktree sweep failed");
            }
        }
        Ok(())
    }

    async fn try_start_next(&self) -> Result<(), EngineError> {
        let Some(task) = self.store.next_queued().await? else {
            return Ok(());
        };
        if !self
            .store
            .claim_for_processing(task.id, self.clock.now_utc())
            .await?
        {
            // Lost the race (client interrupted or deleted it)
            return Ok(());
        }
        self.emit(Event::TaskStatusChanged {
            task_id: task.id,
            from: TaskStatus::Queued,
            to: TaskStatus::Processing,
        })
        .await;

        if let Err(e) = self.start_task(&task).await {
            tracing::warn!(task_id = %task.id, error = %e, "task start failed");
            self.fail_task(task.id, &e).await;
        }
        Ok(())
    }

    /// Provision resources and spawn the agent for a claimed task.
    async fn start_task(&self, task: &Task) -> Result<(), EngineError> {
        let project = self.store.resolve_project(&task.project).await?;
        let sprite = project.remote_sprite_name.clone();

        let alloc = self.allocator.allocate(task, &project).await?;
        self.provisioner.create(task, &project, &alloc).await?;

        let window = task.window_name();
        self.store
            .persist_allocations(
                task.id,
                &alloc.worktree_path.to_string_lossy(),
                &alloc.branch_name,
                self.sessions.session_key(),
                &window,
                self.clock.now_utc(),
            )
            .await?;
        self.emit(Event::TaskStarted {
            task_id: task.id,
            port: alloc.port,
            branch: alloc.branch_name.clone(),
        })
        .await;

        // Refetch so the prompt and tail see the stored allocations
        let task = self.store.get_task(task.id).await?;

        let prompt = template::render_prompt(&self.store, &task, &project).await?;
        self.provisioner
            .write_prompt(sprite.as_deref(), &alloc.worktree_path, &prompt)
            .await?;

        self.sessions.ensure_session(sprite.as_deref()).await?;
        self.sessions
            .start(&WindowSpec {
                window,
                cwd: alloc.worktree_path.clone(),
                command: agent_command(&task),
                env: vec![
                    ("TASK_ID".to_string(), task.id.to_string()),
                    ("TASK_TYPE".to_string(), task.task_type.clone()),
                    ("TASK_PROJECT".to_string(), task.project.clone()),
                    ("TASK_PORT".to_string(), alloc.port.to_string()),
                ],
                transcript_path: alloc.worktree_path.join(TRANSCRIPT_FILE),
                sprite: sprite.clone(),
            })
            .await?;

        self.emit(Event::TaskProcessing { task_id: task.id }).await;
        self.tails.follow(&task, sprite);

        tracing::info!(
            task_id = %task.id,
            port = alloc.port,
            branch = %alloc.branch_name,
            "task started"
        );
        Ok(())
    }

    /// Move a task to `failed`, releasing any partial allocations.
    async fn fail_task(&self, task_id: TaskId, error: &EngineError) {
        let now = self.clock.now_utc();
        let reason = error.reason();
        let message = format!("{reason}: {error}");

        let changed = self
            .store
            .update_status_if(
                task_id,
                &[
                    TaskStatus::Queued,
                    TaskStatus::Processing,
                    TaskStatus::Blocked,
                ],
                TaskStatus::Failed,
                now,
            )
            .await;
        if let Err(e) = changed {
            tracing::error!(%task_id, error = %e, "could not record task failure");
            return;
        }

        let _ = self.store.set_error(task_id, Some(&message)).await;
        let _ = self
            .store
            .append_log(task_id, LineType::Error, &message, now)
            .await;

        self.release_task_resources(task_id).await;

        self.emit(Event::TaskStatusChanged {
            task_id,
            from: TaskStatus::Processing,
            to: TaskStatus::Failed,
        })
        .await;
        self.emit(Event::TaskFailed { task_id, reason }).await;
    }

    /// Release port/worktree/window for tasks that reached a terminal
    /// state since the last tick.
    async fn release_finished(&self) {
        let finished = match self.store.tasks_needing_release().await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(error = %e, "release scan failed");
                return;
            }
        };
        for task in finished {
            tracing::debug!(task_id = %task.id, status = %task.status, "releasing resources");
            self.release_task_resources(task.id).await;
        }
    }

    /// Kill the window, tear down the worktree, and clear allocations.
    /// Best-effort: every step tolerates already-released state.
    async fn release_task_resources(&self, task_id: TaskId) {
        let Ok(task) = self.store.get_task(task_id).await else {
            return;
        };
        self.tails.stop(task.id);

        let sprite = match self.store.resolve_project(&task.project).await {
            Ok(project) => project.remote_sprite_name.clone(),
            Err(_) => None,
        };

        if !task.window_key.is_empty() {
            if let Err(e) = self.sessions.kill(&task.window_key, sprite.as_deref()).await {
                tracing::debug!(task_id = %task.id, error = %e, "window kill failed");
            }
        }

        if !task.worktree_path.is_empty() {
            let project_path = match self.store.resolve_project(&task.project).await {
                Ok(project) => project.filesystem_path.clone(),
                Err(_) => Path::new(&task.worktree_path)
                    .parent()
                    .and_then(|p| p.parent())
                    .map(|p| p.to_path_buf())
                    .unwrap_or_default(),
            };
            if let Err(e) = self
                .provisioner
                .teardown(sprite.as_deref(), &project_path, &task.worktree_path)
                .await
            {
                tracing::debug!(task_id = %task.id, error = %e, "worktree teardown failed");
            }
        }

        if let Err(e) = self
            .store
            .clear_allocations(task.id, self.clock.now_utc())
            .await
        {
            tracing::warn!(task_id = %task.id, error = %e, "failed to clear allocations");
        }
    }

    /// Client-initiated interrupt: back to `backlog`, resources released.
    pub async fn interrupt(&self, task_id: TaskId) -> Result<(), EngineError> {
        let task = self.store.get_task(task_id).await?;
        if task.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "cannot interrupt task {task_id} in status {}",
                task.status
            )));
        }

        let now = self.clock.now_utc();
        self.store
            .update_status_if(
                task_id,
                &[
                    TaskStatus::Backlog,
                    TaskStatus::Queued,
                    TaskStatus::Processing,
                    TaskStatus::Blocked,
                ],
                TaskStatus::Backlog,
                now,
            )
            .await?;
        self.release_task_resources(task_id).await;
        self.store
            .append_log(task_id, LineType::System, "interrupted by user", now)
            .await?;

        if task.status != TaskStatus::Backlog {
            self.emit(Event::TaskStatusChanged {
                task_id,
                from: task.status,
                to: TaskStatus::Backlog,
            })
            .await;
        }
        self.emit(Event::TaskInterrupted { task_id }).await;
        Ok(())
    }

    /// Re-queue a finished or stuck task, preserving the agent session so
    /// the next run resumes instead of restarting.
    pub async fn retry(
        &self,
        task_id: TaskId,
        feedback: Option<&str>,
    ) -> Result<(), EngineError> {
        let task = self.store.get_task(task_id).await?;
        if !matches!(
            task.status,
            TaskStatus::Blocked | TaskStatus::Failed | TaskStatus::Done
        ) {
            return Err(EngineError::InvalidState(format!(
                "cannot retry task {task_id} in status {}",
                task.status
            )));
        }

        let now = self.clock.now_utc();
        // A blocked task still owns its window and worktree; release them
        // so the fresh start allocates cleanly.
        self.release_task_resources(task_id).await;

        if let Some(feedback) = feedback {
            self.store.append_feedback(task_id, feedback, now).await?;
        }
        self.store.set_error(task_id, None).await?;
        self.store.set_block_reason(task_id, None).await?;
        self.store
            .update_status_if(task_id, &[task.status], TaskStatus::Queued, now)
            .await?;

        self.emit(Event::TaskStatusChanged {
            task_id,
            from: task.status,
            to: TaskStatus::Queued,
        })
        .await;
        self.emit(Event::TaskRetried { task_id }).await;
        self.emit(Event::TaskQueued { task_id }).await;
        Ok(())
    }

    /// Delete a terminal task. Cascades to logs and hook records.
    pub async fn delete(&self, task_id: TaskId) -> Result<(), EngineError> {
        let task = self.store.get_task(task_id).await?;
        if !task.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "cannot delete task {task_id} in status {}",
                task.status
            )));
        }
        self.tails.stop(task_id);
        if task.has_allocations() {
            self.release_task_resources(task_id).await;
        }
        self.store.delete_task(task_id).await?;
        self.emit(Event::TaskDeleted { task_id }).await;
        Ok(())
    }

    /// Inject user input into a blocked (or still-working) task's window.
    pub async fn send_input(&self, task_id: TaskId, text: &str) -> Result<(), EngineError> {
        let task = self.store.get_task(task_id).await?;
        if task.window_key.is_empty()
            || !matches!(task.status, TaskStatus::Processing | TaskStatus::Blocked)
        {
            return Err(EngineError::InvalidState(format!(
                "task {task_id} has no live agent window"
            )));
        }
        let sprite = match self.store.resolve_project(&task.project).await {
            Ok(project) => project.remote_sprite_name.clone(),
            Err(_) => None,
        };
        self.sessions
            .send_input(&task.window_key, sprite.as_deref(), text)
            .await?;
        self.store
            .append_log(
                task_id,
                LineType::Text,
                &format!("input: {text}"),
                self.clock.now_utc(),
            )
            .await?;
        Ok(())
    }

    /// Crash recovery at daemon start: re-attach watchers to surviving
    /// windows, move window-less `processing` tasks back to `backlog`.
    pub async fn reconcile(&self) -> Result<(), EngineError> {
        let mut active = self
            .store
            .tasks_with_status(TaskStatus::Processing)
            .await?;
        active.extend(self.store.tasks_with_status(TaskStatus::Blocked).await?);

        for task in active {
            let sprite = match self.store.resolve_project(&task.project).await {
                Ok(project) => project.remote_sprite_name.clone(),
                Err(_) => None,
            };
            let alive = !task.window_key.is_empty()
                && self
                    .sessions
                    .window_exists(&task.window_key, sprite.as_deref())
                    .await
                    .unwrap_or(false);

            if alive {
                tracing::info!(task_id = %task.id, "reconnecting watcher to live window");
                self.tails.follow(&task, sprite);
            } else if task.status == TaskStatus::Processing {
                tracing::warn!(task_id = %task.id, "no live window after restart, recovering");
                let now = self.clock.now_utc();
                let changed = self
                    .store
                    .update_status_if(
                        task.id,
                        &[TaskStatus::Processing],
                        TaskStatus::Backlog,
                        now,
                    )
                    .await?;
                if changed {
                    self.store
                        .append_log(
                            task.id,
                            LineType::System,
                            "daemon restart: agent window gone, task returned to backlog",
                            now,
                        )
                        .await?;
                    self.release_task_resources(task.id).await;
                    self.emit(Event::TaskStatusChanged {
                        task_id: task.id,
                        from: TaskStatus::Processing,
                        to: TaskStatus::Backlog,
                    })
                    .await;
                }
            }
        }
        Ok(())
    }

    /// Remove worktree directories no active task references.
    pub async fn sweep_stale_worktrees(&self) -> Result<(), EngineError> {
        let active: HashSet<String> = self.store.active_worktrees().await?.into_iter().collect();
        for project in self.store.list_projects().await? {
            let worktrees = match self.provisioner.list_worktrees(&project).await {
                Ok(list) => list,
                Err(e) => {
                    tracing::debug!(project = %project.name, error = %e, "worktree listing failed");
                    continue;
                }
            };
            for worktree in worktrees {
                if active.contains(&worktree) {
                    continue;
                }
                tracing::info!(project = %project.name, %worktree, "sweeping stale worktree");
                if let Err(e) = self
                    .provisioner
                    .teardown(
                        project.remote_sprite_name.as_deref(),
                        &project.filesystem_path,
                        &worktree,
                    )
                    .await
                {
                    tracing::warn!(%worktree, error = %e, "stale worktree teardown failed");
                }
            }
        }
        Ok(())
    }

    /// Stop all transcript watchers (daemon shutdown). Agent windows are
    /// left alive; startup reconciliation reattaches to them.
    pub fn stop_all_tails(&self) {
        self.tails.stop_all();
    }

    async fn emit(&self, event: Event) {
        if self.events.send(event).await.is_err() {
            tracing::warn!("event channel closed, dropping event");
        }
    }
}

/// The agent invocation for a task's window.
fn agent_command(task: &Task) -> String {
    let mut cmd = format!(
        "{} --chrome --prompt-from-file {}",
        task.executor.binary(),
        PROMPT_FILE
    );
    if !task.agent_session_id.is_empty() {
        cmd.push_str(&format!(" --resume {}", task.agent_session_id));
    }
    if task.dangerous_mode {
        cmd.push_str(" --dangerously-skip-permissions");
    }
    cmd
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
