// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler: promotes time-deferred tasks and re-enqueues recurring ones.

use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

use tq_core::{Clock, Event, Task, TaskStatus};
use tq_storage::{NewTask, Store};

use crate::config::EngineConfig;
use crate::error::EngineError;

/// Background ticker that feeds the queue on its own cadence.
pub struct Scheduler<C: Clock> {
    store: Store,
    events: mpsc::Sender<Event>,
    clock: C,
    config: EngineConfig,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(store: Store, events: mpsc::Sender<Event>, clock: C, config: EngineConfig) -> Self {
        Self {
            store,
            events,
            clock,
            config,
        }
    }

    /// Run the ticker until shutdown is signalled.
    pub async fn run(self: Arc<Self>, shutdown: Arc<Notify>) {
        let mut interval = tokio::time::interval(self.config.scheduler_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!(error = %e, "scheduler tick failed");
                    }
                }
                _ = shutdown.notified() => {
                    tracing::info!("scheduler stopping");
                    break;
                }
            }
        }
    }

    /// One pass: promote due scheduled tasks, clone due recurring tasks.
    pub async fn tick(&self) -> Result<(), EngineError> {
        let now = self.clock.now_utc();

        for task in self.store.due_scheduled(now).await? {
            let changed = self
                .store
                .update_status_if(task.id, &[TaskStatus::Backlog], TaskStatus::Queued, now)
                .await?;
            if changed {
                tracing::info!(task_id = %task.id, "scheduled task promoted to queue");
                self.emit(Event::TaskStatusChanged {
                    task_id: task.id,
                    from: TaskStatus::Backlog,
                    to: TaskStatus::Queued,
                })
                .await;
                self.emit(Event::TaskQueued { task_id: task.id }).await;
            }
        }

        for task in self.store.recurring_done().await? {
            if let Err(e) = self.maybe_recur(&task, now).await {
                tracing::warn!(task_id = %task.id, error = %e, "recurrence failed");
            }
        }
        Ok(())
    }

    /// Clone a completed recurring task once its cadence has elapsed.
    async fn maybe_recur(
        &self,
        task: &Task,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), EngineError> {
        let Some(recurrence) = task.recurrence else {
            return Ok(());
        };
        // A task that has never recurred measures from its completion.
        let Some(base) = task.last_run_at.or(task.completed_at) else {
            return Ok(());
        };
        if base + recurrence.cadence() > now {
            return Ok(());
        }

        let clone = self
            .store
            .create_task(
                NewTask {
                    title: task.title.clone(),
                    body: task.body.clone(),
                    task_type: task.task_type.clone(),
                    project: task.project.clone(),
                    executor: task.executor,
                    dangerous_mode: task.dangerous_mode,
                    tags: task.tags.clone(),
                    scheduled_at: None,
                    recurrence: Some(recurrence),
                },
                now,
            )
            .await?;
        self.store.set_last_run_at(task.id, now).await?;

        tracing::info!(
            original = %task.id,
            clone = %clone.id,
            recurrence = %recurrence,
            "recurring task re-enqueued"
        );
        self.emit(Event::TaskCreated {
            task_id: clone.id,
            title: clone.title.clone(),
        })
        .await;
        Ok(())
    }

    async fn emit(&self, event: Event) {
        if self.events.send(event).await.is_err() {
            tracing::warn!("event channel closed, dropping event");
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
