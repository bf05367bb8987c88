// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-facing API facade.
//!
//! The operations clients (TUI, web, CLI, email adapter) drive the queue
//! with. Transport is out of scope; in-process collaborators call these
//! methods directly and subscribe to the bus for updates.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

use tokio::sync::broadcast;
use tq_adapters::SessionHost;
use tq_core::{Clock, Event, ExecutorKind, Recurrence, Task, TaskId, TaskStatus};
use tq_engine::{EngineError, Executor};
use tq_storage::{
    EventRow, NewTask, SearchHit, Store, StoreError, TaskFilter, TaskPatch,
};

use crate::event_bus::EventBus;

/// API errors returned to clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Input for `create_task`.
#[derive(Debug, Clone, Default)]
pub struct CreateTask {
    pub title: String,
    pub body: String,
    pub task_type: String,
    pub project: String,
    pub executor: ExecutorKind,
    pub dangerous_mode: bool,
    pub tags: Vec<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub recurrence: Option<Recurrence>,
}

/// The RPC-style surface exposed to clients.
pub struct Api<S: SessionHost, C: Clock> {
    store: Store,
    bus: EventBus,
    executor: Arc<Executor<S, C>>,
    clock: C,
}

impl<S: SessionHost, C: Clock> Api<S, C> {
    pub fn new(store: Store, bus: EventBus, executor: Arc<Executor<S, C>>, clock: C) -> Self {
        Self {
            store,
            bus,
            executor,
            clock,
        }
    }

    /// Create a task in `backlog`. The `task.created` event is delivered
    /// synchronously so a subsequent read observes it.
    pub async fn create_task(&self, input: CreateTask) -> Result<Task, ApiError> {
        if input.title.trim().is_empty() {
            return Err(ApiError::InvalidRequest("title must not be empty".into()));
        }
        // FK-by-name: the project must exist (aliases accepted)
        let project = self.store.resolve_project(&input.project).await?;

        let task = self
            .store
            .create_task(
                NewTask {
                    title: input.title,
                    body: input.body,
                    task_type: input.task_type,
                    project: project.name,
                    executor: input.executor,
                    dangerous_mode: input.dangerous_mode,
                    tags: input.tags,
                    scheduled_at: input.scheduled_at,
                    recurrence: input.recurrence,
                },
                self.clock.now_utc(),
            )
            .await?;

        self.bus
            .emit_sync(Event::TaskCreated {
                task_id: task.id,
                title: task.title.clone(),
            })
            .await;
        Ok(task)
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task, ApiError> {
        Ok(self.store.get_task(id).await?)
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, ApiError> {
        Ok(self.store.list_tasks(filter).await?)
    }

    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, ApiError> {
        let task = self
            .store
            .update_task(id, patch, self.clock.now_utc())
            .await?;
        self.bus.emit(Event::TaskUpdated { task_id: id });
        Ok(task)
    }

    /// Delete a task (terminal states only; cascades to logs and events).
    pub async fn delete_task(&self, id: TaskId) -> Result<(), ApiError> {
        self.executor.delete(id).await?;
        Ok(())
    }

    /// Move a backlog task into the queue.
    pub async fn queue(&self, id: TaskId) -> Result<(), ApiError> {
        let changed = self
            .store
            .update_status_if(
                id,
                &[TaskStatus::Backlog],
                TaskStatus::Queued,
                self.clock.now_utc(),
            )
            .await?;
        if !changed {
            let task = self.store.get_task(id).await?;
            return Err(ApiError::Store(StoreError::InvalidState(format!(
                "cannot queue task {id} in status {}",
                task.status
            ))));
        }
        self.bus.emit(Event::TaskStatusChanged {
            task_id: id,
            from: TaskStatus::Backlog,
            to: TaskStatus::Queued,
        });
        self.bus.emit(Event::TaskQueued { task_id: id });
        Ok(())
    }

    /// Interrupt an active task back to `backlog`.
    pub async fn interrupt(&self, id: TaskId) -> Result<(), ApiError> {
        self.executor.interrupt(id).await?;
        Ok(())
    }

    /// Retry a done, failed, or blocked task with optional feedback.
    pub async fn retry(&self, id: TaskId, feedback: Option<&str>) -> Result<(), ApiError> {
        self.executor.retry(id, feedback).await?;
        Ok(())
    }

    /// Send text into a blocked task's agent window.
    pub async fn send_input(&self, id: TaskId, text: &str) -> Result<(), ApiError> {
        self.executor.send_input(id, text).await?;
        Ok(())
    }

    pub async fn pin(&self, id: TaskId) -> Result<(), ApiError> {
        self.store.set_pinned(id, true).await?;
        self.bus.emit(Event::TaskPinned { task_id: id });
        Ok(())
    }

    pub async fn unpin(&self, id: TaskId) -> Result<(), ApiError> {
        self.store.set_pinned(id, false).await?;
        self.bus.emit(Event::TaskUnpinned { task_id: id });
        Ok(())
    }

    /// Live event stream. Drop-on-full: a lagging receiver misses events
    /// and catches up from `events_after`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Durable event log catch-up for subscribers that lagged.
    pub async fn events_after(&self, after_id: i64, limit: u32) -> Result<Vec<EventRow>, ApiError> {
        Ok(self.store.events_after(after_id, limit).await?)
    }

    /// Title/body/tag substring and transcript full-text search.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>, ApiError> {
        Ok(self.store.search(query, limit).await?)
    }

    /// Bind an adapter's thread key (e.g. an email Message-ID) to a task.
    pub async fn bind_thread(&self, thread_key: &str, id: TaskId) -> Result<(), ApiError> {
        Ok(self
            .store
            .bind_thread(thread_key, id, self.clock.now_utc())
            .await?)
    }

    /// Resolve a thread key back to its owning task.
    pub async fn resolve_thread(&self, thread_key: &str) -> Result<Option<TaskId>, ApiError> {
        Ok(self.store.resolve_thread(thread_key).await?)
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
