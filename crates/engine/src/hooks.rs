// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook handler: translates agent hook lines into state transitions.
//!
//! Every transition is a conditional compare-and-swap in the store, so
//! duplicate deliveries (the agent re-firing a hook, a follower replaying
//! a line) settle into no-ops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tq_core::{Clock, Event, HookClass, HookLine, LineType, TaskId, TaskStatus};
use tq_storage::Store;

use crate::error::EngineError;

/// Notification matchers that block a task.
const BLOCKING_MATCHERS: &[&str] = &["permission_prompt", "idle_prompt"];

/// Consumes hook lines and mutates task state.
#[derive(Clone)]
pub struct HookHandler<C: Clock> {
    store: Store,
    events: mpsc::Sender<Event>,
    clock: C,
    malformed: Arc<AtomicU64>,
}

impl<C: Clock> HookHandler<C> {
    pub fn new(store: Store, events: mpsc::Sender<Event>, clock: C) -> Self {
        Self {
            store,
            events,
            clock,
            malformed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of skipped malformed lines.
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Parse and apply one raw line from a hook file.
    pub async fn apply_line(&self, raw: &str) -> Result<(), EngineError> {
        if raw.trim().is_empty() {
            return Ok(());
        }
        match HookLine::parse(raw) {
            Some(hook) => self.apply(hook).await,
            None => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(line = raw, "skipping malformed hook line");
                Ok(())
            }
        }
    }

    /// Apply a parsed hook event.
    pub async fn apply(&self, hook: HookLine) -> Result<(), EngineError> {
        match hook.event {
            HookClass::PreToolUse => self.on_pre_tool_use(&hook).await,
            HookClass::PostToolUse => self.on_post_tool_use(&hook).await,
            HookClass::Notification => self.on_notification(&hook).await,
            HookClass::Stop => self.on_stop(&hook).await,
            HookClass::SessionStart => self.on_session_start(&hook).await,
            HookClass::CompactionSummary => self.on_compaction(&hook).await,
            HookClass::Other => {
                tracing::debug!(task_id = %hook.task_id, "ignoring unknown hook class");
                Ok(())
            }
        }
    }

    async fn on_pre_tool_use(&self, hook: &HookLine) -> Result<(), EngineError> {
        let task = self.store.get_task(hook.task_id).await?;
        if task.status != TaskStatus::Processing {
            return Ok(());
        }
        self.store
            .append_log(
                hook.task_id,
                LineType::Tool,
                &format!("tool use: {}", hook.tool_summary()),
                self.clock.now_utc(),
            )
            .await?;
        self.emit(Event::TaskProcessing {
            task_id: hook.task_id,
        })
        .await;
        Ok(())
    }

    async fn on_post_tool_use(&self, hook: &HookLine) -> Result<(), EngineError> {
        self.store
            .append_log(
                hook.task_id,
                LineType::Tool,
                &format!("tool done: {}", hook.tool_summary()),
                self.clock.now_utc(),
            )
            .await?;
        Ok(())
    }

    async fn on_notification(&self, hook: &HookLine) -> Result<(), EngineError> {
        let blocking = hook
            .matcher
            .as_deref()
            .is_some_and(|m| BLOCKING_MATCHERS.contains(&m));
        if !blocking {
            return Ok(());
        }

        let now = self.clock.now_utc();
        let changed = self
            .store
            .update_status_if(
                hook.task_id,
                &[TaskStatus::Processing],
                TaskStatus::Blocked,
                now,
            )
            .await?;
        if !changed {
            // Already blocked (duplicate delivery) or not running
            return Ok(());
        }

        let reason = hook.text.clone();
        self.store
            .set_block_reason(hook.task_id, reason.as_deref())
            .await?;
        self.store
            .append_log(
                hook.task_id,
                LineType::System,
                &format!(
                    "blocked on {}: {}",
                    hook.matcher.as_deref().unwrap_or("prompt"),
                    reason.as_deref().unwrap_or("")
                ),
                now,
            )
            .await?;

        self.emit(Event::TaskStatusChanged {
            task_id: hook.task_id,
            from: TaskStatus::Processing,
            to: TaskStatus::Blocked,
        })
        .await;
        self.emit(Event::TaskBlocked {
            task_id: hook.task_id,
            reason,
        })
        .await;
        Ok(())
    }

    async fn on_stop(&self, hook: &HookLine) -> Result<(), EngineError> {
        match hook.reason.as_deref() {
            Some("error") => self.stop_with_error(hook).await,
            // end_turn, or agents that omit the reason entirely
            _ => self.stop_done(hook).await,
        }
    }

    async fn stop_done(&self, hook: &HookLine) -> Result<(), EngineError> {
        let task = self.store.get_task(hook.task_id).await?;
        if !matches!(task.status, TaskStatus::Processing | TaskStatus::Blocked) {
            return Ok(());
        }
        let changed = self
            .store
            .update_status_if(
                hook.task_id,
                &[TaskStatus::Processing, TaskStatus::Blocked],
                TaskStatus::Done,
                self.clock.now_utc(),
            )
            .await?;
        if !changed {
            return Ok(());
        }
        self.store.set_block_reason(hook.task_id, None).await?;

        self.emit(Event::TaskStatusChanged {
            task_id: hook.task_id,
            from: task.status,
            to: TaskStatus::Done,
        })
        .await;
        self.emit(Event::TaskCompleted {
            task_id: hook.task_id,
        })
        .await;
        Ok(())
    }

    async fn stop_with_error(&self, hook: &HookLine) -> Result<(), EngineError> {
        let task = self.store.get_task(hook.task_id).await?;
        if !task.status.is_active() {
            return Ok(());
        }
        let now = self.clock.now_utc();
        let changed = self
            .store
            .update_status_if(
                hook.task_id,
                &[
                    TaskStatus::Queued,
                    TaskStatus::Processing,
                    TaskStatus::Blocked,
                ],
                TaskStatus::Failed,
                now,
            )
            .await?;
        if !changed {
            return Ok(());
        }

        let reason = hook
            .text
            .clone()
            .unwrap_or_else(|| "agent reported an error".to_string());
        self.store.set_error(hook.task_id, Some(&reason)).await?;
        self.store
            .append_log(hook.task_id, LineType::Error, &reason, now)
            .await?;

        self.emit(Event::TaskStatusChanged {
            task_id: hook.task_id,
            from: task.status,
            to: TaskStatus::Failed,
        })
        .await;
        self.emit(Event::TaskFailed {
            task_id: hook.task_id,
            reason,
        })
        .await;
        Ok(())
    }

    async fn on_session_start(&self, hook: &HookLine) -> Result<(), EngineError> {
        if let Some(ref session_id) = hook.session_id {
            self.store
                .record_agent_session(hook.task_id, session_id)
                .await?;
        }
        Ok(())
    }

    async fn on_compaction(&self, hook: &HookLine) -> Result<(), EngineError> {
        let content = hook
            .summary
            .clone()
            .or_else(|| hook.text.clone())
            .unwrap_or_default();
        if content.is_empty() {
            return Ok(());
        }
        self.store
            .add_compaction_summary(hook.task_id, &content, self.clock.now_utc())
            .await?;
        Ok(())
    }

    /// Convenience for tests and callers that fail a task from outside the
    /// hook file (agent window death).
    pub async fn fail_if_processing(
        &self,
        task_id: TaskId,
        reason: &str,
    ) -> Result<bool, EngineError> {
        let now = self.clock.now_utc();
        let changed = self
            .store
            .update_status_if(task_id, &[TaskStatus::Processing], TaskStatus::Failed, now)
            .await?;
        if !changed {
            return Ok(false);
        }
        self.store.set_error(task_id, Some(reason)).await?;
        self.store
            .append_log(task_id, LineType::Error, reason, now)
            .await?;
        self.emit(Event::TaskStatusChanged {
            task_id,
            from: TaskStatus::Processing,
            to: TaskStatus::Failed,
        })
        .await;
        self.emit(Event::TaskFailed {
            task_id,
            reason: reason.to_string(),
        })
        .await;
        Ok(true)
    }

    async fn emit(&self, event: Event) {
        if self.events.send(event).await.is_err() {
            tracing::warn!("event channel closed, dropping event");
        }
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
