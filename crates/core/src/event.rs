// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle events fanned out by the event bus.
//!
//! Serializes with `{"type": "task.created", ...fields}` format. The set is
//! closed; unknown type tags deserialize to `Custom` so newer event logs can
//! be read by older daemons.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::task::{LineType, TaskId, TaskStatus};

/// Events that mark task lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "task.created")]
    TaskCreated { task_id: TaskId, title: String },

    #[serde(rename = "task.updated")]
    TaskUpdated { task_id: TaskId },

    #[serde(rename = "task.deleted")]
    TaskDeleted { task_id: TaskId },

    #[serde(rename = "task.status.changed")]
    TaskStatusChanged {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[serde(rename = "task.queued")]
    TaskQueued { task_id: TaskId },

    /// Resources allocated and the agent window spawned
    #[serde(rename = "task.started")]
    TaskStarted {
        task_id: TaskId,
        port: u16,
        branch: String,
    },

    /// Heartbeat while the agent works (tool-use hooks)
    #[serde(rename = "task.processing")]
    TaskProcessing { task_id: TaskId },

    #[serde(rename = "task.blocked")]
    TaskBlocked {
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    #[serde(rename = "task.completed")]
    TaskCompleted { task_id: TaskId },

    #[serde(rename = "task.failed")]
    TaskFailed {
        task_id: TaskId,
        reason: String,
    },

    #[serde(rename = "task.retried")]
    TaskRetried { task_id: TaskId },

    #[serde(rename = "task.interrupted")]
    TaskInterrupted { task_id: TaskId },

    #[serde(rename = "task.pinned")]
    TaskPinned { task_id: TaskId },

    #[serde(rename = "task.unpinned")]
    TaskUnpinned { task_id: TaskId },

    /// Live transcript line. Broadcast-only: the durable record is the
    /// `task_logs` row, so the bus skips the event-log append for these.
    #[serde(rename = "task.log")]
    TaskLog {
        task_id: TaskId,
        line_type: LineType,
        content: String,
    },

    /// Catch-all for unknown event types (forward compatibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskCreated { .. } => "task.created",
            Event::TaskUpdated { .. } => "task.updated",
            Event::TaskDeleted { .. } => "task.deleted",
            Event::TaskStatusChanged { .. } => "task.status.changed",
            Event::TaskQueued { .. } => "task.queued",
            Event::TaskStarted { .. } => "task.started",
            Event::TaskProcessing { .. } => "task.processing",
            Event::TaskBlocked { .. } => "task.blocked",
            Event::TaskCompleted { .. } => "task.completed",
            Event::TaskFailed { .. } => "task.failed",
            Event::TaskRetried { .. } => "task.retried",
            Event::TaskInterrupted { .. } => "task.interrupted",
            Event::TaskPinned { .. } => "task.pinned",
            Event::TaskUnpinned { .. } => "task.unpinned",
            Event::TaskLog { .. } => "task.log",
            Event::Custom => "custom",
        }
    }

    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Event::TaskCreated { task_id, .. }
            | Event::TaskUpdated { task_id }
            | Event::TaskDeleted { task_id }
            | Event::TaskStatusChanged { task_id, .. }
            | Event::TaskQueued { task_id }
            | Event::TaskStarted { task_id, .. }
            | Event::TaskProcessing { task_id }
            | Event::TaskBlocked { task_id, .. }
            | Event::TaskCompleted { task_id }
            | Event::TaskFailed { task_id, .. }
            | Event::TaskRetried { task_id }
            | Event::TaskInterrupted { task_id }
            | Event::TaskPinned { task_id }
            | Event::TaskUnpinned { task_id }
            | Event::TaskLog { task_id, .. } => Some(*task_id),
            Event::Custom => None,
        }
    }

    /// Human-readable message for the durable event row and hook env.
    pub fn message(&self) -> String {
        match self {
            Event::TaskCreated { title, .. } => format!("created: {title}"),
            Event::TaskStatusChanged { from, to, .. } => format!("{from} -> {to}"),
            Event::TaskStarted { port, branch, .. } => {
                format!("started on port {port} branch {branch}")
            }
            Event::TaskBlocked {
                reason: Some(reason),
                ..
            } => format!("blocked: {reason}"),
            Event::TaskFailed { reason, .. } => format!("failed: {reason}"),
            Event::TaskLog { content, .. } => content.clone(),
            _ => String::new(),
        }
    }

    /// Variant fields as a JSON object, minus the type tag.
    pub fn metadata(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Some(obj) = value.as_object_mut() {
            obj.remove("type");
        }
        value
    }

    /// Whether the bus appends this event to the durable event log.
    pub fn is_durable(&self) -> bool {
        !matches!(self, Event::TaskLog { .. } | Event::Custom)
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self.task_id() {
            Some(id) => {
                let msg = self.message();
                if msg.is_empty() {
                    format!("{t} task={id}")
                } else {
                    format!("{t} task={id} {msg}")
                }
            }
            None => t.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
