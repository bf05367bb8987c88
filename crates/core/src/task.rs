// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task entity and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::recurrence::Recurrence;

/// Stable identity of a task. Assigned monotonically by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not yet eligible for execution
    Backlog,
    /// Waiting for the executor to pick it up
    Queued,
    /// Agent is running in its window
    Processing,
    /// Agent is waiting on user input (permission or idle prompt)
    Blocked,
    /// Agent finished its turn
    Done,
    /// Execution failed (see `error` for the reason)
    Failed,
    /// Hidden from normal listings; resources released
    Archived,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Archived => "archived",
        }
    }

    /// Active tasks hold allocated resources (port, worktree).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            TaskStatus::Queued | TaskStatus::Processing | TaskStatus::Blocked
        )
    }

    /// Terminal tasks may be deleted; their resources are released.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Archived
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(TaskStatus::Backlog),
            "queued" => Ok(TaskStatus::Queued),
            "processing" => Ok(TaskStatus::Processing),
            "blocked" => Ok(TaskStatus::Blocked),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            "archived" => Ok(TaskStatus::Archived),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid task status: {0:?}")]
pub struct ParseStatusError(pub String);

/// Which agent binary the executor invokes for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    #[default]
    Claude,
    Codex,
}

impl ExecutorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutorKind::Claude => "claude",
            ExecutorKind::Codex => "codex",
        }
    }

    /// Binary name the session host executes.
    pub fn binary(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutorKind {
    type Err = ParseExecutorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(ExecutorKind::Claude),
            "codex" => Ok(ExecutorKind::Codex),
            other => Err(ParseExecutorError(other.to_string())),
        }
    }
}

/// Error returned when parsing an invalid [`ExecutorKind`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid executor: {0:?}")]
pub struct ParseExecutorError(pub String);

/// Kind of a transcript/log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    /// Raw agent output captured by the transcript tail
    Output,
    /// User- or adapter-supplied text (e.g. send_input echoes)
    Text,
    /// Tool-use records from hook events
    Tool,
    /// Daemon-generated notes (recovery, retries)
    System,
    /// Failure details
    Error,
}

impl LineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineType::Output => "output",
            LineType::Text => "text",
            LineType::Tool => "tool",
            LineType::System => "system",
            LineType::Error => "error",
        }
    }
}

impl fmt::Display for LineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LineType {
    type Err = ParseLineTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "output" => Ok(LineType::Output),
            "text" => Ok(LineType::Text),
            "tool" => Ok(LineType::Tool),
            "system" => Ok(LineType::System),
            "error" => Ok(LineType::Error),
            other => Err(ParseLineTypeError(other.to_string())),
        }
    }
}

/// Error returned when parsing an invalid [`LineType`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid line type: {0:?}")]
pub struct ParseLineTypeError(pub String);

/// A task instance.
///
/// Allocated resources (`port`, `branch_name`, `worktree_path`, session
/// coordinates) are empty/zero until the executor starts the task, and are
/// cleared again when it reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub body: String,
    pub status: TaskStatus,
    /// Selects the prompt template (`code`, `writing`, `thinking`, ...)
    pub task_type: String,
    /// Project name this task binds to (FK-by-name)
    pub project: String,
    pub executor: ExecutorKind,
    pub worktree_path: String,
    pub branch_name: String,
    /// 0 when unallocated, otherwise within the configured port range
    pub port: u16,
    pub session_key: String,
    pub window_key: String,
    /// Returned by the agent; required to `--resume` a session
    pub agent_session_id: String,
    pub dangerous_mode: bool,
    pub pinned: bool,
    pub tags: Vec<String>,
    /// Prompt text recorded when the task blocked
    pub block_reason: Option<String>,
    /// Machine-readable failure reason plus message
    pub error: Option<String>,
    pub pr_url: Option<String>,
    pub pr_number: Option<i64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub recurrence: Option<Recurrence>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// True when the task holds any allocated resource.
    pub fn has_allocations(&self) -> bool {
        self.port != 0 || !self.worktree_path.is_empty() || !self.window_key.is_empty()
    }

    /// The multiplexer window key for this task.
    pub fn window_name(&self) -> String {
        format!("task-{}", self.id)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Task {
    /// Minimal task for tests. Status `backlog`, no allocations.
    pub fn test_new(id: i64, title: &str) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: TaskId::new(id),
            title: title.to_string(),
            body: String::new(),
            status: TaskStatus::Backlog,
            task_type: "code".to_string(),
            project: String::new(),
            executor: ExecutorKind::Claude,
            worktree_path: String::new(),
            branch_name: String::new(),
            port: 0,
            session_key: String::new(),
            window_key: String::new(),
            agent_session_id: String::new(),
            dangerous_mode: false,
            pinned: false,
            tags: Vec::new(),
            block_reason: None,
            error: None,
            pr_url: None,
            pr_number: None,
            scheduled_at: None,
            recurrence: None,
            last_run_at: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
