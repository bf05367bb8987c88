// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task rows: CRUD, queue operations, and the conditional status writers.
//!
//! Status is only ever written through `claim_for_processing` and
//! `update_status_if`; the generic `update_task` patch deliberately has no
//! status field, so blind status writes cannot happen once a task is in
//! flight.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row};
use std::str::FromStr;

use tq_core::{ExecutorKind, Recurrence, Task, TaskId, TaskStatus};

use crate::{Store, StoreError};

/// Input for task creation. Everything else starts empty.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
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

/// Partial update for user-editable fields. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub task_type: Option<String>,
    pub project: Option<String>,
    pub executor: Option<ExecutorKind>,
    pub dangerous_mode: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
    pub recurrence: Option<Option<Recurrence>>,
    pub pr_url: Option<Option<String>>,
    pub pr_number: Option<Option<i64>>,
}

/// Listing filter for clients.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub project: Option<String>,
    pub task_type: Option<String>,
    pub include_terminal: bool,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

const TASK_COLUMNS: &str = "id, title, body, status, task_type, project, executor, \
     worktree_path, branch_name, port, session_key, window_key, agent_session_id, \
     dangerous_mode, pinned, tags, block_reason, error, pr_url, pr_number, \
     scheduled_at, recurrence, last_run_at, created_at, updated_at, started_at, completed_at";

pub(crate) fn row_to_task(row: &SqliteRow) -> Result<Task, StoreError> {
    let status: String = row.try_get("status")?;
    let executor: String = row.try_get("executor")?;
    let recurrence: Option<String> = row.try_get("recurrence")?;
    let tags: String = row.try_get("tags")?;
    let port: i64 = row.try_get("port")?;

    Ok(Task {
        id: TaskId::new(row.try_get("id")?),
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        status: TaskStatus::from_str(&status)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        task_type: row.try_get("task_type")?,
        project: row.try_get("project")?,
        executor: ExecutorKind::from_str(&executor)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        worktree_path: row.try_get("worktree_path")?,
        branch_name: row.try_get("branch_name")?,
        port: u16::try_from(port).map_err(|_| StoreError::Corrupt(format!("port {port}")))?,
        session_key: row.try_get("session_key")?,
        window_key: row.try_get("window_key")?,
        agent_session_id: row.try_get("agent_session_id")?,
        dangerous_mode: row.try_get("dangerous_mode")?,
        pinned: row.try_get("pinned")?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        block_reason: row.try_get("block_reason")?,
        error: row.try_get("error")?,
        pr_url: row.try_get("pr_url")?,
        pr_number: row.try_get("pr_number")?,
        scheduled_at: row.try_get("scheduled_at")?,
        recurrence: recurrence
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(Recurrence::from_str)
            .transpose()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        last_run_at: row.try_get("last_run_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

impl Store {
    /// Insert a new task in `backlog` and return the stored row.
    pub async fn create_task(&self, new: NewTask, now: DateTime<Utc>) -> Result<Task, StoreError> {
        let tags = serde_json::to_string(&new.tags).unwrap_or_else(|_| "[]".to_string());
        let row = sqlx::query(
            "INSERT INTO tasks (title, body, task_type, project, executor, dangerous_mode, \
             tags, scheduled_at, recurrence, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(&new.title)
        .bind(&new.body)
        .bind(if new.task_type.is_empty() {
            "code"
        } else {
            new.task_type.as_str()
        })
        .bind(&new.project)
        .bind(new.executor.as_str())
        .bind(new.dangerous_mode)
        .bind(&tags)
        .bind(new.scheduled_at)
        .bind(new.recurrence.map(|r| r.as_str().to_string()))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id")?;
        self.get_task(TaskId::new(id)).await
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task, StoreError> {
        let stmt = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?");
        let row = sqlx::query(&stmt)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::TaskNotFound(id))?;
        row_to_task(&row)
    }

    /// List tasks for clients. Pinned tasks sort first, then newest first.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut qb: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new(format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1=1"));

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        } else if !filter.include_terminal {
            qb.push(" AND status NOT IN ('done', 'failed', 'archived')");
        }
        if let Some(ref project) = filter.project {
            qb.push(" AND project = ").push_bind(project.clone());
        }
        if let Some(ref task_type) = filter.task_type {
            qb.push(" AND task_type = ").push_bind(task_type.clone());
        }
        qb.push(" ORDER BY pinned DESC, created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
            if let Some(offset) = filter.offset {
                qb.push(" OFFSET ").push_bind(i64::from(offset));
            }
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_task).collect()
    }

    /// Apply a patch to user-editable fields. Fails for unknown tasks.
    pub async fn update_task(
        &self,
        id: TaskId,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let current = self.get_task(id).await?;

        let title = patch.title.unwrap_or(current.title);
        let body = patch.body.unwrap_or(current.body);
        let task_type = patch.task_type.unwrap_or(current.task_type);
        let project = patch.project.unwrap_or(current.project);
        let executor = patch.executor.unwrap_or(current.executor);
        let dangerous_mode = patch.dangerous_mode.unwrap_or(current.dangerous_mode);
        let tags = patch.tags.unwrap_or(current.tags);
        let scheduled_at = patch.scheduled_at.unwrap_or(current.scheduled_at);
        let recurrence = patch.recurrence.unwrap_or(current.recurrence);
        let pr_url = patch.pr_url.unwrap_or(current.pr_url);
        let pr_number = patch.pr_number.unwrap_or(current.pr_number);

        sqlx::query(
            "UPDATE tasks SET title = ?, body = ?, task_type = ?, project = ?, executor = ?, \
             dangerous_mode = ?, tags = ?, scheduled_at = ?, recurrence = ?, pr_url = ?, \
             pr_number = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&title)
        .bind(&body)
        .bind(&task_type)
        .bind(&project)
        .bind(executor.as_str())
        .bind(dangerous_mode)
        .bind(serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string()))
        .bind(scheduled_at)
        .bind(recurrence.map(|r| r.as_str().to_string()))
        .bind(&pr_url)
        .bind(pr_number)
        .bind(now)
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;

        self.get_task(id).await
    }

    /// Delete a task and its child rows. Only terminal tasks may be deleted.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), StoreError> {
        let task = self.get_task(id).await?;
        if !task.status.is_terminal() {
            return Err(StoreError::InvalidState(format!(
                "cannot delete task {id} in status {}",
                task.status
            )));
        }
        // Orphan FTS rows first; cascades handle the rest.
        sqlx::query(
            "DELETE FROM task_search WHERE rowid IN (SELECT id FROM task_logs WHERE task_id = ?)",
        )
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Oldest queued task: `created_at` ascending, ties broken by id.
    pub async fn next_queued(&self) -> Result<Option<Task>, StoreError> {
        let stmt = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'queued' \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        );
        let row = sqlx::query(&stmt).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_task).transpose()
    }

    /// Atomic `queued -> processing` compare-and-swap, stamping `started_at`
    /// exactly once. Returns false when the task was not queued (lost race).
    pub async fn claim_for_processing(
        &self,
        id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'processing', \
             started_at = COALESCE(started_at, ?), updated_at = ? \
             WHERE id = ? AND status = 'queued'",
        )
        .bind(now)
        .bind(now)
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Conditional status transition. Returns false (no state change) when
    /// the task is not in one of the expected statuses; duplicate hook
    /// deliveries land here and become no-ops.
    pub async fn update_status_if(
        &self,
        id: TaskId,
        expected: &[TaskStatus],
        to: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if expected.is_empty() {
            return Err(StoreError::InvalidState("empty expected set".to_string()));
        }
        let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE tasks SET status = ");
        qb.push_bind(to.as_str());
        qb.push(", updated_at = ").push_bind(now);
        if matches!(to, TaskStatus::Done | TaskStatus::Failed) {
            qb.push(", completed_at = COALESCE(completed_at, ")
                .push_bind(now)
                .push(")");
        }
        qb.push(" WHERE id = ").push_bind(id.as_i64());
        qb.push(" AND status IN (");
        let mut sep = qb.separated(", ");
        for status in expected {
            sep.push_bind(status.as_str());
        }
        qb.push(")");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Smallest free port in `[min, max]` over active tasks, assigned to the
    /// task in one write transaction.
    pub async fn allocate_port(
        &self,
        id: TaskId,
        min: u16,
        max: u16,
    ) -> Result<u16, StoreError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            "SELECT port FROM tasks WHERE port != 0 \
             AND status IN ('queued', 'processing', 'blocked')",
        )
        .fetch_all(&mut *tx)
        .await?;
        let mut used: Vec<u16> = Vec::with_capacity(rows.len());
        for row in &rows {
            let port: i64 = row.try_get("port")?;
            if let Ok(port) = u16::try_from(port) {
                used.push(port);
            }
        }

        let Some(port) = (min..=max).find(|p| !used.contains(p)) else {
            tx.rollback().await?;
            return Err(StoreError::NoPortsAvailable(min, max));
        };

        let result = sqlx::query("UPDATE tasks SET port = ? WHERE id = ?")
            .bind(i64::from(port))
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::TaskNotFound(id));
        }

        tx.commit().await?;
        Ok(port)
    }

    /// Record the provisioned resources on the task row.
    pub async fn persist_allocations(
        &self,
        id: TaskId,
        worktree_path: &str,
        branch_name: &str,
        session_key: &str,
        window_key: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tasks SET worktree_path = ?, branch_name = ?, session_key = ?, \
             window_key = ?, updated_at = ? WHERE id = ?",
        )
        .bind(worktree_path)
        .bind(branch_name)
        .bind(session_key)
        .bind(window_key)
        .bind(now)
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Release the port and clear session coordinates. The branch name is
    /// kept for history (branch uniqueness is checked against it).
    pub async fn clear_allocations(
        &self,
        id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tasks SET port = 0, worktree_path = '', session_key = '', \
             window_key = '', updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the agent's session id once known (from SessionStart hooks or
    /// transcript announcements). Keeps the first non-empty value.
    pub async fn record_agent_session(
        &self,
        id: TaskId,
        session_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tasks SET agent_session_id = ? WHERE id = ? AND agent_session_id = ''",
        )
        .bind(session_id)
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_block_reason(
        &self,
        id: TaskId,
        reason: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE tasks SET block_reason = ? WHERE id = ?")
            .bind(reason)
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_error(&self, id: TaskId, error: Option<&str>) -> Result<(), StoreError> {
        sqlx::query("UPDATE tasks SET error = ? WHERE id = ?")
            .bind(error)
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_pinned(&self, id: TaskId, pinned: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE tasks SET pinned = ? WHERE id = ?")
            .bind(pinned)
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound(id));
        }
        Ok(())
    }

    /// Append retry feedback to the body, separated from the original intent.
    pub async fn append_feedback(
        &self,
        id: TaskId,
        feedback: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tasks SET body = body || char(10) || char(10) || '---' || char(10) || char(10) || ?, \
             updated_at = ? WHERE id = ?",
        )
        .bind(feedback)
        .bind(now)
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// True when any task (ever) has used the branch name.
    pub async fn branch_exists(&self, branch: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM tasks WHERE branch_name = ? LIMIT 1")
            .bind(branch)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// True when an active task currently owns the worktree path.
    pub async fn worktree_active(&self, path: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM tasks WHERE worktree_path = ? \
             AND status IN ('queued', 'processing', 'blocked') LIMIT 1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// All worktree paths referenced by non-terminal tasks (for the sweep).
    pub async fn active_worktrees(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT worktree_path FROM tasks WHERE worktree_path != '' \
             AND status NOT IN ('done', 'failed', 'archived')",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("worktree_path").map_err(Into::into))
            .collect()
    }

    pub async fn tasks_with_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        let stmt = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ? ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&stmt)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_task).collect()
    }

    /// Terminal tasks still holding a port, worktree, or window. The
    /// executor releases these within one tick.
    pub async fn tasks_needing_release(&self) -> Result<Vec<Task>, StoreError> {
        let stmt = format!(
            "SELECT {TASK_COLUMNS} FROM tasks \
             WHERE status IN ('done', 'failed', 'archived') \
             AND (port != 0 OR worktree_path != '' OR window_key != '')"
        );
        let rows = sqlx::query(&stmt).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_task).collect()
    }

    /// Backlog tasks whose `scheduled_at` has passed.
    pub async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let stmt = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'backlog' \
             AND scheduled_at IS NOT NULL AND scheduled_at <= ? \
             ORDER BY scheduled_at ASC, id ASC"
        );
        let rows = sqlx::query(&stmt).bind(now).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_task).collect()
    }

    /// Completed recurring tasks. The scheduler applies the cadence check.
    pub async fn recurring_done(&self) -> Result<Vec<Task>, StoreError> {
        let stmt = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = 'done' \
             AND recurrence IS NOT NULL AND recurrence != '' \
             ORDER BY id ASC"
        );
        let rows = sqlx::query(&stmt).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_task).collect()
    }

    pub async fn set_last_run_at(
        &self,
        id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE tasks SET last_run_at = ?, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(now)
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
