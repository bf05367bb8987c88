// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prompt context rows: task types, attachments, project memories, and
//! compaction summaries. All are inputs to prompt rendering.

use chrono::{DateTime, Utc};
use sqlx::Row;

use tq_core::TaskId;

use crate::{Store, StoreError};

/// A named prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskType {
    pub name: String,
    pub prompt_template: String,
}

/// A file attached to a task, inlined into the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: i64,
    pub task_id: TaskId,
    pub filename: String,
    pub content: String,
}

/// A remembered note for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMemory {
    pub id: i64,
    pub project: String,
    pub content: String,
}

/// A context-compaction record written by the agent's CompactionSummary hook.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionSummary {
    pub id: i64,
    pub task_id: TaskId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Store {
    pub async fn get_task_type(&self, name: &str) -> Result<Option<TaskType>, StoreError> {
        let row = sqlx::query("SELECT name, prompt_template FROM task_types WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            Ok(TaskType {
                name: r.try_get("name")?,
                prompt_template: r.try_get("prompt_template")?,
            })
        })
        .transpose()
    }

    pub async fn upsert_task_type(&self, name: &str, template: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO task_types (name, prompt_template) VALUES (?, ?) \
             ON CONFLICT(name) DO UPDATE SET prompt_template = excluded.prompt_template",
        )
        .bind(name)
        .bind(template)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn add_attachment(
        &self,
        task_id: TaskId,
        filename: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO task_attachments (task_id, filename, content, created_at) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(task_id.as_i64())
        .bind(filename)
        .bind(content)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    pub async fn attachments_for_task(
        &self,
        task_id: TaskId,
    ) -> Result<Vec<Attachment>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, task_id, filename, content FROM task_attachments \
             WHERE task_id = ? ORDER BY id ASC",
        )
        .bind(task_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(Attachment {
                    id: r.try_get("id")?,
                    task_id: TaskId::new(r.try_get("task_id")?),
                    filename: r.try_get("filename")?,
                    content: r.try_get("content")?,
                })
            })
            .collect()
    }

    pub async fn add_project_memory(
        &self,
        project: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO project_memories (project, content, created_at) \
             VALUES (?, ?, ?) RETURNING id",
        )
        .bind(project)
        .bind(content)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    pub async fn memories_for_project(
        &self,
        project: &str,
    ) -> Result<Vec<ProjectMemory>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, project, content FROM project_memories \
             WHERE project = ? ORDER BY id ASC",
        )
        .bind(project)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(ProjectMemory {
                    id: r.try_get("id")?,
                    project: r.try_get("project")?,
                    content: r.try_get("content")?,
                })
            })
            .collect()
    }

    pub async fn add_compaction_summary(
        &self,
        task_id: TaskId,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO task_compaction_summaries (task_id, content, created_at) \
             VALUES (?, ?, ?) RETURNING id",
        )
        .bind(task_id.as_i64())
        .bind(content)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    /// Most recent compaction summary for a task, if any. Used as the
    /// `{{history}}` context when resuming.
    pub async fn latest_compaction_summary(
        &self,
        task_id: TaskId,
    ) -> Result<Option<CompactionSummary>, StoreError> {
        let row = sqlx::query(
            "SELECT id, task_id, content, created_at FROM task_compaction_summaries \
             WHERE task_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(task_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            Ok(CompactionSummary {
                id: r.try_get("id")?,
                task_id: TaskId::new(r.try_get("task_id")?),
                content: r.try_get("content")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
