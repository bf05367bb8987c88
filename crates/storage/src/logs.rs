// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transcript log rows and full-text search.
//!
//! `task_logs` is append-only; each insert mirrors the content into the
//! `task_search` FTS5 table under the same rowid so rotation can delete
//! both sides in one pass.

use chrono::{DateTime, Utc};
use sqlx::Row;

use tq_core::{LineType, TaskId};

use crate::{Store, StoreError};

/// A stored transcript line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub id: i64,
    pub task_id: TaskId,
    pub line_type: LineType,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A search result: either a task match (title/body/tag) or a transcript
/// match with the matching line attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub task_id: TaskId,
    pub title: String,
    pub snippet: String,
    pub updated_at: DateTime<Utc>,
}

impl Store {
    /// Append a transcript line. Fails when the task does not exist
    /// (foreign key).
    pub async fn append_log(
        &self,
        task_id: TaskId,
        line_type: LineType,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO task_logs (task_id, line_type, content, created_at) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(task_id.as_i64())
        .bind(line_type.as_str())
        .bind(content)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.message().contains("FOREIGN KEY") => {
                StoreError::TaskNotFound(task_id)
            }
            _ => StoreError::Db(e),
        })?;
        let id: i64 = row.try_get("id")?;

        sqlx::query("INSERT INTO task_search (rowid, content) VALUES (?, ?)")
            .bind(id)
            .bind(content)
            .execute(&self.pool)
            .await?;

        Ok(id)
    }

    /// Most recent `limit` lines for a task, oldest first.
    pub async fn logs_for_task(
        &self,
        task_id: TaskId,
        limit: u32,
    ) -> Result<Vec<LogRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, task_id, line_type, content, created_at FROM ( \
                 SELECT * FROM task_logs WHERE task_id = ? ORDER BY id DESC LIMIT ? \
             ) ORDER BY id ASC",
        )
        .bind(task_id.as_i64())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let line_type: String = row.try_get("line_type")?;
                Ok(LogRow {
                    id: row.try_get("id")?,
                    task_id: TaskId::new(row.try_get("task_id")?),
                    line_type: line_type
                        .parse()
                        .map_err(|_| StoreError::Corrupt(format!("line_type {line_type}")))?,
                    content: row.try_get("content")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Rotate logs: per task, keep the most recent `keep_per_task` lines plus
    /// anything newer than `cutoff`. Returns the number of deleted rows.
    pub async fn purge_logs_older_than(
        &self,
        cutoff: DateTime<Utc>,
        keep_per_task: u32,
    ) -> Result<u64, StoreError> {
        let rows = sqlx::query(
            "DELETE FROM task_logs WHERE id IN ( \
                 SELECT id FROM ( \
                     SELECT id, created_at, \
                            ROW_NUMBER() OVER (PARTITION BY task_id ORDER BY id DESC) AS rn \
                     FROM task_logs \
                 ) WHERE rn > ? AND created_at < ? \
             ) RETURNING id",
        )
        .bind(i64::from(keep_per_task))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            let id: i64 = row.try_get("id")?;
            sqlx::query("DELETE FROM task_search WHERE rowid = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
        }

        Ok(rows.len() as u64)
    }

    /// Title/body/tag substring match plus transcript full-text match,
    /// ordered by recency.
    pub async fn search(&self, query: &str, limit: u32) -> Result<Vec<SearchHit>, StoreError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("%{query}%");
        let rows = sqlx::query(
            "SELECT id, title, '' AS snippet, updated_at FROM tasks \
             WHERE title LIKE ?1 OR body LIKE ?1 OR tags LIKE ?1 \
             UNION \
             SELECT t.id, t.title, l.content AS snippet, t.updated_at \
             FROM task_search \
             JOIN task_logs l ON l.id = task_search.rowid \
             JOIN tasks t ON t.id = l.task_id \
             WHERE task_search MATCH ?2 \
             ORDER BY updated_at DESC LIMIT ?3",
        )
        .bind(&pattern)
        .bind(fts_quote(query))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SearchHit {
                    task_id: TaskId::new(row.try_get("id")?),
                    title: row.try_get("title")?,
                    snippet: row.try_get("snippet")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }
}

/// Quote a user query for FTS5 so punctuation cannot break the MATCH
/// grammar: each term becomes a quoted string.
fn fts_quote(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
