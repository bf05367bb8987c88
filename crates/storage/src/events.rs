// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable event log: the system of record behind the live bus.
//!
//! Subscribers that miss a live event (drop-on-full) catch up by querying
//! rows after their last seen id.

use chrono::{DateTime, Utc};
use sqlx::Row;

use tq_core::{Event, TaskId};

use crate::{Store, StoreError};

/// A persisted event row.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub id: i64,
    pub event_type: String,
    pub task_id: Option<TaskId>,
    pub message: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Store {
    /// Append an event to the durable log. Returns the row id.
    pub async fn append_event(
        &self,
        event: &Event,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let metadata = event.metadata().to_string();
        let row = sqlx::query(
            "INSERT INTO event_log (event_type, task_id, message, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(event.name())
        .bind(event.task_id().map(|id| id.as_i64()))
        .bind(event.message())
        .bind(metadata)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    /// Events after the given id, oldest first. Used for subscriber catch-up.
    pub async fn events_after(&self, after_id: i64, limit: u32) -> Result<Vec<EventRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, event_type, task_id, message, metadata, created_at \
             FROM event_log WHERE id > ? ORDER BY id ASC LIMIT ?",
        )
        .bind(after_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_event).collect()
    }

    /// Recent events for a task, newest first.
    pub async fn events_for_task(
        &self,
        task_id: TaskId,
        limit: u32,
    ) -> Result<Vec<EventRow>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, event_type, task_id, message, metadata, created_at \
             FROM event_log WHERE task_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(task_id.as_i64())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_event).collect()
    }

    /// Total number of persisted events (test and audit support).
    pub async fn event_count(&self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM event_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<EventRow, StoreError> {
    let metadata: String = row.try_get("metadata")?;
    let task_id: Option<i64> = row.try_get("task_id")?;
    Ok(EventRow {
        id: row.try_get("id")?,
        event_type: row.try_get("event_type")?,
        task_id: task_id.map(TaskId::new),
        message: row.try_get("message")?,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| StoreError::Corrupt(format!("event metadata: {e}")))?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
