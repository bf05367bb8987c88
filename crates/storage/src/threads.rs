// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thread bindings: map an adapter-chosen stable key (e.g. an email
//! Message-ID) to the task that owns the conversation. The key format is
//! the adapter's business; the store only requires uniqueness.

use chrono::{DateTime, Utc};
use sqlx::Row;

use tq_core::TaskId;

use crate::{Store, StoreError};

impl Store {
    /// Bind a thread key to a task. Re-binding an existing key moves it.
    pub async fn bind_thread(
        &self,
        thread_key: &str,
        task_id: TaskId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO threads (thread_key, task_id, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(thread_key) DO UPDATE SET task_id = excluded.task_id",
        )
        .bind(thread_key)
        .bind(task_id.as_i64())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.message().contains("FOREIGN KEY") => {
                StoreError::TaskNotFound(task_id)
            }
            _ => StoreError::Db(e),
        })?;
        Ok(())
    }

    /// Resolve a thread key to its owning task, if bound.
    pub async fn resolve_thread(&self, thread_key: &str) -> Result<Option<TaskId>, StoreError> {
        let row = sqlx::query("SELECT task_id FROM threads WHERE thread_key = ?")
            .bind(thread_key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get("task_id").map(TaskId::new).map_err(Into::into))
            .transpose()
    }
}

#[cfg(test)]
#[path = "threads_tests.rs"]
mod tests;
