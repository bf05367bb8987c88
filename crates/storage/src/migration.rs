// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Idempotent, add-only schema migration.
//!
//! Tables are created if missing and columns added if missing; nothing is
//! ever dropped or renamed, so a database written by a newer daemon still
//! opens under an older one.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::StoreError;

const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS projects (
        name TEXT PRIMARY KEY,
        filesystem_path TEXT NOT NULL,
        aliases TEXT NOT NULL DEFAULT '[]',
        prompt_instructions TEXT NOT NULL DEFAULT '',
        color TEXT NOT NULL DEFAULT '',
        remote_sprite_name TEXT
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        body TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'backlog',
        task_type TEXT NOT NULL DEFAULT 'code',
        project TEXT NOT NULL DEFAULT '',
        executor TEXT NOT NULL DEFAULT 'claude',
        worktree_path TEXT NOT NULL DEFAULT '',
        branch_name TEXT NOT NULL DEFAULT '',
        port INTEGER NOT NULL DEFAULT 0,
        session_key TEXT NOT NULL DEFAULT '',
        window_key TEXT NOT NULL DEFAULT '',
        agent_session_id TEXT NOT NULL DEFAULT '',
        dangerous_mode INTEGER NOT NULL DEFAULT 0,
        pinned INTEGER NOT NULL DEFAULT 0,
        tags TEXT NOT NULL DEFAULT '[]',
        block_reason TEXT,
        error TEXT,
        pr_url TEXT,
        pr_number INTEGER,
        scheduled_at TEXT,
        recurrence TEXT,
        last_run_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status, created_at)",
    "CREATE TABLE IF NOT EXISTS task_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        line_type TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_task_logs_task ON task_logs(task_id, id)",
    // External-content FTS index over transcripts; rowid mirrors task_logs.id
    "CREATE VIRTUAL TABLE IF NOT EXISTS task_search USING fts5(content)",
    "CREATE TABLE IF NOT EXISTS event_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        task_id INTEGER,
        message TEXT NOT NULL DEFAULT '',
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_event_log_task ON event_log(task_id, id)",
    "CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS task_types (
        name TEXT PRIMARY KEY,
        prompt_template TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS task_attachments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        filename TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS threads (
        thread_key TEXT PRIMARY KEY,
        task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS project_memories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS task_compaction_summaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
];

/// Columns added after the initial schema. Each entry is checked against
/// PRAGMA table_info and added when absent.
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[
    // (table, column, definition)
    ("tasks", "pinned", "INTEGER NOT NULL DEFAULT 0"),
    ("tasks", "tags", "TEXT NOT NULL DEFAULT '[]'"),
    ("tasks", "block_reason", "TEXT"),
    ("projects", "remote_sprite_name", "TEXT"),
];

/// Built-in prompt templates seeded on first open. `INSERT OR IGNORE` so
/// user edits survive restarts.
const SEED_TASK_TYPES: &[(&str, &str)] = &[
    (
        "code",
        "You are working in the {{project}} repository.\n\
         {{project_instructions}}\n\n\
         Project notes:\n{{memories}}\n\n\
         # Task: {{title}}\n\n{{body}}\n\n\
         {{attachments}}\n{{history}}\n\
         Make the change, run the tests, and commit on the current branch.",
    ),
    (
        "writing",
        "You are drafting a document for the {{project}} project.\n\
         {{project_instructions}}\n\n\
         # {{title}}\n\n{{body}}\n\n{{attachments}}\n{{history}}",
    ),
    (
        "thinking",
        "Think through the following question for the {{project}} project.\n\
         Write your conclusions to NOTES.md.\n\n\
         # {{title}}\n\n{{body}}\n\n{{memories}}\n{{history}}",
    ),
];

/// Run the full migration pass. Safe to call on every open.
pub(crate) async fn run(pool: &SqlitePool) -> Result<(), StoreError> {
    for stmt in CREATE_TABLES {
        sqlx::query(stmt).execute(pool).await?;
    }

    for (table, column, definition) in ADDED_COLUMNS {
        if !column_exists(pool, table, column).await? {
            let stmt = format!("ALTER TABLE {table} ADD COLUMN {column} {definition}");
            sqlx::query(&stmt).execute(pool).await?;
            tracing::info!(%table, %column, "migrated: added column");
        }
    }

    for (name, template) in SEED_TASK_TYPES {
        sqlx::query("INSERT OR IGNORE INTO task_types (name, prompt_template) VALUES (?, ?)")
            .bind(name)
            .bind(template)
            .execute(pool)
            .await?;
    }

    Ok(())
}

async fn column_exists(pool: &SqlitePool, table: &str, column: &str) -> Result<bool, StoreError> {
    let stmt = format!("PRAGMA table_info({table})");
    let rows = sqlx::query(&stmt).fetch_all(pool).await?;
    for row in rows {
        let name: String = row.try_get("name")?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
#[path = "migration_tests.rs"]
mod tests;
