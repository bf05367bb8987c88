// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! tq-storage: the durable relational store behind the task queue.
//!
//! A single SQLite file opened in WAL mode with foreign keys enforced.
//! Readers are non-blocking; writers serialize through SQLite's write lock.
//! Schema upgrades run at open time in one idempotent, add-only migration
//! pass so downgrades are tolerated.

mod context;
mod events;
mod logs;
mod migration;
mod projects;
mod settings;
mod store;
mod tasks;
mod threads;

pub use context::{Attachment, CompactionSummary, ProjectMemory, TaskType};
pub use events::EventRow;
pub use logs::{LogRow, SearchHit};
pub use store::Store;
pub use tasks::{NewTask, TaskFilter, TaskPatch};

use thiserror::Error;
use tq_core::TaskId;

/// Errors surfaced at the store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("project {0} still has active tasks")]
    ProjectInUse(String),

    #[error("no ports available in range {0}..={1}")]
    NoPortsAvailable(u16, u16),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// True for transient SQLITE_BUSY-style failures the caller may retry.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Db(sqlx::Error::Database(e)) => {
                e.code().as_deref() == Some("5") || e.code().as_deref() == Some("6")
            }
            _ => false,
        }
    }
}
