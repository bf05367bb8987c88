// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource allocator: port, branch name, and worktree path per task.
//!
//! Stateless over the store. Port assignment is the store's job (the only
//! code allowed to write ports); this module derives branch and worktree
//! names and resolves collisions by appending the task id.

use std::path::PathBuf;

use tq_core::{Project, Task};
use tq_storage::Store;

use crate::config::{EngineConfig, WORKTREES_DIR};
use crate::error::EngineError;
use crate::slug::slugify;

/// Maximum slug length inside a branch name.
const SLUG_MAX: usize = 40;

/// Resources assigned to a started task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub port: u16,
    pub branch_name: String,
    pub worktree_path: PathBuf,
}

/// Allocates and releases per-task resources.
#[derive(Clone)]
pub struct Allocator {
    store: Store,
    port_min: u16,
    port_max: u16,
}

impl Allocator {
    pub fn new(store: Store, config: &EngineConfig) -> Self {
        Self {
            store,
            port_min: config.port_min,
            port_max: config.port_max,
        }
    }

    /// Assign a free port, a unique branch name, and a worktree path.
    pub async fn allocate(
        &self,
        task: &Task,
        project: &Project,
    ) -> Result<Allocation, EngineError> {
        let port = self
            .store
            .allocate_port(task.id, self.port_min, self.port_max)
            .await?;

        let mut slug = slugify(&task.title, SLUG_MAX);
        if slug.is_empty() {
            slug = "task".to_string();
        }

        let mut branch_name = format!("task-{}/{}", task.id, slug);
        if self.store.branch_exists(&branch_name).await? {
            slug = format!("{}-{}", slug, task.id);
            branch_name = format!("task-{}/{}", task.id, slug);
        }

        // The worktree directory drops the task-id prefix, so an active
        // task with the same title could own the same path.
        let mut worktree_path = project
            .filesystem_path
            .join(WORKTREES_DIR)
            .join(&slug);
        if self
            .store
            .worktree_active(&worktree_path.to_string_lossy())
            .await?
        {
            worktree_path = project
                .filesystem_path
                .join(WORKTREES_DIR)
                .join(format!("{}-{}", slug, task.id));
        }

        tracing::debug!(
            task_id = %task.id,
            port,
            branch = %branch_name,
            worktree = %worktree_path.display(),
            "allocated resources"
        );

        Ok(Allocation {
            port,
            branch_name,
            worktree_path,
        })
    }

    /// Release the task's port and session coordinates in the store.
    /// Worktree teardown is the provisioner's job.
    pub async fn release(
        &self,
        task: &Task,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), EngineError> {
        self.store.clear_allocations(task.id, now).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;
