// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project rows.

use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::PathBuf;

use tq_core::Project;

use crate::{Store, StoreError};

fn row_to_project(row: &SqliteRow) -> Result<Project, StoreError> {
    let path: String = row.try_get("filesystem_path")?;
    let aliases: String = row.try_get("aliases")?;
    Ok(Project {
        name: row.try_get("name")?,
        filesystem_path: PathBuf::from(path),
        aliases: serde_json::from_str(&aliases).unwrap_or_default(),
        prompt_instructions: row.try_get("prompt_instructions")?,
        color: row.try_get("color")?,
        remote_sprite_name: row.try_get("remote_sprite_name")?,
    })
}

impl Store {
    /// Insert or update a project by name.
    pub async fn upsert_project(&self, project: &Project) -> Result<(), StoreError> {
        let aliases =
            serde_json::to_string(&project.aliases).unwrap_or_else(|_| "[]".to_string());
        sqlx::query(
            "INSERT INTO projects \
             (name, filesystem_path, aliases, prompt_instructions, color, remote_sprite_name) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET \
             filesystem_path = excluded.filesystem_path, \
             aliases = excluded.aliases, \
             prompt_instructions = excluded.prompt_instructions, \
             color = excluded.color, \
             remote_sprite_name = excluded.remote_sprite_name",
        )
        .bind(&project.name)
        .bind(project.filesystem_path.to_string_lossy().into_owned())
        .bind(aliases)
        .bind(&project.prompt_instructions)
        .bind(&project.color)
        .bind(&project.remote_sprite_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Look up a project by exact name.
    pub async fn get_project(&self, name: &str) -> Result<Project, StoreError> {
        let row = sqlx::query(
            "SELECT name, filesystem_path, aliases, prompt_instructions, color, \
             remote_sprite_name FROM projects WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::ProjectNotFound(name.to_string()))?;
        row_to_project(&row)
    }

    /// Resolve a name against project names and aliases.
    pub async fn resolve_project(&self, name: &str) -> Result<Project, StoreError> {
        if let Ok(project) = self.get_project(name).await {
            return Ok(project);
        }
        for project in self.list_projects().await? {
            if project.matches(name) {
                return Ok(project);
            }
        }
        Err(StoreError::ProjectNotFound(name.to_string()))
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query(
            "SELECT name, filesystem_path, aliases, prompt_instructions, color, \
             remote_sprite_name FROM projects ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_project).collect()
    }

    /// Delete a project. Refused while it still has active tasks.
    pub async fn delete_project(&self, name: &str) -> Result<(), StoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM tasks WHERE project = ? \
             AND status IN ('queued', 'processing', 'blocked') LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        if row.is_some() {
            return Err(StoreError::ProjectInUse(name.to_string()));
        }
        let result = sqlx::query("DELETE FROM projects WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ProjectNotFound(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "projects_tests.rs"]
mod tests;
