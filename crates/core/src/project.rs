// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project entity: a workspace tasks bind to.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A project workspace. Created once per repository the daemon manages.
///
/// `remote_sprite_name` selects remote execution: when set, worktrees,
/// sessions, and transcript tails for the project's tasks run on that
/// sprite (a remote VM reachable over ssh) instead of the local host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub filesystem_path: PathBuf,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub prompt_instructions: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_sprite_name: Option<String>,
}

impl Project {
    pub fn new(name: impl Into<String>, filesystem_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            filesystem_path: filesystem_path.into(),
            aliases: Vec::new(),
            prompt_instructions: String::new(),
            color: String::new(),
            remote_sprite_name: None,
        }
    }

    /// True when the project's workspaces live on a sprite.
    pub fn is_remote(&self) -> bool {
        self.remote_sprite_name.is_some()
    }

    /// Match a name against the project name or any alias.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
