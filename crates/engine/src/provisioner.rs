// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace provisioner: git worktrees plus per-task agent configuration.
//!
//! Every step runs through the [`CommandRunner`] seam, so a project bound
//! to a sprite gets the identical command sequence executed on the remote
//! VM. File writes go through `sh -c 'cat > path'` for the same reason.

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tq_adapters::subprocess::{GIT_FETCH_TIMEOUT, GIT_WORKTREE_TIMEOUT};
use tq_adapters::{CommandRunner, LocalRunner, SshRunner};
use tq_core::{Project, Task, TaskId};

use crate::allocator::Allocation;
use crate::config::{AGENT_CONFIG_DIR, HOOKS_FILE, PROMPT_FILE, TRANSCRIPT_FILE, WORKTREES_DIR};
use crate::error::EngineError;
use crate::retry::with_backoff;

/// Attempts for the best-effort `git fetch`.
const FETCH_ATTEMPTS: u32 = 3;

/// Provisions and tears down per-task workspaces.
#[derive(Clone)]
pub struct Provisioner {
    local: Arc<dyn CommandRunner>,
}

impl Provisioner {
    pub fn new() -> Self {
        Self {
            local: Arc::new(LocalRunner::new()),
        }
    }

    /// Replace the local runner (tests inject a recording fake).
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self { local: runner }
    }

    fn runner(&self, sprite: Option<&str>) -> Arc<dyn CommandRunner> {
        match sprite {
            Some(host) => Arc::new(SshRunner::new(host)),
            None => self.local.clone(),
        }
    }

    /// Create the task's worktree and install its agent configuration.
    pub async fn create(
        &self,
        task: &Task,
        project: &Project,
        alloc: &Allocation,
    ) -> Result<(), EngineError> {
        let runner = self.runner(project.remote_sprite_name.as_deref());
        let project_path = project.filesystem_path.to_string_lossy().into_owned();
        let worktree = alloc.worktree_path.to_string_lossy().into_owned();

        // 1. Ensure the project is a git repository.
        let inside = runner
            .run(
                "git",
                &args(&["-C", &project_path, "rev-parse", "--is-inside-work-tree"]),
                None,
                GIT_WORKTREE_TIMEOUT,
            )
            .await?;
        if !inside.status.success() {
            tracing::info!(project = %project.name, "initializing git repository");
            let init = runner
                .run("git", &args(&["init", &project_path]), None, GIT_WORKTREE_TIMEOUT)
                .await?;
            if !init.status.success() {
                return Err(provision_err("git init", &init));
            }
        }

        // 2. Best-effort fetch so the worktree branches from a fresh origin.
        let fetch = with_backoff(FETCH_ATTEMPTS, Duration::from_millis(500), |_| {
            let runner = runner.clone();
            let project_path = project_path.clone();
            async move {
                let out = runner
                    .run(
                        "git",
                        &args(&["-C", &project_path, "fetch", "origin"]),
                        None,
                        GIT_FETCH_TIMEOUT,
                    )
                    .await
                    .map_err(|e| e.to_string())?;
                if out.status.success() {
                    Ok(())
                } else {
                    Err(String::from_utf8_lossy(&out.stderr).into_owned())
                }
            }
        })
        .await;
        if let Err(e) = fetch {
            tracing::warn!(project = %project.name, error = %e, "git fetch failed (non-fatal)");
        }

        // 3. Add the worktree on a fresh branch, preferring origin/HEAD.
        // The -B attempt resets a branch left behind by an earlier run of
        // the same task (retry after teardown).
        let mut added = false;
        let mut last = None;
        for (flag, base) in [("-b", "origin/HEAD"), ("-b", "HEAD"), ("-B", "HEAD")] {
            let add = runner
                .run(
                    "git",
                    &args(&[
                        "-C",
                        &project_path,
                        "worktree",
                        "add",
                        &worktree,
                        flag,
                        &alloc.branch_name,
                        base,
                    ]),
                    None,
                    GIT_WORKTREE_TIMEOUT,
                )
                .await?;
            if add.status.success() {
                added = true;
                break;
            }
            last = Some(add);
        }
        if !added {
            return Err(match last {
                Some(output) => provision_err("git worktree add", &output),
                None => EngineError::Provision("git worktree add failed".to_string()),
            });
        }

        // 4. Agent settings with the hook classes wired to the hook file.
        let settings = self.settings_json(task.id, &alloc.worktree_path, &runner).await;
        let settings_path = format!("{worktree}/{AGENT_CONFIG_DIR}/settings.json");
        let write = runner
            .run_with_input(
                "sh",
                &args(&[
                    "-c",
                    &format!("mkdir -p {worktree}/{AGENT_CONFIG_DIR} && cat > {settings_path}"),
                ]),
                &format!("{:#}\n", settings),
                GIT_WORKTREE_TIMEOUT,
            )
            .await?;
        if !write.status.success() {
            return Err(provision_err("write agent settings", &write));
        }

        // 5. Touch the hook and transcript files so followers can attach.
        let touch = runner
            .run(
                "sh",
                &args(&[
                    "-c",
                    &format!("touch {worktree}/{HOOKS_FILE} {worktree}/{TRANSCRIPT_FILE}"),
                ]),
                None,
                GIT_WORKTREE_TIMEOUT,
            )
            .await?;
        if !touch.status.success() {
            return Err(provision_err("touch task files", &touch));
        }

        Ok(())
    }

    /// Write the rendered prompt into the worktree for `--prompt-from-file`.
    pub async fn write_prompt(
        &self,
        sprite: Option<&str>,
        worktree: &Path,
        prompt: &str,
    ) -> Result<(), EngineError> {
        let runner = self.runner(sprite);
        let path = format!("{}/{PROMPT_FILE}", worktree.display());
        let write = runner
            .run_with_input(
                "sh",
                &args(&["-c", &format!("cat > {path}")]),
                prompt,
                GIT_WORKTREE_TIMEOUT,
            )
            .await?;
        if !write.status.success() {
            return Err(provision_err("write prompt", &write));
        }
        Ok(())
    }

    /// Remove the task's worktree. Best-effort and idempotent.
    pub async fn teardown(
        &self,
        sprite: Option<&str>,
        project_path: &Path,
        worktree: &str,
    ) -> Result<(), EngineError> {
        if worktree.is_empty() {
            return Ok(());
        }
        let runner = self.runner(sprite);
        let project_path = project_path.to_string_lossy();

        let remove = runner
            .run(
                "git",
                &args(&[
                    "-C",
                    &project_path,
                    "worktree",
                    "remove",
                    "--force",
                    worktree,
                ]),
                None,
                GIT_WORKTREE_TIMEOUT,
            )
            .await?;
        if !remove.status.success() {
            tracing::debug!(worktree, "git worktree remove failed, removing directory");
        }

        // The directory can linger when the worktree was never registered.
        let _ = runner
            .run(
                "rm",
                &args(&["-rf", worktree]),
                None,
                GIT_WORKTREE_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    /// List worktree directories under a project (for the stale sweep).
    pub async fn list_worktrees(&self, project: &Project) -> Result<Vec<String>, EngineError> {
        let runner = self.runner(project.remote_sprite_name.as_deref());
        let dir = project.filesystem_path.join(WORKTREES_DIR);
        let out = runner
            .run(
                "sh",
                &args(&["-c", &format!("ls -1 {} 2>/dev/null || true", dir.display())]),
                None,
                GIT_WORKTREE_TIMEOUT,
            )
            .await?;
        Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| dir.join(l.trim()).to_string_lossy().into_owned())
            .collect())
    }

    /// Agent settings with the four hook classes appending to the hook
    /// file, merged over any settings the repository carries.
    async fn settings_json(
        &self,
        task_id: TaskId,
        worktree: &Path,
        runner: &Arc<dyn CommandRunner>,
    ) -> Value {
        let settings_path = worktree.join(AGENT_CONFIG_DIR).join("settings.json");
        let mut settings = match runner
            .run(
                "cat",
                &args(&[&settings_path.to_string_lossy()]),
                None,
                GIT_WORKTREE_TIMEOUT,
            )
            .await
        {
            Ok(out) if out.status.success() => {
                serde_json::from_slice(&out.stdout).unwrap_or_else(|_| json!({}))
            }
            _ => json!({}),
        };

        inject_hooks(&mut settings, task_id, worktree);
        settings
    }
}

impl Default for Provisioner {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire the four hook classes to append their stdin, tagged with the task
/// id and class, onto the worktree's hook file.
fn inject_hooks(settings: &mut Value, task_id: TaskId, worktree: &Path) {
    let hooks_path = worktree.join(HOOKS_FILE);

    if !settings.is_object() {
        *settings = json!({});
    }
    let Some(settings_obj) = settings.as_object_mut() else {
        return;
    };

    let hooks = settings_obj.entry("hooks").or_insert_with(|| json!({}));
    if !hooks.is_object() {
        *hooks = json!({});
    }
    let Some(hooks_obj) = hooks.as_object_mut() else {
        return;
    };

    for class in ["PreToolUse", "PostToolUse", "Notification", "Stop"] {
        let command = format!(
            "jq -c '. + {{\"task_id\":{},\"event\":\"{}\"}}' >> {}",
            task_id,
            class,
            hooks_path.display()
        );
        let entry = json!([{
            "matcher": "",
            "hooks": [{ "type": "command", "command": command }]
        }]);
        hooks_obj.insert(class.to_string(), entry);
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn provision_err(what: &str, output: &std::process::Output) -> EngineError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    EngineError::Provision(format!("{what}: {}", stderr.trim()))
}

#[cfg(test)]
#[path = "provisioner_tests.rs"]
mod tests;
