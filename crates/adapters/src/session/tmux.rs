// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux session host

use super::{SessionError, SessionHost, WindowSpec};
use crate::runner::{CommandRunner, LocalRunner, SshRunner};
use crate::subprocess::TMUX_TIMEOUT;
use async_trait::async_trait;
use std::process::Output;
use std::sync::Arc;

/// Default shared session key.
pub const DEFAULT_SESSION_KEY: &str = "task-daemon";

/// Tmux-based session host. One shared session, one window per task.
#[derive(Clone)]
pub struct TmuxSessionHost {
    session: String,
    local: Arc<LocalRunner>,
}

impl TmuxSessionHost {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            local: Arc::new(LocalRunner::new()),
        }
    }

    fn runner(&self, sprite: Option<&str>) -> Arc<dyn CommandRunner> {
        match sprite {
            Some(host) => Arc::new(SshRunner::new(host)),
            None => self.local.clone(),
        }
    }

    fn pane_target(&self, window: &str) -> String {
        format!("{}:{}", self.session, window)
    }

    async fn tmux(
        &self,
        sprite: Option<&str>,
        args: Vec<String>,
    ) -> Result<Output, SessionError> {
        self.runner(sprite)
            .run("tmux", &args, None, TMUX_TIMEOUT)
            .await
            .map_err(|e| SessionError::CommandFailed(e.to_string()))
    }
}

impl Default for TmuxSessionHost {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_KEY)
    }
}

#[async_trait]
impl SessionHost for TmuxSessionHost {
    fn session_key(&self) -> &str {
        &self.session
    }

    async fn ensure_session(&self, sprite: Option<&str>) -> Result<(), SessionError> {
        let exists = self
            .tmux(
                sprite,
                vec![
                    "has-session".to_string(),
                    "-t".to_string(),
                    self.session.clone(),
                ],
            )
            .await?;
        if exists.status.success() {
            return Ok(());
        }

        let output = self
            .tmux(
                sprite,
                vec![
                    "new-session".to_string(),
                    "-d".to_string(),
                    "-s".to_string(),
                    self.session.clone(),
                ],
            )
            .await?;
        // Lost race with a concurrent create: "duplicate session" is fine
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.contains("duplicate session") {
                return Err(SessionError::SpawnFailed(stderr.to_string()));
            }
        }
        Ok(())
    }

    async fn start(&self, spec: &WindowSpec) -> Result<(), SessionError> {
        let mut args = vec![
            "new-window".to_string(),
            "-d".to_string(),
            "-t".to_string(),
            self.session.clone(),
            "-n".to_string(),
            spec.window.clone(),
            "-c".to_string(),
            spec.cwd.to_string_lossy().into_owned(),
        ];
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(spec.command.clone());

        let output = self.tmux(spec.sprite.as_deref(), args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(window = %spec.window, stderr = %stderr, "tmux new-window failed");
            return Err(SessionError::SpawnFailed(stderr.to_string()));
        }

        // Install transcript capture. The tail follows this file.
        let pipe = self
            .tmux(
                spec.sprite.as_deref(),
                vec![
                    "pipe-pane".to_string(),
                    "-t".to_string(),
                    self.pane_target(&spec.window),
                    "-o".to_string(),
                    format!("cat >> {}", spec.transcript_path.display()),
                ],
            )
            .await?;
        if !pipe.status.success() {
            let stderr = String::from_utf8_lossy(&pipe.stderr);
            tracing::warn!(window = %spec.window, stderr = %stderr, "pipe-pane failed");
        }

        Ok(())
    }

    async fn send_input(
        &self,
        window: &str,
        sprite: Option<&str>,
        text: &str,
    ) -> Result<(), SessionError> {
        // -l = literal mode (no key name interpretation)
        // -- = end of options (handles text starting with -)
        let output = self
            .tmux(
                sprite,
                vec![
                    "send-keys".to_string(),
                    "-t".to_string(),
                    self.pane_target(window),
                    "-l".to_string(),
                    "--".to_string(),
                    text.to_string(),
                ],
            )
            .await?;
        if !output.status.success() {
            return Err(SessionError::NotFound(window.to_string()));
        }

        let enter = self
            .tmux(
                sprite,
                vec![
                    "send-keys".to_string(),
                    "-t".to_string(),
                    self.pane_target(window),
                    "Enter".to_string(),
                ],
            )
            .await?;
        if !enter.status.success() {
            return Err(SessionError::NotFound(window.to_string()));
        }
        Ok(())
    }

    async fn window_exists(
        &self,
        window: &str,
        sprite: Option<&str>,
    ) -> Result<bool, SessionError> {
        let output = self
            .tmux(
                sprite,
                vec![
                    "list-windows".to_string(),
                    "-t".to_string(),
                    self.session.clone(),
                    "-F".to_string(),
                    "#{window_name}".to_string(),
                ],
            )
            .await?;
        if !output.status.success() {
            // Session itself is gone
            return Ok(false);
        }
        let names = String::from_utf8_lossy(&output.stdout);
        Ok(names.lines().any(|name| name.trim() == window))
    }

    async fn kill(&self, window: &str, sprite: Option<&str>) -> Result<(), SessionError> {
        let output = self
            .tmux(
                sprite,
                vec![
                    "kill-window".to_string(),
                    "-t".to_string(),
                    self.pane_target(window),
                ],
            )
            .await?;
        if !output.status.success() {
            // Window might already be dead, which is fine
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
