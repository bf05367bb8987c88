// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session host: one shared terminal-multiplexer session, one window per
//! task. The host never inspects window contents; transcript capture is
//! wired up at start time and consumed by the follower.

mod tmux;

pub use tmux::TmuxSessionHost;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSessionHost, SessionCall};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("window not found: {0}")]
    NotFound(String),
    #[error("spawn failed: {0}")]
    SpawnFailed(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Everything needed to open a task's window.
#[derive(Debug, Clone)]
pub struct WindowSpec {
    /// Window key (`task-<id>`)
    pub window: String,
    /// Working directory (the task's worktree)
    pub cwd: PathBuf,
    /// Agent command line, run by the window's shell
    pub command: String,
    /// Extra environment (`TASK_ID`, `TASK_TYPE`, ...)
    pub env: Vec<(String, String)>,
    /// File the window's output is piped into for the transcript tail
    pub transcript_path: PathBuf,
    /// Sprite host for remote projects, None for local
    pub sprite: Option<String>,
}

/// Adapter for the shared multiplexer session.
///
/// Every method takes the task's sprite so remote projects drive the
/// multiplexer on their sprite instead of the local host.
#[async_trait]
pub trait SessionHost: Clone + Send + Sync + 'static {
    /// The shared session key (`task-daemon`).
    fn session_key(&self) -> &str;

    /// Create the shared session if absent. Idempotent.
    async fn ensure_session(&self, sprite: Option<&str>) -> Result<(), SessionError>;

    /// Open the task's window and start the agent in it.
    async fn start(&self, spec: &WindowSpec) -> Result<(), SessionError>;

    /// Inject literal text followed by Enter into the task's window.
    async fn send_input(
        &self,
        window: &str,
        sprite: Option<&str>,
        text: &str,
    ) -> Result<(), SessionError>;

    /// Existence probe for reconciliation and liveness checks.
    async fn window_exists(&self, window: &str, sprite: Option<&str>)
        -> Result<bool, SessionError>;

    /// Terminate the task's window. Best-effort, idempotent.
    async fn kill(&self, window: &str, sprite: Option<&str>) -> Result<(), SessionError>;
}
