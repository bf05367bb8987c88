// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake session host for tests: records calls and tracks windows in memory.

use super::{SessionError, SessionHost, WindowSpec};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// A recorded session host invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    EnsureSession,
    Start { window: String, command: String },
    SendInput { window: String, text: String },
    Kill { window: String },
}

/// In-memory session host. Windows live in a set; tests can remove one to
/// simulate a crashed agent window.
#[derive(Clone, Default)]
pub struct FakeSessionHost {
    windows: Arc<Mutex<HashSet<String>>>,
    calls: Arc<Mutex<Vec<SessionCall>>>,
    fail_start: Arc<Mutex<bool>>,
}

impl FakeSessionHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().clone()
    }

    /// Make subsequent `start` calls fail (spawn error path).
    pub fn fail_next_start(&self) {
        *self.fail_start.lock() = true;
    }

    /// Simulate the window dying (agent crash / user closed it).
    pub fn drop_window(&self, window: &str) {
        self.windows.lock().remove(window);
    }

    pub fn has_window(&self, window: &str) -> bool {
        self.windows.lock().contains(window)
    }

    /// Pre-create a window, as reconciliation tests need.
    pub fn add_window(&self, window: &str) {
        self.windows.lock().insert(window.to_string());
    }

    /// Text sent to a window, in order.
    pub fn inputs_for(&self, window: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                SessionCall::SendInput { window: w, text } if w == window => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SessionHost for FakeSessionHost {
    fn session_key(&self) -> &str {
        "task-daemon"
    }

    async fn ensure_session(&self, _sprite: Option<&str>) -> Result<(), SessionError> {
        self.calls.lock().push(SessionCall::EnsureSession);
        Ok(())
    }

    async fn start(&self, spec: &WindowSpec) -> Result<(), SessionError> {
        self.calls.lock().push(SessionCall::Start {
            window: spec.window.clone(),
            command: spec.command.clone(),
        });
        if std::mem::take(&mut *self.fail_start.lock()) {
            return Err(SessionError::SpawnFailed("fake spawn failure".to_string()));
        }
        self.windows.lock().insert(spec.window.clone());
        Ok(())
    }

    async fn send_input(
        &self,
        window: &str,
        _sprite: Option<&str>,
        text: &str,
    ) -> Result<(), SessionError> {
        if !self.windows.lock().contains(window) {
            return Err(SessionError::NotFound(window.to_string()));
        }
        self.calls.lock().push(SessionCall::SendInput {
            window: window.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn window_exists(
        &self,
        window: &str,
        _sprite: Option<&str>,
    ) -> Result<bool, SessionError> {
        Ok(self.windows.lock().contains(window))
    }

    async fn kill(&self, window: &str, _sprite: Option<&str>) -> Result<(), SessionError> {
        self.calls.lock().push(SessionCall::Kill {
            window: window.to_string(),
        });
        self.windows.lock().remove(window);
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
