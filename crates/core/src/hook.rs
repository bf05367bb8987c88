// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook file records: one JSON object per line in `.task-hooks.jsonl`.
//!
//! The agent's hook scripts merge `{"task_id":<id>,"event":"<class>"}` with
//! whatever the agent piped to them, so every field beyond those two is
//! opaque to the core and passed through into logs and event metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::task::TaskId;

/// Hook classes the agent emits. `Other` absorbs classes added by newer
/// agent versions without breaking the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookClass {
    PreToolUse,
    PostToolUse,
    Notification,
    Stop,
    SessionStart,
    CompactionSummary,
    #[serde(other)]
    Other,
}

impl fmt::Display for HookClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookClass::PreToolUse => "PreToolUse",
            HookClass::PostToolUse => "PostToolUse",
            HookClass::Notification => "Notification",
            HookClass::Stop => "Stop",
            HookClass::SessionStart => "SessionStart",
            HookClass::CompactionSummary => "CompactionSummary",
            HookClass::Other => "Other",
        };
        f.write_str(s)
    }
}

/// A parsed hook line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookLine {
    pub task_id: TaskId,
    pub event: HookClass,
    /// Notification matcher (`permission_prompt`, `idle_prompt`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matcher: Option<String>,
    /// Prompt or message text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Stop reason (`end_turn`, `error`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Agent session id (SessionStart)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Tool name (PreToolUse/PostToolUse)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Compaction summary content (CompactionSummary)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Everything else the agent attached, passed through verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HookLine {
    /// Parse a single JSONL line. Returns `None` for blank or malformed
    /// lines; callers count those.
    pub fn parse(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }

    /// Short description for tool-use log lines.
    pub fn tool_summary(&self) -> String {
        match &self.tool_name {
            Some(name) => name.clone(),
            None => "tool".to_string(),
        }
    }
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
