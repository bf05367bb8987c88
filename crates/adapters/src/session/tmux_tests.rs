// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn default_session_key() {
    let host = TmuxSessionHost::default();
    assert_eq!(host.session_key(), "task-daemon");
}

#[test]
fn pane_target_joins_session_and_window() {
    let host = TmuxSessionHost::new("task-daemon");
    assert_eq!(host.pane_target("task-42"), "task-daemon:task-42");
}

#[test]
fn runner_selection_follows_sprite() {
    let host = TmuxSessionHost::default();
    assert_eq!(host.runner(None).target(), "local");
    assert_eq!(host.runner(Some("sprite-3")).target(), "sprite:sprite-3");
}
