// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_project_is_local() {
    let project = Project::new("personal", "/home/u/personal");
    assert!(!project.is_remote());
    assert_eq!(project.filesystem_path, PathBuf::from("/home/u/personal"));
}

#[test]
fn remote_sprite_makes_project_remote() {
    let mut project = Project::new("infra", "/srv/infra");
    project.remote_sprite_name = Some("sprite-7".to_string());
    assert!(project.is_remote());
}

#[test]
fn matches_name_and_aliases() {
    let mut project = Project::new("personal", "/p");
    project.aliases = vec!["me".to_string(), "home".to_string()];

    assert!(project.matches("personal"));
    assert!(project.matches("me"));
    assert!(project.matches("home"));
    assert!(!project.matches("work"));
}

#[test]
fn serde_omits_absent_sprite() {
    let project = Project::new("p", "/p");
    let json = serde_json::to_value(&project).unwrap();
    assert!(json.get("remote_sprite_name").is_none());
}
