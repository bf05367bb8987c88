// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::Utc;
use tq_core::Project;
use tq_storage::NewTask;

#[test]
fn interpolate_replaces_known_and_blanks_unknown() {
    let mut vars = HashMap::new();
    vars.insert("title".to_string(), "add readme".to_string());

    let out = interpolate("# {{title}} {{mystery}}!", &vars);
    assert_eq!(out, "# add readme !");
}

#[test]
fn interpolate_leaves_single_braces_alone() {
    let vars = HashMap::new();
    assert_eq!(interpolate("json {like} this", &vars), "json {like} this");
}

#[tokio::test]
async fn render_prompt_fills_all_context() {
    let store = Store::open_in_memory().await.unwrap();
    let now = Utc::now();

    let mut project = Project::new("personal", "/p");
    project.prompt_instructions = "Prefer small commits.".to_string();
    store.upsert_project(&project).await.unwrap();

    let task = store
        .create_task(
            NewTask {
                title: "add readme".to_string(),
                body: "explain setup".to_string(),
                project: "personal".to_string(),
                ..NewTask::default()
            },
            now,
        )
        .await
        .unwrap();

    store
        .add_attachment(task.id, "notes.txt", "remember the badge", now)
        .await
        .unwrap();
    store
        .add_project_memory("personal", "uses pnpm", now)
        .await
        .unwrap();
    store
        .add_compaction_summary(task.id, "previously drafted outline", now)
        .await
        .unwrap();

    let prompt = render_prompt(&store, &task, &project).await.unwrap();
    assert!(prompt.contains("personal"));
    assert!(prompt.contains("Prefer small commits."));
    assert!(prompt.contains("add readme"));
    assert!(prompt.contains("explain setup"));
    assert!(prompt.contains("## notes.txt"));
    assert!(prompt.contains("- uses pnpm"));
    assert!(prompt.contains("previously drafted outline"));
    assert!(!prompt.contains("{{"), "no unresolved placeholders: {prompt}");
}

#[tokio::test]
async fn unknown_task_type_uses_bare_template() {
    let store = Store::open_in_memory().await.unwrap();
    let now = Utc::now();
    let project = Project::new("p", "/p");
    store.upsert_project(&project).await.unwrap();

    let mut task = store
        .create_task(
            NewTask {
                title: "t".to_string(),
                project: "p".to_string(),
                ..NewTask::default()
            },
            now,
        )
        .await
        .unwrap();
    task.task_type = "no-such-type".to_string();

    let prompt = render_prompt(&store, &task, &project).await.unwrap();
    assert!(prompt.contains("# t"));
}
