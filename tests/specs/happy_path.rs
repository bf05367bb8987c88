//! Scenario: a task flows backlog -> queued -> processing -> done, with
//! every allocation made and released along the way.

use crate::prelude::*;
use tq_core::TaskStatus;

#[tokio::test]
async fn create_queue_run_complete() {
    let h = harness().await;

    let task = h.create("add readme").await;
    assert_eq!(task.status, TaskStatus::Backlog);
    h.wait_for_event(task.id, "task.created").await;

    h.api.queue(task.id).await.unwrap();
    h.wait_for_event(task.id, "task.queued").await;

    h.executor.tick().await.unwrap();
    h.wait_for_event(task.id, "task.processing").await;

    let running = h.store.get_task(task.id).await.unwrap();
    assert_eq!(running.status, TaskStatus::Processing);
    assert!((3100..=3199).contains(&running.port));
    assert!(running
        .branch_name
        .starts_with(&format!("task-{}/", task.id)));
    assert!(running.worktree_path.contains(".task-worktrees"));
    assert!(h.host.has_window(&running.window_name()));

    // Agent finishes its turn
    h.inject_hook(task.id, r#""event":"Stop","reason":"end_turn""#).await;
    h.wait_for_event(task.id, "task.completed").await;
    assert_eq!(h.status(task.id).await, TaskStatus::Done);

    // Next tick releases port, window, and worktree
    h.executor.tick().await.unwrap();
    let released = h.store.get_task(task.id).await.unwrap();
    assert_eq!(released.port, 0);
    assert!(released.worktree_path.is_empty());
    assert!(!h.host.has_window(&released.window_name()));
    assert!(h
        .runner
        .lines()
        .iter()
        .any(|l| l.contains("worktree remove --force")));
}

#[tokio::test]
async fn started_at_survives_a_full_cycle() {
    let h = harness().await;
    let task = h.start("t").await;
    let first_start = task.started_at.unwrap();

    h.inject_hook(task.id, r#""event":"Stop","reason":"end_turn""#).await;
    h.executor.tick().await.unwrap();
    h.api.retry(task.id, Some("round two")).await.unwrap();
    h.executor.tick().await.unwrap();

    let again = h.store.get_task(task.id).await.unwrap();
    assert_eq!(again.status, TaskStatus::Processing);
    assert_eq!(again.started_at.unwrap(), first_start);
}

#[tokio::test]
async fn duplicate_stop_hook_is_idempotent() {
    let h = harness().await;
    let task = h.start("t").await;

    h.inject_hook(task.id, r#""event":"Stop","reason":"end_turn""#).await;
    h.inject_hook(task.id, r#""event":"Stop","reason":"end_turn""#).await;
    h.wait_for_event(task.id, "task.completed").await;

    assert_eq!(h.event_count(task.id, "task.completed").await, 1);
    assert_eq!(h.status(task.id).await, TaskStatus::Done);
}
