//! Scenario: the agent hits a permission prompt; the task blocks, the
//! user sends input, and only a later hook transitions the status.

use crate::prelude::*;
use tq_core::TaskStatus;

#[tokio::test]
async fn blocked_then_resumed_by_input() {
    let h = harness().await;
    let task = h.start("needs permission").await;

    h.inject_hook(
        task.id,
        r#""event":"Notification","matcher":"permission_prompt","text":"allow?""#,
    )
    .await;
    h.wait_for_event(task.id, "task.blocked").await;

    let blocked = h.store.get_task(task.id).await.unwrap();
    assert_eq!(blocked.status, TaskStatus::Blocked);
    assert_eq!(blocked.block_reason.as_deref(), Some("allow?"));

    // User answers through the session host
    h.api.send_input(task.id, "yes").await.unwrap();
    assert_eq!(h.host.inputs_for(&task.window_name()), vec!["yes"]);

    // Status does not change until a hook says so
    assert_eq!(h.status(task.id).await, TaskStatus::Blocked);

    // Duplicate prompt notification emits no second task.blocked
    h.inject_hook(
        task.id,
        r#""event":"Notification","matcher":"permission_prompt","text":"allow?""#,
    )
    .await;
    assert_eq!(h.event_count(task.id, "task.blocked").await, 1);

    // The agent eventually finishes the turn
    h.inject_hook(task.id, r#""event":"Stop","reason":"end_turn""#).await;
    h.wait_for_event(task.id, "task.completed").await;
    assert_eq!(h.status(task.id).await, TaskStatus::Done);
}

#[tokio::test]
async fn idle_prompt_also_blocks() {
    let h = harness().await;
    let task = h.start("goes idle").await;

    h.inject_hook(
        task.id,
        r#""event":"Notification","matcher":"idle_prompt","text":"waiting for you""#,
    )
    .await;

    assert_eq!(h.status(task.id).await, TaskStatus::Blocked);
    // A blocked task keeps its allocations: the agent is alive, waiting
    let blocked = h.store.get_task(task.id).await.unwrap();
    assert_ne!(blocked.port, 0);
    assert!(h.host.has_window(&blocked.window_name()));
}

#[tokio::test]
async fn retry_of_blocked_task_requeues_with_session() {
    let h = harness().await;
    let task = h.start("stuck").await;
    h.store
        .record_agent_session(task.id, "sess-99")
        .await
        .unwrap();
    h.inject_hook(
        task.id,
        r#""event":"Notification","matcher":"permission_prompt","text":"?" "#,
    )
    .await;

    h.api.retry(task.id, Some("skip that step")).await.unwrap();

    let queued = h.store.get_task(task.id).await.unwrap();
    assert_eq!(queued.status, TaskStatus::Queued);
    assert_eq!(queued.agent_session_id, "sess-99");
    assert_eq!(queued.port, 0, "blocked task's allocations were released");
    assert!(queued.block_reason.is_none());
}
