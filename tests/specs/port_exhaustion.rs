//! Scenario: a two-port range. The third task fails with `no_ports`;
//! finishing an earlier task frees its port and a retry succeeds.

use crate::prelude::*;
use tq_core::TaskStatus;

#[tokio::test]
async fn third_task_fails_then_retries_into_freed_port() {
    let h = harness_with_ports(3100, 3101).await;

    let one = h.create("one").await;
    let two = h.create("two").await;
    let three = h.create("three").await;
    for id in [one.id, two.id, three.id] {
        h.api.queue(id).await.unwrap();
    }

    h.executor.tick().await.unwrap();
    h.executor.tick().await.unwrap();
    h.executor.tick().await.unwrap();

    assert_eq!(h.status(one.id).await, TaskStatus::Processing);
    assert_eq!(h.status(two.id).await, TaskStatus::Processing);
    assert_eq!(h.store.get_task(one.id).await.unwrap().port, 3100);
    assert_eq!(h.store.get_task(two.id).await.unwrap().port, 3101);

    let failed = h.store.get_task(three.id).await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.error.as_deref().unwrap().starts_with("no_ports"));
    h.wait_for_event(three.id, "task.failed").await;

    // Finish task one; its port is released within a tick
    h.inject_hook(one.id, r#""event":"Stop","reason":"end_turn""#).await;
    h.executor.tick().await.unwrap();
    assert_eq!(h.store.get_task(one.id).await.unwrap().port, 0);

    // Retry the failed task: it now gets the freed port
    h.api.retry(three.id, None).await.unwrap();
    h.executor.tick().await.unwrap();

    let retried = h.store.get_task(three.id).await.unwrap();
    assert_eq!(retried.status, TaskStatus::Processing);
    assert_eq!(retried.port, 3100);
}

#[tokio::test]
async fn active_ports_are_never_shared() {
    let h = harness_with_ports(3100, 3102).await;
    for title in ["a", "b", "c"] {
        let task = h.create(title).await;
        h.api.queue(task.id).await.unwrap();
        h.executor.tick().await.unwrap();
    }

    let tasks = h
        .store
        .list_tasks(&tq_storage::TaskFilter::default())
        .await
        .unwrap();
    let mut ports: Vec<u16> = tasks.iter().map(|t| t.port).collect();
    ports.sort_unstable();
    ports.dedup();
    assert_eq!(ports.len(), 3, "each active task holds a distinct port");
}
