//! Scenario: a daily recurring task completed 25 hours ago is cloned into
//! a fresh backlog task; the original's last_run_at advances.

use crate::prelude::*;
use chrono::Duration;
use tq_core::{Clock, Recurrence, TaskStatus};
use tq_daemon::CreateTask;
use tq_storage::TaskFilter;

#[tokio::test]
async fn overdue_daily_task_spawns_a_clone() {
    let h = harness().await;
    let now = h.clock.now_utc();

    let task = h
        .api
        .create_task(CreateTask {
            title: "daily digest".to_string(),
            body: "collect updates".to_string(),
            project: "personal".to_string(),
            task_type: "writing".to_string(),
            recurrence: Some(Recurrence::Daily),
            ..CreateTask::default()
        })
        .await
        .unwrap();

    h.store
        .update_status_if(task.id, &[TaskStatus::Backlog], TaskStatus::Done, now)
        .await
        .unwrap();
    h.store
        .set_last_run_at(task.id, now - Duration::hours(25))
        .await
        .unwrap();

    h.scheduler.tick().await.unwrap();

    let all = h
        .store
        .list_tasks(&TaskFilter {
            include_terminal: true,
            ..TaskFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let clone = all.iter().find(|t| t.id != task.id).unwrap();
    assert_eq!(clone.status, TaskStatus::Backlog);
    assert_eq!(clone.title, "daily digest");
    assert_eq!(clone.body, "collect updates");
    assert_eq!(clone.project, "personal");
    assert_eq!(clone.task_type, "writing");
    assert_eq!(clone.recurrence, Some(Recurrence::Daily));
    assert_eq!(clone.port, 0);
    assert!(clone.worktree_path.is_empty());
    assert!(clone.branch_name.is_empty());

    let original = h.store.get_task(task.id).await.unwrap();
    assert_eq!(original.last_run_at, Some(now));

    // One tick later nothing new appears
    h.scheduler.tick().await.unwrap();
    let count = h
        .store
        .list_tasks(&TaskFilter {
            include_terminal: true,
            ..TaskFilter::default()
        })
        .await
        .unwrap()
        .len();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn scheduled_task_promotes_at_its_time() {
    let h = harness().await;
    let now = h.clock.now_utc();

    let task = h
        .api
        .create_task(CreateTask {
            title: "tonight".to_string(),
            project: "personal".to_string(),
            scheduled_at: Some(now + Duration::hours(1)),
            ..CreateTask::default()
        })
        .await
        .unwrap();

    h.scheduler.tick().await.unwrap();
    assert_eq!(h.status(task.id).await, TaskStatus::Backlog);

    h.clock.advance(std::time::Duration::from_secs(2 * 60 * 60));
    h.scheduler.tick().await.unwrap();
    assert_eq!(h.status(task.id).await, TaskStatus::Queued);
    h.wait_for_event(task.id, "task.queued").await;
}
