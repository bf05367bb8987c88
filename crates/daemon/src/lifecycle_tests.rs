// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::Path;
use std::time::Duration;
use tq_core::TaskStatus;
use tq_storage::NewTask;

fn test_config(dir: &Path) -> Config {
    Config {
        state_dir: dir.to_path_buf(),
        data_dir: dir.join("task"),
        projects_dir: dir.join("projects"),
        db_path: dir.join("task/tasks.db"),
        hooks_dir: dir.join("hooks"),
        lock_path: dir.join("daemon.pid"),
        log_path: dir.join("daemon.log"),
        port_range_min: 3100,
        port_range_max: 3199,
        exec_interval: Duration::from_millis(50),
        scheduler_interval: Duration::from_millis(100),
        log_retention_days: 14,
        log_keep_per_task: 500,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn startup_creates_state_and_locks() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = startup(test_config(dir.path())).await.unwrap();

    assert!(dir.path().join("task/tasks.db").exists());
    assert!(dir.path().join("hooks").exists());
    let pid = std::fs::read_to_string(dir.path().join("daemon.pid")).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());

    daemon.shutdown().await;
    assert!(!dir.path().join("daemon.pid").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_daemon_fails_to_lock() {
    let dir = tempfile::tempdir().unwrap();
    let first = startup(test_config(dir.path())).await.unwrap();

    let second = startup(test_config(dir.path())).await;
    assert!(matches!(second, Err(LifecycleError::LockFailed(_))));

    first.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_recovers_windowless_processing_task() {
    let dir = tempfile::tempdir().unwrap();

    // Seed a "crashed" state: a processing task whose window is gone.
    {
        let store = Store::open(&test_config(dir.path()).db_path).await.unwrap();
        store
            .upsert_project(&tq_core::Project::new("p", dir.path().join("p")))
            .await
            .unwrap();
        let now = chrono::Utc::now();
        let task = store
            .create_task(
                NewTask {
                    title: "stranded".to_string(),
                    project: "p".to_string(),
                    ..NewTask::default()
                },
                now,
            )
            .await
            .unwrap();
        store
            .update_status_if(task.id, &[TaskStatus::Backlog], TaskStatus::Queued, now)
            .await
            .unwrap();
        store.claim_for_processing(task.id, now).await.unwrap();
        store.allocate_port(task.id, 3100, 3199).await.unwrap();
        store
            .persist_allocations(task.id, "", "task-1/stranded", "task-daemon", "task-1", now)
            .await
            .unwrap();
        store.close().await;
    }

    let daemon = startup(test_config(dir.path())).await.unwrap();

    let tasks = daemon
        .store
        .list_tasks(&tq_storage::TaskFilter {
            status: Some(TaskStatus::Backlog),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1, "processing task recovered to backlog");
    assert_eq!(tasks[0].port, 0, "port released during recovery");

    let logs = daemon.store.logs_for_task(tasks[0].id, 10).await.unwrap();
    assert!(logs.iter().any(|l| l.content.contains("daemon restart")));

    daemon.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_completes_within_drain_budget() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = startup(test_config(dir.path())).await.unwrap();

    let start = std::time::Instant::now();
    daemon.shutdown().await;
    assert!(start.elapsed() < SHUTDOWN_DRAIN + Duration::from_secs(2));
}
