//! Scenario: the daemon restarts while a task is processing. A task whose
//! window died comes back as backlog with a recovery note; stale worktree
//! directories are swept.

use crate::prelude::*;
use tq_core::TaskStatus;

#[tokio::test]
async fn windowless_processing_task_recovers_to_backlog() {
    let h = harness().await;
    let task = h.start("doomed").await;
    assert_eq!(task.status, TaskStatus::Processing);

    // The daemon "dies": watchers stop, and so does the agent window
    h.executor.stop_all_tails();
    h.host.drop_window(&task.window_name());

    // "Restart": reconciliation runs
    h.executor.reconcile().await.unwrap();

    let recovered = h.store.get_task(task.id).await.unwrap();
    assert_eq!(recovered.status, TaskStatus::Backlog);
    assert_eq!(recovered.port, 0);
    assert!(recovered.worktree_path.is_empty());

    let logs = h.store.logs_for_task(task.id, 20).await.unwrap();
    assert!(
        logs.iter().any(|l| l.content.contains("daemon restart")),
        "recovery leaves a system log note"
    );

    // A normal queue -> run cycle works again afterwards
    h.api.queue(task.id).await.unwrap();
    h.executor.tick().await.unwrap();
    assert_eq!(h.status(task.id).await, TaskStatus::Processing);
}

#[tokio::test]
async fn surviving_window_keeps_task_processing() {
    let h = harness().await;
    let task = h.start("survivor").await;

    h.executor.stop_all_tails();
    h.executor.reconcile().await.unwrap();

    assert_eq!(h.status(task.id).await, TaskStatus::Processing);
}

#[tokio::test]
async fn stale_worktrees_are_swept() {
    let h = harness().await;
    // Two directories on disk, neither referenced by an active task
    h.runner.respond_matching("ls -1", "orphan-a\norphan-b\n");

    h.executor.sweep_stale_worktrees().await.unwrap();

    let removals: Vec<String> = h
        .runner
        .lines()
        .into_iter()
        .filter(|l| l.contains("worktree remove --force"))
        .collect();
    assert_eq!(removals.len(), 2);
    assert!(removals.iter().any(|l| l.contains("orphan-a")));
    assert!(removals.iter().any(|l| l.contains("orphan-b")));
}

#[tokio::test]
async fn sweep_spares_active_worktrees() {
    let h = harness().await;
    let task = h.start("active").await;
    let worktree = h.store.get_task(task.id).await.unwrap().worktree_path;
    let dirname = std::path::Path::new(&worktree)
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    h.runner.respond_matching("ls -1", &format!("{dirname}\n"));

    h.executor.sweep_stale_worktrees().await.unwrap();

    assert!(
        !h.runner
            .lines()
            .iter()
            .any(|l| l.contains("worktree remove") && l.contains(&dirname)),
        "active worktree must not be swept"
    );
}
