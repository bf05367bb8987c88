// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::Arc;
use tq_adapters::{FakeRunner, FakeSessionHost};
use tq_core::{FakeClock, Project};
use tq_engine::{EngineConfig, HookHandler, Provisioner, TailManager};
use tq_engine::executor::ExecutorDeps;

struct Fixture {
    api: Api<FakeSessionHost, FakeClock>,
    store: Store,
    bus: EventBus,
    _dir: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open_in_memory().await.unwrap();
    let (bus, worker) = EventBus::new(store.clone(), dir.path().join("hooks"));
    tokio::spawn(worker.run());

    let clock = FakeClock::new();
    let host = FakeSessionHost::new();
    let provisioner = Provisioner::with_runner(Arc::new(FakeRunner::new()));
    let handler = HookHandler::new(store.clone(), bus.sender(), clock.clone());
    let tails = TailManager::new(store.clone(), bus.sender(), host.clone(), handler);
    let executor = Arc::new(Executor::new(
        ExecutorDeps {
            store: store.clone(),
            events: bus.sender(),
            sessions: host,
            provisioner,
            tails,
            clock: clock.clone(),
        },
        EngineConfig::default(),
    ));

    store
        .upsert_project(&Project::new("personal", "/home/u/personal"))
        .await
        .unwrap();

    Fixture {
        api: Api::new(store.clone(), bus.clone(), executor, clock),
        store,
        bus,
        _dir: dir,
    }
}

fn create_input(title: &str) -> CreateTask {
    CreateTask {
        title: title.to_string(),
        project: "personal".to_string(),
        task_type: "code".to_string(),
        ..CreateTask::default()
    }
}

#[tokio::test]
async fn create_task_round_trips_and_is_durable() {
    let f = fixture().await;
    let task = f.api.create_task(create_input("add readme")).await.unwrap();

    assert!(task.id.as_i64() > 0);
    assert_eq!(task.status, TaskStatus::Backlog);
    assert_eq!(task.project, "personal");

    let fetched = f.api.get_task(task.id).await.unwrap();
    assert_eq!(fetched.title, "add readme");

    // task.created was emitted synchronously: already in the event log
    let events = f.store.events_for_task(task.id, 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "task.created");
}

#[tokio::test]
async fn create_task_validates_title_and_project() {
    let f = fixture().await;

    let err = f.api.create_task(create_input("  ")).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));

    let mut input = create_input("t");
    input.project = "nope".to_string();
    let err = f.api.create_task(input).await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Store(StoreError::ProjectNotFound(_))
    ));
}

#[tokio::test]
async fn queue_promotes_backlog_only() {
    let f = fixture().await;
    let task = f.api.create_task(create_input("t")).await.unwrap();

    f.api.queue(task.id).await.unwrap();
    assert_eq!(
        f.api.get_task(task.id).await.unwrap().status,
        TaskStatus::Queued
    );

    // Queueing again is an invalid transition
    let err = f.api.queue(task.id).await.unwrap_err();
    assert!(matches!(err, ApiError::Store(StoreError::InvalidState(_))));
}

#[tokio::test]
async fn update_task_patches_and_emits() {
    let f = fixture().await;
    let mut rx = f.api.subscribe();
    let task = f.api.create_task(create_input("t")).await.unwrap();

    let updated = f
        .api
        .update_task(
            task.id,
            TaskPatch {
                body: Some("more detail".to_string()),
                ..TaskPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.body, "more detail");

    // created (sync) then updated (async) both reach subscribers
    let mut names = Vec::new();
    for _ in 0..2 {
        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        names.push(event.name());
    }
    assert_eq!(names, vec!["task.created", "task.updated"]);
}

#[tokio::test]
async fn pin_and_unpin_round_trip() {
    let f = fixture().await;
    let task = f.api.create_task(create_input("t")).await.unwrap();

    f.api.pin(task.id).await.unwrap();
    assert!(f.api.get_task(task.id).await.unwrap().pinned);
    f.api.unpin(task.id).await.unwrap();
    assert!(!f.api.get_task(task.id).await.unwrap().pinned);
}

#[tokio::test]
async fn thread_binding_round_trips() {
    let f = fixture().await;
    let task = f.api.create_task(create_input("t")).await.unwrap();

    f.api.bind_thread("<msg@example>", task.id).await.unwrap();
    assert_eq!(
        f.api.resolve_thread("<msg@example>").await.unwrap(),
        Some(task.id)
    );
    assert_eq!(f.api.resolve_thread("<other>").await.unwrap(), None);
}

#[tokio::test]
async fn events_after_supports_catch_up() {
    let f = fixture().await;
    let task = f.api.create_task(create_input("t")).await.unwrap();
    f.api.queue(task.id).await.unwrap();

    // Wait for the async queue events to drain to the log
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if f.store.event_count().await.unwrap() >= 3 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let all = f.api.events_after(0, 100).await.unwrap();
    let after_first = f.api.events_after(all[0].id, 100).await.unwrap();
    assert_eq!(after_first.len(), all.len() - 1);
}

#[tokio::test]
async fn delete_task_requires_terminal() {
    let f = fixture().await;
    let task = f.api.create_task(create_input("t")).await.unwrap();
    assert!(f.api.delete_task(task.id).await.is_err());

    f.store
        .update_status_if(
            task.id,
            &[TaskStatus::Backlog],
            TaskStatus::Done,
            chrono::Utc::now(),
        )
        .await
        .unwrap();
    f.api.delete_task(task.id).await.unwrap();
    assert!(f.api.get_task(task.id).await.is_err());
}

#[tokio::test]
async fn search_spans_tasks_and_transcripts() {
    let f = fixture().await;
    let task = f.api.create_task(create_input("fix the parser")).await.unwrap();
    f.store
        .append_log(
            task.id,
            tq_core::LineType::Output,
            "unexpected token zork",
            chrono::Utc::now(),
        )
        .await
        .unwrap();

    assert!(!f.api.search("parser", 10).await.unwrap().is_empty());
    assert!(!f.api.search("zork", 10).await.unwrap().is_empty());
    assert!(f.api.search("nothing-here", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn dropped_counter_is_visible_through_bus() {
    let f = fixture().await;
    assert_eq!(f.bus.dropped_count(), 0);
}
