// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::{NewTask, Store, StoreError};
use chrono::Utc;
use tq_core::TaskId;

#[tokio::test]
async fn bind_and_resolve() {
    let store = Store::open_in_memory().await.unwrap();
    let now = Utc::now();
    let task = store
        .create_task(
            NewTask {
                title: "t".to_string(),
                ..NewTask::default()
            },
            now,
        )
        .await
        .unwrap();

    store
        .bind_thread("<msg-123@example.com>", task.id, now)
        .await
        .unwrap();

    assert_eq!(
        store.resolve_thread("<msg-123@example.com>").await.unwrap(),
        Some(task.id)
    );
    assert_eq!(store.resolve_thread("<unknown>").await.unwrap(), None);
}

#[tokio::test]
async fn rebinding_moves_the_key() {
    let store = Store::open_in_memory().await.unwrap();
    let now = Utc::now();
    let a = store
        .create_task(
            NewTask {
                title: "a".to_string(),
                ..NewTask::default()
            },
            now,
        )
        .await
        .unwrap();
    let b = store
        .create_task(
            NewTask {
                title: "b".to_string(),
                ..NewTask::default()
            },
            now,
        )
        .await
        .unwrap();

    store.bind_thread("key", a.id, now).await.unwrap();
    store.bind_thread("key", b.id, now).await.unwrap();
    assert_eq!(store.resolve_thread("key").await.unwrap(), Some(b.id));
}

#[tokio::test]
async fn binding_to_missing_task_fails() {
    let store = Store::open_in_memory().await.unwrap();
    let err = store
        .bind_thread("key", TaskId::new(404), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::TaskNotFound(_)));
}
