// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{NewTask, Store, StoreError};
use chrono::{Duration, Utc};
use tq_core::LineType;

async fn store_with_task() -> (Store, TaskId) {
    let store = Store::open_in_memory().await.unwrap();
    let task = store
        .create_task(
            NewTask {
                title: "t".to_string(),
                ..NewTask::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
    (store, task.id)
}

#[tokio::test]
async fn append_and_read_back_in_order() {
    let (store, id) = store_with_task().await;
    let now = Utc::now();

    store.append_log(id, LineType::Output, "first", now).await.unwrap();
    store.append_log(id, LineType::Tool, "second", now).await.unwrap();

    let logs = store.logs_for_task(id, 10).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].content, "first");
    assert_eq!(logs[1].line_type, LineType::Tool);
}

#[tokio::test]
async fn append_to_missing_task_fails() {
    let store = Store::open_in_memory().await.unwrap();
    let err = store
        .append_log(TaskId::new(999), LineType::Output, "x", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::TaskNotFound(_)));
}

#[tokio::test]
async fn logs_for_task_keeps_most_recent() {
    let (store, id) = store_with_task().await;
    let now = Utc::now();
    for i in 0..5 {
        store
            .append_log(id, LineType::Output, &format!("line {i}"), now)
            .await
            .unwrap();
    }

    let logs = store.logs_for_task(id, 2).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].content, "line 3");
    assert_eq!(logs[1].content, "line 4");
}

#[tokio::test]
async fn purge_keeps_recent_and_fresh_lines() {
    let (store, id) = store_with_task().await;
    let old = Utc::now() - Duration::days(30);
    let fresh = Utc::now();

    for i in 0..4 {
        store
            .append_log(id, LineType::Output, &format!("old {i}"), old)
            .await
            .unwrap();
    }
    store.append_log(id, LineType::Output, "fresh", fresh).await.unwrap();

    // keep_per_task=2: "old 3" + "fresh" are the two most recent; older
    // lines are eligible, but only those past the cutoff get dropped.
    let cutoff = Utc::now() - Duration::days(14);
    let deleted = store.purge_logs_older_than(cutoff, 2).await.unwrap();
    assert_eq!(deleted, 3);

    let logs = store.logs_for_task(id, 10).await.unwrap();
    let contents: Vec<_> = logs.iter().map(|l| l.content.as_str()).collect();
    assert_eq!(contents, vec!["old 3", "fresh"]);
}

#[tokio::test]
async fn purge_spares_fresh_lines_beyond_keep_count() {
    let (store, id) = store_with_task().await;
    let fresh = Utc::now();
    for i in 0..5 {
        store
            .append_log(id, LineType::Output, &format!("line {i}"), fresh)
            .await
            .unwrap();
    }

    let cutoff = Utc::now() - Duration::days(14);
    let deleted = store.purge_logs_older_than(cutoff, 2).await.unwrap();
    assert_eq!(deleted, 0, "nothing older than cutoff");
    assert_eq!(store.logs_for_task(id, 10).await.unwrap().len(), 5);
}

#[tokio::test]
async fn search_matches_title_and_transcript() {
    let (store, id) = store_with_task().await;
    let now = Utc::now();
    store
        .append_log(id, LineType::Output, "compiling widget frobnicator", now)
        .await
        .unwrap();

    // Transcript FTS match
    let hits = store.search("frobnicator", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].task_id, id);
    assert!(hits[0].snippet.contains("frobnicator"));

    // Title substring match
    let hits = store.search("t", 10).await.unwrap();
    assert!(!hits.is_empty());
}

#[tokio::test]
async fn search_handles_punctuation_and_empty_queries() {
    let (store, _id) = store_with_task().await;
    assert!(store.search("", 10).await.unwrap().is_empty());
    // Must not error on FTS grammar characters
    store.search("foo\"bar (baz)", 10).await.unwrap();
}

#[tokio::test]
async fn purged_lines_leave_the_search_index() {
    let (store, id) = store_with_task().await;
    let old = Utc::now() - Duration::days(30);
    store
        .append_log(id, LineType::Output, "ancient xyzzy artifact", old)
        .await
        .unwrap();
    // Newer line so the old one is past keep_per_task
    store
        .append_log(id, LineType::Output, "recent", Utc::now())
        .await
        .unwrap();

    store
        .purge_logs_older_than(Utc::now() - Duration::days(14), 1)
        .await
        .unwrap();

    assert!(store.search("xyzzy", 10).await.unwrap().is_empty());
}
