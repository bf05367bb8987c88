// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

#[tokio::test]
async fn succeeds_first_try_without_sleeping() {
    let result: Result<i32, String> =
        with_backoff(3, Duration::from_millis(1), |_| async { Ok(42) }).await;
    assert_eq!(result.unwrap(), 42);
}

#[tokio::test]
async fn retries_until_success() {
    let calls = AtomicU32::new(0);
    let result: Result<u32, String> = with_backoff(5, Duration::from_millis(1), |attempt| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if attempt < 3 {
                Err("not yet".to_string())
            } else {
                Ok(attempt)
            }
        }
    })
    .await;
    assert_eq!(result.unwrap(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn gives_up_after_cap() {
    let calls = AtomicU32::new(0);
    let result: Result<(), String> = with_backoff(3, Duration::from_millis(1), |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err("always".to_string()) }
    })
    .await;
    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn zero_attempts_still_runs_once() {
    let result: Result<i32, String> =
        with_backoff(0, Duration::from_millis(1), |_| async { Ok(1) }).await;
    assert_eq!(result.unwrap(), 1);
}
