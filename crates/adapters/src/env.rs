// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Follower fallback poll interval (default: 2000ms).
pub fn follower_poll_ms() -> Duration {
    parse_duration_ms("TQ_FOLLOWER_POLL_MS").unwrap_or(Duration::from_secs(2))
}

/// Poll interval while waiting for a followed file to appear (default: 500ms).
pub fn follow_wait_ms() -> Duration {
    parse_duration_ms("TQ_FOLLOW_WAIT_MS").unwrap_or(Duration::from_millis(500))
}
