// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local retry with exponential backoff for transient infrastructure
//! errors. Retries never cross component boundaries; the caller picks a
//! per-operation attempt cap.

use std::future::Future;
use std::time::Duration;

/// Run `op` up to `attempts` times, doubling the delay between tries.
/// The attempt number (starting at 1) is passed to `op` for logging.
pub async fn with_backoff<T, E, F, Fut>(
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut delay = base_delay;
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                tracing::debug!(attempt, error = %e, "transient failure, backing off");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
