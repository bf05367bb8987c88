// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling

use chrono::{DateTime, Utc};
use std::time::Instant;

/// A clock that provides the current time
pub trait Clock: Clone + Send + Sync + 'static {
    /// Monotonic instant for interval arithmetic.
    fn now(&self) -> Instant;
    /// Wall-clock time for persisted timestamps and schedule checks.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fake clock for testing with controllable time
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone)]
pub struct FakeClock {
    current: std::sync::Arc<parking_lot::Mutex<Instant>>,
    wall: std::sync::Arc<parking_lot::Mutex<DateTime<Utc>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeClock {
    pub fn new() -> Self {
        Self {
            current: std::sync::Arc::new(parking_lot::Mutex::new(Instant::now())),
            wall: std::sync::Arc::new(parking_lot::Mutex::new(Utc::now())),
        }
    }

    /// Advance both the monotonic and wall clocks by the given duration
    pub fn advance(&self, duration: std::time::Duration) {
        *self.current.lock() += duration;
        *self.wall.lock() += chrono::Duration::from_std(duration).unwrap_or_default();
    }

    /// Set the wall clock to a specific time
    pub fn set_utc(&self, when: DateTime<Utc>) {
        *self.wall.lock() = when;
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.current.lock()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        *self.wall.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
