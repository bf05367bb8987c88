// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recurrence cadences for scheduled re-enqueueing.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How often a completed task is cloned back into the backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recurrence::Hourly => "hourly",
            Recurrence::Daily => "daily",
            Recurrence::Weekly => "weekly",
            Recurrence::Monthly => "monthly",
        }
    }

    /// Interval between runs. Monthly is a fixed 30 days.
    pub fn cadence(&self) -> Duration {
        match self {
            Recurrence::Hourly => Duration::hours(1),
            Recurrence::Daily => Duration::hours(24),
            Recurrence::Weekly => Duration::days(7),
            Recurrence::Monthly => Duration::days(30),
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Recurrence {
    type Err = ParseRecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(Recurrence::Hourly),
            "daily" => Ok(Recurrence::Daily),
            "weekly" => Ok(Recurrence::Weekly),
            "monthly" => Ok(Recurrence::Monthly),
            other => Err(ParseRecurrenceError(other.to_string())),
        }
    }
}

/// Error returned when parsing an invalid [`Recurrence`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid recurrence: {0:?}")]
pub struct ParseRecurrenceError(pub String);

#[cfg(test)]
#[path = "recurrence_tests.rs"]
mod tests;
