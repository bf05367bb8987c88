// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    hourly = { Recurrence::Hourly, 3_600 },
    daily = { Recurrence::Daily, 86_400 },
    weekly = { Recurrence::Weekly, 604_800 },
    monthly = { Recurrence::Monthly, 2_592_000 },
)]
fn cadence_durations(recurrence: Recurrence, secs: i64) {
    assert_eq!(recurrence.cadence().num_seconds(), secs);
}

#[parameterized(
    hourly = { "hourly" },
    daily = { "daily" },
    weekly = { "weekly" },
    monthly = { "monthly" },
)]
fn recurrence_round_trips_through_str(s: &str) {
    assert_eq!(s.parse::<Recurrence>().unwrap().as_str(), s);
}

#[test]
fn unknown_recurrence_is_rejected() {
    assert!("yearly".parse::<Recurrence>().is_err());
    assert!("".parse::<Recurrence>().is_err());
}
