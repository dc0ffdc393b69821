// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worked-time arithmetic for timecards.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::persistence::TimeEntryRecord;

/// Worked time within a reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkedTime {
    /// Whole minutes worked inside the window.
    pub total_minutes: i64,
    /// Whether any entry is still open.
    pub open_entry: bool,
    /// `total_minutes * rate / 60`, rounded down.
    pub pay_cents: i64,
}

/// Per-employee timecard for a reporting window.
#[derive(Debug, Clone, Serialize)]
pub struct TimecardSummary {
    /// Employee.
    pub employee_id: String,
    /// Employee name.
    pub name: String,
    /// Whole minutes worked inside the window.
    pub total_minutes: i64,
    /// Whether the employee is currently clocked in.
    pub open_entry: bool,
    /// Pay for the window.
    pub pay_cents: i64,
    /// Entries overlapping the window.
    pub entries: Vec<TimeEntryRecord>,
}

/// Sum the time covered by `entries` inside `[from, to)`.
///
/// Open entries count until `min(now, to)`. Seconds are summed across
/// entries and the total is floored to whole minutes.
pub fn summarize(
    entries: &[TimeEntryRecord],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    now: DateTime<Utc>,
    hourly_rate_cents: i64,
) -> WorkedTime {
    let mut seconds = 0i64;
    let mut open_entry = false;

    for entry in entries {
        let end = match entry.clock_out {
            Some(out) => out.min(to),
            None => {
                open_entry = true;
                now.min(to)
            }
        };
        let start = entry.clock_in.max(from);
        if end > start {
            seconds = seconds.saturating_add((end - start).num_seconds());
        }
    }

    let total_minutes = seconds / 60;
    WorkedTime {
        total_minutes,
        open_entry,
        pay_cents: pay_for_minutes(total_minutes, hourly_rate_cents),
    }
}

/// Pay for whole minutes at an hourly rate, rounded down and saturating at
/// `i64::MAX`.
fn pay_for_minutes(minutes: i64, hourly_rate_cents: i64) -> i64 {
    let cents = i128::from(minutes) * i128::from(hourly_rate_cents) / 60;
    i64::try_from(cents).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 3, 2, hour, minute, second).unwrap()
    }

    fn entry(clock_in: DateTime<Utc>, clock_out: Option<DateTime<Utc>>) -> TimeEntryRecord {
        TimeEntryRecord {
            entry_id: "e".to_string(),
            employee_id: "emp".to_string(),
            clock_in,
            clock_out,
            note: None,
            created_at: clock_in,
        }
    }

    #[test]
    fn test_closed_entries_inside_window() {
        let entries = vec![
            entry(t(9, 0, 0), Some(t(12, 0, 0))),
            entry(t(13, 0, 0), Some(t(14, 30, 0))),
        ];

        let worked = summarize(&entries, t(0, 0, 0), t(23, 0, 0), t(23, 0, 0), 1200);
        assert_eq!(worked.total_minutes, 270);
        assert!(!worked.open_entry);
        assert_eq!(worked.pay_cents, 5400);
    }

    #[test]
    fn test_entries_clipped_to_window() {
        let entries = vec![entry(t(8, 0, 0), Some(t(18, 0, 0)))];

        let worked = summarize(&entries, t(10, 0, 0), t(12, 0, 0), t(20, 0, 0), 600);
        assert_eq!(worked.total_minutes, 120);
        assert_eq!(worked.pay_cents, 1200);
    }

    #[test]
    fn test_open_entry_counts_until_now() {
        let entries = vec![entry(t(9, 0, 0), None)];

        let worked = summarize(&entries, t(0, 0, 0), t(23, 0, 0), t(10, 15, 0), 1000);
        assert!(worked.open_entry);
        assert_eq!(worked.total_minutes, 75);
        assert_eq!(worked.pay_cents, 1250);

        // Window closes before now
        let worked = summarize(&entries, t(0, 0, 0), t(9, 30, 0), t(10, 15, 0), 1000);
        assert_eq!(worked.total_minutes, 30);
    }

    #[test]
    fn test_minutes_floored_and_pay_rounded_down() {
        let entries = vec![
            entry(t(9, 0, 0), Some(t(9, 0, 50))),
            entry(t(10, 0, 0), Some(t(10, 0, 50))),
        ];

        let worked = summarize(&entries, t(0, 0, 0), t(23, 0, 0), t(23, 0, 0), 1999);
        assert_eq!(worked.total_minutes, 1);
        assert_eq!(worked.pay_cents, 33);
    }

    #[test]
    fn test_entries_outside_window_ignored() {
        let entries = vec![entry(t(6, 0, 0), Some(t(7, 0, 0)))];
        let worked = summarize(&entries, t(8, 0, 0), t(9, 0, 0), t(23, 0, 0), 1000);
        assert_eq!(worked.total_minutes, 0);
        assert_eq!(worked.pay_cents, 0);
    }

    #[test]
    fn test_pay_with_huge_rates() {
        let entries = vec![entry(t(9, 0, 0), Some(t(17, 0, 0)))];

        // minutes * rate overflows i64 but the pay itself fits
        let rate = i64::MAX / 100;
        let worked = summarize(&entries, t(0, 0, 0), t(23, 0, 0), t(23, 0, 0), rate);
        assert_eq!(worked.total_minutes, 480);
        assert_eq!(worked.pay_cents, rate * 8);

        let worked = summarize(&entries, t(0, 0, 0), t(23, 0, 0), t(23, 0, 0), i64::MAX);
        assert_eq!(worked.pay_cents, i64::MAX);
    }
}
