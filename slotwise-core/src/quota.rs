//! Monthly usage quota: record shape and pure reset/remaining logic.
//!
//! The store-backed guard that enforces it lives in `slotwise-sync::quota`.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constants::FREE_TIER_MONTHLY_CAP;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Scheduling,
    Prioritization,
}

impl OperationType {
    pub const ALL: [OperationType; 2] = [OperationType::Scheduling, OperationType::Prioritization];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Paid,
}

/// Per-user counters for the current calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaRecord {
    #[serde(default)]
    pub operations_used: BTreeMap<OperationType, u32>,
    pub last_reset_timestamp: DateTime<Utc>,
}

impl QuotaRecord {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            operations_used: BTreeMap::new(),
            last_reset_timestamp: now,
        }
    }

    /// True when `now` falls in a different month/year than the last reset.
    ///
    /// Months are UTC calendar months for every user, independent of the
    /// profile timezone: a user at UTC-6 gets a fresh allowance at 18:00 local
    /// on the last day of the month.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let last = self.last_reset_timestamp;
        last.year() != now.year() || last.month() != now.month()
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        for op in OperationType::ALL {
            self.operations_used.insert(op, 0);
        }
        self.last_reset_timestamp = now;
    }

    pub fn used(&self, op: OperationType) -> u32 {
        self.operations_used.get(&op).copied().unwrap_or(0)
    }

    pub fn remaining(&self, op: OperationType) -> u32 {
        FREE_TIER_MONTHLY_CAP.saturating_sub(self.used(op))
    }

    pub fn add(&mut self, op: OperationType, count: u32) {
        let used = self.operations_used.entry(op).or_insert(0);
        *used = used.saturating_add(count);
    }
}

/// How many operations a caller may run right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Unlimited,
    Limited(u32),
}

impl Allowance {
    pub fn is_exhausted(self) -> bool {
        matches!(self, Allowance::Limited(0))
    }

    /// Cap to hand to the allocator, if any.
    pub fn cap(self) -> Option<usize> {
        match self {
            Allowance::Unlimited => None,
            Allowance::Limited(n) => Some(n as usize),
        }
    }
}

/// Message attached to a summary when the quota truncated the request.
pub fn limit_message(scheduled: usize, requested: usize) -> String {
    format!(
        "Scheduled {scheduled} of {requested} tasks: the free plan allows {FREE_TIER_MONTHLY_CAP} automatic scheduling operations per month."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn remaining_never_negative() {
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let mut r = QuotaRecord::new(now);
        r.add(OperationType::Scheduling, 30);
        assert_eq!(r.remaining(OperationType::Scheduling), 0);
        assert_eq!(r.remaining(OperationType::Prioritization), 25);
    }

    #[test]
    fn stale_only_across_month_boundary() {
        let r = QuotaRecord::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert!(!r.is_stale(Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap()));
        assert!(r.is_stale(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()));
        // Same month, different year.
        assert!(r.is_stale(Utc.with_ymd_and_hms(2027, 3, 5, 0, 0, 0).unwrap()));
    }

    #[test]
    fn month_boundary_is_utc_regardless_of_local_time() {
        use chrono_tz::America::Chicago;

        let r = QuotaRecord::new(Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap());
        // Still March 31 in Chicago, already April in UTC.
        let evening = Chicago.with_ymd_and_hms(2026, 3, 31, 19, 30, 0).unwrap();
        assert_eq!(evening.month(), 3);
        assert!(r.is_stale(evening.with_timezone(&Utc)));

        let afternoon = Chicago.with_ymd_and_hms(2026, 3, 31, 17, 30, 0).unwrap();
        assert!(!r.is_stale(afternoon.with_timezone(&Utc)));
    }

    #[test]
    fn reset_zeroes_every_counter() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut r = QuotaRecord::new(start);
        r.add(OperationType::Scheduling, 7);
        r.add(OperationType::Prioritization, 3);
        let later = Utc.with_ymd_and_hms(2026, 4, 2, 0, 0, 0).unwrap();
        r.reset(later);
        assert_eq!(r.used(OperationType::Scheduling), 0);
        assert_eq!(r.used(OperationType::Prioritization), 0);
        assert_eq!(r.last_reset_timestamp, later);
    }

    #[test]
    fn limit_message_states_counts() {
        assert!(limit_message(2, 5).contains("2 of 5"));
    }
}
