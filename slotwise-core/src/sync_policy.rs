//! SyncPolicy: decides whether a task must be pushed to the external
//! calendar and builds the event payload.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::{Task, TaskKind};
use crate::time::to_rfc3339_local;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub task_id: String,
    pub code: String,
    pub error: String,
}

/// Outcome of one sync pass, by task id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub skipped: usize,
    pub failed: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn pushed(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len()
    }
}

/// Last values pushed to the external calendar for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_done: bool,
}

impl SyncSnapshot {
    /// `None` when the task has no complete slot.
    pub fn of(task: &Task) -> Option<Self> {
        Some(Self {
            title: task.title.clone(),
            start_date: task.start_date?,
            end_date: task.end_date?,
            is_done: task.is_done,
        })
    }

    /// Field-wise drift check. Dates compare at millisecond precision.
    pub fn differs_from(&self, task: &Task) -> bool {
        let millis = |d: Option<DateTime<Utc>>| d.map(|d| d.timestamp_millis());
        self.title != task.title
            || Some(self.start_date.timestamp_millis()) != millis(task.start_date)
            || Some(self.end_date.timestamp_millis()) != millis(task.end_date)
            || self.is_done != task.is_done
    }
}

/// Body sent to the calendar provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub title: String,
    pub description: String,
    /// ISO-8601 in the resolved local timezone.
    pub start_time: String,
    pub end_time: String,
    pub time_zone: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncPolicy {
    tz: Tz,
}

impl SyncPolicy {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Only future event slots are pushed. Completed tasks are pushed only
    /// when they already exist remotely.
    pub fn should_sync(&self, task: &Task, now: DateTime<Utc>) -> bool {
        if task.kind != TaskKind::Event {
            return false;
        }
        let Some(end) = task.end_date else { return false };
        if task.start_date.is_none() || end <= now {
            return false;
        }
        !task.is_done || task.external_event_id.is_some()
    }

    pub fn needs_sync(&self, task: &Task, previous: Option<&SyncSnapshot>, now: DateTime<Utc>) -> bool {
        if !self.should_sync(task, now) {
            return false;
        }
        match previous {
            Some(snapshot) if task.external_event_id.is_some() => snapshot.differs_from(task),
            // Never pushed, pushed without a snapshot, or a snapshot left over
            // from a push whose link was never stored.
            _ => true,
        }
    }

    pub fn build_payload(&self, task: &Task) -> Result<EventPayload> {
        let (Some(start), Some(end)) = (task.start_date, task.end_date) else {
            return Err(Error::validation(format!(
                "task {} has no slot to push",
                task.id
            )));
        };

        let description = match task.scheduling_reasoning.as_deref() {
            Some(reason) if !reason.is_empty() => format!("{}\n{}", task.title, reason),
            _ => task.title.clone(),
        };

        Ok(EventPayload {
            title: task.title.clone(),
            description,
            start_time: to_rfc3339_local(start, self.tz),
            end_time: to_rfc3339_local(end, self.tz),
            time_zone: self.tz.name().to_string(),
            start_utc: start,
            end_utc: end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn event(id: &str) -> Task {
        let start = now() + Duration::hours(2);
        Task::new(id, "Design review")
            .with_kind(TaskKind::Event)
            .with_priority(Priority::Plan)
            .with_slot(start, start + Duration::hours(1))
    }

    fn policy() -> SyncPolicy {
        SyncPolicy::new(chrono_tz::America::Chicago)
    }

    #[test]
    fn deadlines_and_past_events_are_not_synced() {
        let mut deadline = event("d");
        deadline.kind = TaskKind::Deadline;
        assert!(!policy().should_sync(&deadline, now()));

        let past = event("p");
        assert!(!policy().should_sync(&past, now() + Duration::hours(3)));

        let mut unslotted = event("u");
        unslotted.start_date = None;
        assert!(!policy().should_sync(&unslotted, now()));
    }

    #[test]
    fn completed_task_syncs_only_if_already_remote() {
        let fresh = event("a").done();
        assert!(!policy().should_sync(&fresh, now()));

        let synced = event("b").done().with_external_event_id("evt-b");
        assert!(policy().should_sync(&synced, now()));
    }

    #[test]
    fn first_push_needs_sync() {
        assert!(policy().needs_sync(&event("a"), None, now()));
    }

    #[test]
    fn identical_snapshot_needs_no_sync() {
        let t = event("a").with_external_event_id("evt-a");
        let snap = SyncSnapshot::of(&t).unwrap();
        assert!(!policy().needs_sync(&t, Some(&snap), now()));
    }

    #[test]
    fn snapshot_without_stored_link_needs_sync() {
        let t = event("a");
        let snap = SyncSnapshot::of(&t).unwrap();
        assert!(policy().needs_sync(&t, Some(&snap), now()));
    }

    #[test]
    fn end_date_drift_needs_sync() {
        let t = event("a").with_external_event_id("evt-a");
        let snap = SyncSnapshot::of(&t).unwrap();
        let mut moved = t.clone();
        moved.end_date = moved.end_date.map(|d| d + Duration::minutes(15));
        assert!(policy().needs_sync(&moved, Some(&snap), now()));
    }

    #[test]
    fn sub_millisecond_difference_is_ignored() {
        let t = event("a").with_external_event_id("evt-a");
        let snap = SyncSnapshot::of(&t).unwrap();
        let mut jitter = t.clone();
        jitter.start_date = jitter.start_date.map(|d| d + Duration::microseconds(300));
        assert!(!policy().needs_sync(&jitter, Some(&snap), now()));
    }

    #[test]
    fn marking_done_after_sync_is_drift() {
        let t = event("a").with_external_event_id("evt-a");
        let snap = SyncSnapshot::of(&t).unwrap();
        let done = t.done();
        assert!(policy().needs_sync(&done, Some(&snap), now()));
    }

    #[test]
    fn payload_uses_local_offset_and_appends_reasoning() {
        let mut t = event("a");
        t.scheduling_reasoning = Some("'plan' priority event scheduled for 1.0h".into());
        let p = policy().build_payload(&t).unwrap();
        assert_eq!(p.start_time, "2026-03-02T11:00:00-06:00");
        assert_eq!(p.end_time, "2026-03-02T12:00:00-06:00");
        assert_eq!(p.time_zone, "America/Chicago");
        assert_eq!(
            p.description,
            "Design review\n'plan' priority event scheduled for 1.0h"
        );

        let mut bare = event("b");
        bare.start_date = None;
        assert!(policy().build_payload(&bare).is_err());
    }
}
