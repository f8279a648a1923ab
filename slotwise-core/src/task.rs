//! Task model shared by the allocator, the quota pipeline and calendar sync.
//!
//! Field names serialize in camelCase so tasks round-trip through the
//! document store unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Deadline,
    Event,
}

/// Eisenhower-style priority class, assigned upstream.
///
/// Any label outside the known set deserializes to [`Priority::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Do,
    Plan,
    Delegate,
    /// Marked for removal; never scheduled.
    Delete,
    #[serde(other)]
    Other,
}

impl Priority {
    /// Sort rank: do=1, plan=2, delegate=3, everything else=4.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Do => 1,
            Priority::Plan => 2,
            Priority::Delegate => 3,
            _ => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::Do => "do",
            Priority::Plan => "plan",
            Priority::Delegate => "delegate",
            Priority::Delete => "delete",
            Priority::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,

    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub priority: Priority,

    #[serde(default)]
    pub is_done: bool,

    /// Reference date used only to break priority ties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,

    /// Set once the task has been pushed to the external calendar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_event_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling_reasoning: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: TaskKind::Deadline,
            priority: Priority::Other,
            is_done: false,
            task_date: None,
            start_date: None,
            end_date: None,
            external_event_id: None,
            scheduling_reasoning: None,
        }
    }

    pub fn with_kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_task_date(mut self, date: DateTime<Utc>) -> Self {
        self.task_date = Some(date);
        self
    }

    pub fn with_slot(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn with_external_event_id(mut self, id: impl Into<String>) -> Self {
        self.external_event_id = Some(id.into());
        self
    }

    pub fn done(mut self) -> Self {
        self.is_done = true;
        self
    }

    /// Not completed and not marked for removal.
    pub fn is_open(&self) -> bool {
        !self.is_done && self.priority != Priority::Delete
    }

    /// A slot counts as assigned only when both ends are present.
    pub fn has_slot(&self) -> bool {
        self.start_date.is_some() && self.end_date.is_some()
    }

    pub fn clear_slot(&mut self) {
        self.start_date = None;
        self.end_date = None;
        self.scheduling_reasoning = None;
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::validation("task id must be non-empty"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return Err(Error::validation(format!(
                    "task {}: startDate must be before endDate",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn unknown_priority_falls_back_to_other() {
        let json = r#"{"id":"t1","title":"x","type":"deadline","priority":"decide"}"#;
        let t: Task = serde_json::from_str(json).unwrap();
        assert_eq!(t.priority, Priority::Other);
        assert_eq!(t.priority.rank(), 4);
        assert!(!t.is_done);
    }

    #[test]
    fn serializes_camel_case_with_type_field() {
        let t = Task::new("t1", "Standup")
            .with_kind(TaskKind::Event)
            .with_external_event_id("evt-1");
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["type"], "event");
        assert_eq!(v["externalEventId"], "evt-1");
        assert_eq!(v["isDone"], false);
        assert!(v.get("startDate").is_none());
    }

    #[test]
    fn validate_rejects_inverted_slot() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let t = Task::new("t1", "x").with_slot(start, start);
        assert!(t.validate().is_err());

        let ok = Task::new("t2", "x").with_slot(start, start + chrono::Duration::hours(1));
        assert!(ok.validate().is_ok());
        assert!(Task::new(" ", "blank").validate().is_err());
    }

    #[test]
    fn delete_priority_is_not_open() {
        let t = Task::new("t1", "gone").with_priority(Priority::Delete);
        assert!(!t.is_open());
        assert!(!Task::new("t2", "finished").done().is_open());
    }
}
