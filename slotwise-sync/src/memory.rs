//! In-process document store and local calendar.
//!
//! Both keep their state behind a mutex so every trait operation, including
//! the quota increment, is applied atomically. The CLI loads them from and
//! saves them to JSON files under the Slotwise home.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotwise_core::{EventPayload, OperationType, QuotaRecord, SyncSnapshot, Task};

use crate::calendar::{CalendarClient, RemoteEvent};
use crate::store::{QuotaStore, SnapshotStore, TaskStore};

/// Serializable state of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub tasks: BTreeMap<String, Vec<Task>>,
    #[serde(default)]
    pub quota: BTreeMap<String, QuotaRecord>,
    #[serde(default)]
    pub snapshots: BTreeMap<String, SyncSnapshot>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: Mutex<Document>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(doc: Document) -> Self {
        Self { doc: Mutex::new(doc) }
    }

    pub fn document(&self) -> Document {
        self.lock().clone()
    }

    /// Insert or replace a single task for `user_id`.
    pub fn upsert_task(&self, user_id: &str, task: Task) {
        let mut doc = self.lock();
        let list = doc.tasks.entry(user_id.to_string()).or_default();
        match list.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => list.push(task),
        }
    }

    pub fn remove_task(&self, user_id: &str, task_id: &str) -> Option<Task> {
        let mut doc = self.lock();
        let list = doc.tasks.get_mut(user_id)?;
        let pos = list.iter().position(|t| t.id == task_id)?;
        Some(list.remove(pos))
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.doc.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn load_tasks(&self, user_id: &str) -> Result<Vec<Task>> {
        Ok(self.lock().tasks.get(user_id).cloned().unwrap_or_default())
    }

    async fn save_tasks(&self, user_id: &str, tasks: &[Task]) -> Result<()> {
        let mut doc = self.lock();
        let list = doc.tasks.entry(user_id.to_string()).or_default();
        for task in tasks {
            match list.iter_mut().find(|t| t.id == task.id) {
                Some(existing) => *existing = task.clone(),
                None => list.push(task.clone()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QuotaStore for MemoryStore {
    async fn load(&self, user_id: &str) -> Result<Option<QuotaRecord>> {
        Ok(self.lock().quota.get(user_id).cloned())
    }

    async fn reset_if_stale(&self, user_id: &str, now: DateTime<Utc>) -> Result<QuotaRecord> {
        let mut doc = self.lock();
        let record = doc
            .quota
            .entry(user_id.to_string())
            .or_insert_with(|| QuotaRecord::new(now));
        if record.is_stale(now) {
            tracing::info!(user_id, "monthly quota reset");
            record.reset(now);
        }
        Ok(record.clone())
    }

    async fn increment(&self, user_id: &str, op: OperationType, count: u32) -> Result<()> {
        let mut doc = self.lock();
        let Some(record) = doc.quota.get_mut(user_id) else {
            bail!("no quota record for user {user_id}");
        };
        record.add(op, count);
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn snapshot(&self, task_id: &str) -> Result<Option<SyncSnapshot>> {
        Ok(self.lock().snapshots.get(task_id).cloned())
    }

    async fn put_snapshot(&self, task_id: &str, snapshot: SyncSnapshot) -> Result<()> {
        self.lock().snapshots.insert(task_id.to_string(), snapshot);
        Ok(())
    }

    async fn remove_snapshot(&self, task_id: &str) -> Result<()> {
        self.lock().snapshots.remove(task_id);
        Ok(())
    }
}

/// Calendar kept in memory, used when no provider integration is configured.
#[derive(Debug, Default)]
pub struct LocalCalendar {
    events: Mutex<BTreeMap<String, RemoteEvent>>,
}

impl LocalCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<RemoteEvent>) -> Self {
        let map = events.into_iter().map(|e| (e.id.clone(), e)).collect();
        Self { events: Mutex::new(map) }
    }

    pub fn events(&self) -> Vec<RemoteEvent> {
        self.lock().values().cloned().collect()
    }

    pub fn get(&self, event_id: &str) -> Option<RemoteEvent> {
        self.lock().get(event_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, RemoteEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn to_event(id: String, payload: &EventPayload) -> RemoteEvent {
    RemoteEvent {
        id,
        title: payload.title.clone(),
        description: payload.description.clone(),
        start_utc: payload.start_utc,
        end_utc: payload.end_utc,
    }
}

#[async_trait]
impl CalendarClient for LocalCalendar {
    async fn create_event(&self, payload: &EventPayload) -> Result<String> {
        let id = format!("local-{}", uuid::Uuid::new_v4());
        self.lock().insert(id.clone(), to_event(id.clone(), payload));
        Ok(id)
    }

    async fn update_event(&self, event_id: &str, payload: &EventPayload) -> Result<()> {
        let mut events = self.lock();
        let Some(existing) = events.get_mut(event_id) else {
            bail!("HTTP 404: event {event_id} not found");
        };
        *existing = to_event(event_id.to_string(), payload);
        Ok(())
    }

    async fn delete_event(&self, event_id: &str) -> Result<()> {
        if self.lock().remove(event_id).is_none() {
            bail!("HTTP 410: event {event_id} already deleted");
        }
        Ok(())
    }

    async fn list_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<RemoteEvent>> {
        Ok(self
            .lock()
            .values()
            .filter(|e| e.start_utc < to && e.end_utc > from)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[tokio::test]
    async fn reset_happens_once_per_month() {
        let store = MemoryStore::new();
        let march = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        store.reset_if_stale("u1", march).await.unwrap();
        store.increment("u1", OperationType::Scheduling, 4).await.unwrap();

        let same_month = store.reset_if_stale("u1", march + chrono::Duration::days(10)).await.unwrap();
        assert_eq!(same_month.used(OperationType::Scheduling), 4);

        let april = Utc.with_ymd_and_hms(2026, 4, 1, 0, 5, 0).unwrap();
        let reset = store.reset_if_stale("u1", april).await.unwrap();
        assert_eq!(reset.used(OperationType::Scheduling), 0);
        assert_eq!(reset.last_reset_timestamp.month(), 4);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let now = Utc.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).unwrap();
        store.reset_if_stale("u1", now).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                s.increment("u1", OperationType::Scheduling, 1).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let rec = store.load("u1").await.unwrap().unwrap();
        assert_eq!(rec.used(OperationType::Scheduling), 10);
    }

    #[tokio::test]
    async fn save_tasks_replaces_by_id() {
        let store = MemoryStore::new();
        store.upsert_task("u1", Task::new("a", "first"));
        store.upsert_task("u1", Task::new("b", "second"));
        store
            .save_tasks("u1", &[Task::new("a", "renamed")])
            .await
            .unwrap();
        let tasks = store.load_tasks("u1").await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "renamed");
        assert!(store.remove_task("u1", "b").is_some());
        assert!(store.remove_task("u1", "b").is_none());
    }

    #[tokio::test]
    async fn local_calendar_reports_missing_events() {
        let cal = LocalCalendar::new();
        let err = cal.delete_event("nope").await.unwrap_err();
        assert!(err.to_string().contains("410"));
    }
}
