//! Batched calendar synchronization.
//!
//! Work is split into fixed-size batches run one after another with a pause
//! in between; tasks inside a batch are pushed concurrently. Every failure is
//! reported back in [`SyncReport`], nothing is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use slotwise_core::constants::{AUTO_SYNC_COOLDOWN_MS, SYNC_BATCH_DELAY_MS, SYNC_BATCH_SIZE};
use slotwise_core::{Priority, Task};
pub use slotwise_core::{SyncFailure, SyncReport};
use tracing::{info, warn};

use crate::mapper::{CalendarEventMapper, SyncAction};

fn record(report: &mut SyncReport, task_id: &str, outcome: slotwise_core::Result<Option<SyncAction>>) {
    match outcome {
        Ok(Some(SyncAction::Created(_))) => report.created.push(task_id.to_string()),
        Ok(Some(SyncAction::Updated(_))) => report.updated.push(task_id.to_string()),
        Ok(Some(SyncAction::Deleted(_))) => report.deleted.push(task_id.to_string()),
        Ok(None) => report.skipped += 1,
        Err(e) => report.failed.push(SyncFailure {
            task_id: task_id.to_string(),
            code: e.code().to_string(),
            error: e.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Work {
    Push,
    Remove,
}

pub struct SyncEngine {
    mapper: CalendarEventMapper,
    batch_size: usize,
    batch_delay: Duration,
}

impl SyncEngine {
    pub fn new(mapper: CalendarEventMapper) -> Self {
        Self {
            mapper,
            batch_size: SYNC_BATCH_SIZE,
            batch_delay: Duration::from_millis(SYNC_BATCH_DELAY_MS),
        }
    }

    pub fn mapper(&self) -> &CalendarEventMapper {
        &self.mapper
    }

    /// Push every task that drifted from its last synced state and delete
    /// remote events of tasks marked for removal. Tasks are updated in place
    /// with their new `external_event_id`.
    pub async fn sync_tasks(&self, tasks: &mut [Task], now: DateTime<Utc>) -> SyncReport {
        let mut report = SyncReport::default();
        let mut work = Vec::new();

        for (idx, task) in tasks.iter().enumerate() {
            if task.priority == Priority::Delete {
                if task.external_event_id.is_some() {
                    work.push((idx, Work::Remove));
                }
                continue;
            }

            let snapshot = match self.mapper.snapshots().snapshot(&task.id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "snapshot lookup failed, treating as unsynced");
                    None
                }
            };
            if self.mapper.policy().needs_sync(task, snapshot.as_ref(), now) {
                work.push((idx, Work::Push));
            } else {
                report.skipped += 1;
            }
        }

        let batch_size = self.batch_size.max(1);
        for (n, batch) in work.chunks(batch_size).enumerate() {
            if n > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }

            let jobs = batch.iter().map(|&(idx, kind)| {
                let mut task = tasks[idx].clone();
                async move {
                    let outcome = match kind {
                        Work::Push => self.mapper.push(&mut task).await.map(Some),
                        Work::Remove => self.mapper.delete(&mut task).await,
                    };
                    (idx, task, outcome)
                }
            });
            let results = join_all(jobs.collect::<Vec<_>>()).await;

            for (idx, task, outcome) in results {
                record(&mut report, &task.id, outcome);
                tasks[idx] = task;
            }
        }

        info!(
            created = report.created.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            skipped = report.skipped,
            failed = report.failed.len(),
            "sync pass finished"
        );
        report
    }

    /// Unlink tasks whose remote event disappeared, so the next pass
    /// re-creates them. Returns the ids of unlinked tasks.
    pub async fn reconcile(&self, tasks: &mut [Task]) -> Result<Vec<String>> {
        let linked: Vec<usize> = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.external_event_id.is_some() && t.has_slot() && t.priority != Priority::Delete)
            .map(|(i, _)| i)
            .collect();

        let Some(from) = linked.iter().filter_map(|&i| tasks[i].start_date).min() else {
            return Ok(Vec::new());
        };
        let Some(to) = linked.iter().filter_map(|&i| tasks[i].end_date).max() else {
            return Ok(Vec::new());
        };

        let remote: HashSet<String> = self
            .mapper
            .client()
            .list_events(from, to)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();

        let mut unlinked = Vec::new();
        for idx in linked {
            let task = &mut tasks[idx];
            let Some(event_id) = task.external_event_id.as_deref() else { continue };
            if remote.contains(event_id) {
                continue;
            }
            warn!(task_id = %task.id, event_id, "remote event missing, unlinking");
            task.external_event_id = None;
            self.mapper.snapshots().remove_snapshot(&task.id).await?;
            unlinked.push(task.id.clone());
        }
        Ok(unlinked)
    }
}

/// Enforces a minimum spacing between automatic sync passes per user.
#[derive(Debug)]
pub struct AutoSyncGate {
    cooldown: chrono::Duration,
    last_run: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Default for AutoSyncGate {
    fn default() -> Self {
        Self::new(chrono::Duration::milliseconds(AUTO_SYNC_COOLDOWN_MS))
    }
}

impl AutoSyncGate {
    pub fn new(cooldown: chrono::Duration) -> Self {
        Self {
            cooldown,
            last_run: Mutex::new(HashMap::new()),
        }
    }

    /// Seed with a previous run, e.g. restored from disk.
    pub fn with_last_run(self, user_id: &str, at: DateTime<Utc>) -> Self {
        self.mark_run(user_id, at);
        self
    }

    pub fn last_run(&self, user_id: &str) -> Option<DateTime<Utc>> {
        self.last_run
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .copied()
    }

    pub fn mark_run(&self, user_id: &str, at: DateTime<Utc>) {
        self.last_run
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string(), at);
    }

    /// Claim a run slot. Returns false while the cooldown has not elapsed.
    pub fn try_begin(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let mut last = self.last_run.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = last.get(user_id) {
            if now - *prev < self.cooldown {
                return false;
            }
        }
        last.insert(user_id.to_string(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn gate_blocks_within_cooldown() {
        let gate = AutoSyncGate::default();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        assert!(gate.try_begin("u1", t0));
        assert!(!gate.try_begin("u1", t0 + chrono::Duration::minutes(4)));
        assert!(gate.try_begin("u2", t0 + chrono::Duration::minutes(4)));
        assert!(gate.try_begin("u1", t0 + chrono::Duration::minutes(5)));
        assert_eq!(gate.last_run("u1"), Some(t0 + chrono::Duration::minutes(5)));
    }
}
