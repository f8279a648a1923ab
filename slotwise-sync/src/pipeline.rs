//! Request orchestration: quota -> allocation -> write-back -> charge, and
//! the sync pass for event tasks.

use std::sync::Arc;

use chrono_tz::Tz;
use slotwise_core::quota::limit_message;
use slotwise_core::{
    AllocationOptions, Clock, Error, OperationType, Result, ScheduleRequest, ScheduleSummary,
    SlotAllocator, SyncRequest, Task,
};
use tracing::{info, warn};

use crate::engine::{AutoSyncGate, SyncEngine, SyncReport};
use crate::quota::QuotaGuard;
use crate::retry::{ErrorClass, classify_error};
use crate::store::TaskStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Explicit user request; ignores the cooldown.
    Manual,
    /// Triggered automatically; skipped while the cooldown runs.
    Auto,
}

pub struct SchedulingService {
    tasks: Arc<dyn TaskStore>,
    quota: QuotaGuard,
    clock: Arc<dyn Clock>,
    default_tz: Tz,
    gate: AutoSyncGate,
}

impl SchedulingService {
    pub fn new(tasks: Arc<dyn TaskStore>, quota: QuotaGuard, clock: Arc<dyn Clock>, default_tz: Tz) -> Self {
        Self {
            tasks,
            quota,
            clock,
            default_tz,
            gate: AutoSyncGate::default(),
        }
    }

    pub fn with_gate(mut self, gate: AutoSyncGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &AutoSyncGate {
        &self.gate
    }

    pub fn quota(&self) -> &QuotaGuard {
        &self.quota
    }

    /// Assign slots to the user's pending tasks.
    ///
    /// Free-tier users get at most their remaining monthly allowance of
    /// tasks scheduled; the summary then carries a `limit_message`. Only the
    /// tasks actually scheduled and persisted are charged. A failed charge is
    /// logged and does not fail the request.
    pub async fn schedule(&self, req: &ScheduleRequest) -> Result<ScheduleSummary> {
        req.validate()?;
        let tz = req.resolve_timezone(self.default_tz)?;
        let user_id = req.user_id.as_str();

        let mut tasks = self.tasks.load_tasks(user_id).await.map_err(Error::persistence)?;
        for task in &tasks {
            task.validate()?;
        }

        let requested = SlotAllocator::eligible_count(&tasks, req.force_reschedule);
        if requested == 0 {
            info!(user_id, "nothing to schedule");
            return Ok(ScheduleSummary::default());
        }

        let allowance = self
            .quota
            .tokens_left(user_id, OperationType::Scheduling)
            .await
            .map_err(Error::persistence)?;
        if allowance.is_exhausted() {
            warn!(user_id, requested, "scheduling quota exhausted");
            return Err(Error::QuotaExceeded {
                requested,
                remaining: 0,
            });
        }

        let mut opts = AllocationOptions::new(self.clock.now());
        opts.limit = allowance.cap();
        opts.force_reschedule = req.force_reschedule;

        let allocation = SlotAllocator::new(tz).allocate(&mut tasks, &opts);
        let scheduled = allocation.slots.len();
        let mut summary = ScheduleSummary::from_slots(allocation.slots);
        if allocation.deferred > 0 {
            summary.limit_message = Some(limit_message(scheduled, requested));
        }

        if let Err(e) = self.tasks.save_tasks(user_id, &tasks).await {
            warn!(user_id, error = %e, "failed to persist schedule");
            return Err(Error::Persistence {
                message: format!("{e:#}"),
                summary: Some(Box::new(summary)),
                report: None,
            });
        }

        if allowance.cap().is_some() {
            if let Err(e) = self.quota.consume(user_id, OperationType::Scheduling, scheduled).await {
                warn!(user_id, scheduled, error = %e, "failed to record quota usage");
            }
        }

        info!(user_id, scheduled, requested, "schedule computed");
        Ok(summary)
    }

    /// Run a sync pass over the user's tasks and persist the new links.
    ///
    /// Returns `None` when an automatic pass is still cooling down. If the
    /// new links cannot be stored, events created in this pass are deleted
    /// again and the report travels inside `Error::Persistence`.
    pub async fn sync(&self, req: &SyncRequest, engine: &SyncEngine, mode: SyncMode) -> Result<Option<SyncReport>> {
        req.validate()?;
        let user_id = req.user_id.as_str();
        let now = self.clock.now();

        match mode {
            SyncMode::Auto if !self.gate.try_begin(user_id, now) => {
                info!(user_id, "auto sync skipped, cooldown active");
                return Ok(None);
            }
            SyncMode::Manual => self.gate.mark_run(user_id, now),
            SyncMode::Auto => {}
        }

        let mut tasks = self.tasks.load_tasks(user_id).await.map_err(Error::persistence)?;
        for task in &tasks {
            task.validate()?;
        }

        let report = engine.sync_tasks(&mut tasks, now).await;
        if report.pushed() > 0 {
            if let Err(e) = self.tasks.save_tasks(user_id, &tasks).await {
                warn!(user_id, error = %e, "failed to persist sync links");
                let rolled_back = rollback_created(engine, &mut tasks, &report.created).await;
                return Err(Error::Persistence {
                    message: format!("{e:#} ({rolled_back} new event(s) rolled back)"),
                    summary: None,
                    report: Some(Box::new(report)),
                });
            }
        }
        Ok(Some(report))
    }

    /// Unlink tasks whose remote events vanished and persist the result.
    pub async fn reconcile(&self, req: &SyncRequest, engine: &SyncEngine) -> Result<Vec<String>> {
        req.validate()?;
        let user_id = req.user_id.as_str();
        let mut tasks = self.tasks.load_tasks(user_id).await.map_err(Error::persistence)?;

        let unlinked = engine
            .reconcile(&mut tasks)
            .await
            .map_err(|e| {
                let message = format!("{e:#}");
                match classify_error(&message) {
                    ErrorClass::Retryable => Error::TransientSync(message),
                    ErrorClass::Fatal => Error::FatalSync(message),
                }
            })?;
        if !unlinked.is_empty() {
            self.tasks
                .save_tasks(user_id, &tasks)
                .await
                .map_err(Error::persistence)?;
        }
        Ok(unlinked)
    }
}

/// Undo events created in a pass whose links could not be stored, so a
/// retry re-creates them instead of leaving unlinked duplicates behind.
async fn rollback_created(engine: &SyncEngine, tasks: &mut [Task], created: &[String]) -> usize {
    let mapper = engine.mapper();
    let mut rolled_back = 0;
    for task in tasks.iter_mut().filter(|t| created.contains(&t.id)) {
        match mapper.delete(task).await {
            Ok(_) => rolled_back += 1,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "could not roll back created event");
                if let Err(e) = mapper.snapshots().remove_snapshot(&task.id).await {
                    warn!(task_id = %task.id, error = %e, "failed to drop sync snapshot");
                }
            }
        }
    }
    rolled_back
}
