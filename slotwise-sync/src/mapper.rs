//! CalendarEventMapper: owns the 1:1 link between a task and its external
//! calendar event.
//!
//! - create stores the returned id on the task and records a snapshot
//! - update requires an existing id and never falls back to create
//! - delete clears the id only after the provider confirms the deletion or
//!   reports the event as already gone

use std::sync::Arc;

use slotwise_core::{Error, Result, SyncPolicy, SyncSnapshot, Task};
use tracing::{info, warn};

use crate::calendar::CalendarClient;
use crate::retry::{RetryCoordinator, is_gone};
use crate::store::SnapshotStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    Created(String),
    Updated(String),
    Deleted(String),
}

#[derive(Clone)]
pub struct CalendarEventMapper {
    client: Arc<dyn CalendarClient>,
    snapshots: Arc<dyn SnapshotStore>,
    retry: RetryCoordinator,
    policy: SyncPolicy,
}

impl CalendarEventMapper {
    pub fn new(
        client: Arc<dyn CalendarClient>,
        snapshots: Arc<dyn SnapshotStore>,
        retry: RetryCoordinator,
        policy: SyncPolicy,
    ) -> Self {
        Self {
            client,
            snapshots,
            retry,
            policy,
        }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    pub fn client(&self) -> &Arc<dyn CalendarClient> {
        &self.client
    }

    pub fn snapshots(&self) -> &Arc<dyn SnapshotStore> {
        &self.snapshots
    }

    /// Update when the task is already linked, otherwise create.
    pub async fn push(&self, task: &mut Task) -> Result<SyncAction> {
        if task.external_event_id.is_some() {
            self.update(task).await
        } else {
            self.create(task).await
        }
    }

    pub async fn create(&self, task: &mut Task) -> Result<SyncAction> {
        if let Some(existing) = &task.external_event_id {
            return Err(Error::FatalSync(format!(
                "task {} is already linked to event {existing}",
                task.id
            )));
        }
        let payload = self.policy.build_payload(task)?;
        let client = &self.client;
        let payload = &payload;

        let event_id = self
            .retry
            .run("create", move |_| client.create_event(payload))
            .await?;

        task.external_event_id = Some(event_id.clone());
        self.record_snapshot(task).await;
        info!(task_id = %task.id, event_id = %event_id, "calendar event created");
        Ok(SyncAction::Created(event_id))
    }

    pub async fn update(&self, task: &mut Task) -> Result<SyncAction> {
        let Some(event_id) = task.external_event_id.clone() else {
            return Err(Error::FatalSync(format!(
                "cannot update task {}: no external event id",
                task.id
            )));
        };
        let payload = self.policy.build_payload(task)?;
        let client = &self.client;
        let payload = &payload;
        let id = event_id.as_str();

        self.retry
            .run("update", move |_| client.update_event(id, payload))
            .await?;

        self.record_snapshot(task).await;
        info!(task_id = %task.id, event_id = %event_id, "calendar event updated");
        Ok(SyncAction::Updated(event_id))
    }

    /// Returns `None` when the task was never linked. An event the provider
    /// reports as missing or gone counts as deleted.
    pub async fn delete(&self, task: &mut Task) -> Result<Option<SyncAction>> {
        let Some(event_id) = task.external_event_id.clone() else {
            return Ok(None);
        };
        let client = &self.client;
        let id = event_id.as_str();

        match self.retry.run("delete", move |_| client.delete_event(id)).await {
            Ok(()) => {}
            Err(Error::FatalSync(message)) if is_gone(&message) => {
                info!(task_id = %task.id, event_id = %event_id, "calendar event already gone");
            }
            Err(e) => return Err(e),
        }

        task.external_event_id = None;
        if let Err(e) = self.snapshots.remove_snapshot(&task.id).await {
            warn!(task_id = %task.id, error = %e, "failed to drop sync snapshot");
        }
        info!(task_id = %task.id, event_id = %event_id, "calendar event deleted");
        Ok(Some(SyncAction::Deleted(event_id)))
    }

    /// A missing snapshot only causes one redundant update on the next pass.
    async fn record_snapshot(&self, task: &Task) {
        let Some(snapshot) = SyncSnapshot::of(task) else { return };
        if let Err(e) = self.snapshots.put_snapshot(&task.id, snapshot).await {
            warn!(task_id = %task.id, error = %e, "failed to record sync snapshot");
        }
    }
}
