//! Narrow persistence and subscription seams.
//!
//! The document store behind these traits is an external collaborator. The
//! quota counter operations are explicit capabilities: implementations must
//! perform `increment` and `reset_if_stale` atomically on their side, never as
//! a read followed by a separate write.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slotwise_core::{OperationType, QuotaRecord, SyncSnapshot, Task, Tier};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn load_tasks(&self, user_id: &str) -> Result<Vec<Task>>;

    /// Write back every task in `tasks`, replacing stored copies by id.
    async fn save_tasks(&self, user_id: &str, tasks: &[Task]) -> Result<()>;
}

#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<QuotaRecord>>;

    /// Zero all counters if the stored record belongs to an earlier month
    /// (or does not exist yet), stamping `now`. Returns the record as it is
    /// after the check.
    async fn reset_if_stale(&self, user_id: &str, now: DateTime<Utc>) -> Result<QuotaRecord>;

    /// Atomically add `count` to the counter for `op`.
    async fn increment(&self, user_id: &str, op: OperationType, count: u32) -> Result<()>;
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn snapshot(&self, task_id: &str) -> Result<Option<SyncSnapshot>>;
    async fn put_snapshot(&self, task_id: &str, snapshot: SyncSnapshot) -> Result<()>;
    async fn remove_snapshot(&self, task_id: &str) -> Result<()>;
}

/// Subscription tier lookup.
#[async_trait]
pub trait TierLookup: Send + Sync {
    async fn tier(&self, user_id: &str) -> Result<Tier>;
}

/// Same tier for every user; used when the tier comes from local config.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticTier(pub Tier);

#[async_trait]
impl TierLookup for StaticTier {
    async fn tier(&self, _user_id: &str) -> Result<Tier> {
        Ok(self.0)
    }
}
