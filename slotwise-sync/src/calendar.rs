//! External calendar seam. Implementations receive an already-authenticated
//! handle; token refresh is their concern.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotwise_core::EventPayload;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Create an event, returning the provider's id for it.
    async fn create_event(&self, payload: &EventPayload) -> Result<String>;

    async fn update_event(&self, event_id: &str, payload: &EventPayload) -> Result<()>;

    async fn delete_event(&self, event_id: &str) -> Result<()>;

    /// Events overlapping `[from, to)`.
    async fn list_events(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<RemoteEvent>>;
}
