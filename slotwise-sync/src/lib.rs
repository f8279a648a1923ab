//! slotwise-sync: collaborator seams, quota enforcement and external calendar
//! synchronization for Slotwise.
//!
//! Control flow for one request:
//! quota allowance -> slot allocation -> write-back -> quota charge,
//! then for event tasks: sync decision -> retried push through the mapper.

pub mod calendar;
pub mod engine;
pub mod mapper;
pub mod memory;
pub mod pipeline;
pub mod quota;
pub mod retry;
pub mod store;

pub use calendar::{CalendarClient, RemoteEvent};
pub use engine::{AutoSyncGate, SyncEngine, SyncFailure, SyncReport};
pub use mapper::{CalendarEventMapper, SyncAction};
pub use memory::{Document, LocalCalendar, MemoryStore};
pub use pipeline::{SchedulingService, SyncMode};
pub use quota::{QuotaGuard, QuotaStatus, QuotaUsage};
pub use retry::{AttemptState, ErrorClass, RetryCoordinator, RetryPolicy, classify_error, is_gone};
pub use store::{QuotaStore, SnapshotStore, StaticTier, TaskStore, TierLookup};
