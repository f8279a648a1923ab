//! slotwise-core: task model, slot allocation and sync policy for Slotwise.
//!
//! Everything in this crate is deterministic and free of I/O. Collaborators
//! (persistence, calendars, subscription tiers) live in `slotwise-sync`.

pub mod allocator;
pub mod clock;
pub mod constants;
pub mod error;
pub mod quota;
pub mod request;
pub mod sync_policy;
pub mod task;
pub mod time;

pub use allocator::{Allocation, AllocationOptions, ScheduleSummary, ScheduledSlot, SlotAllocator};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{Error, Result};
pub use quota::{Allowance, OperationType, QuotaRecord, Tier};
pub use request::{Request, ScheduleRequest, SyncRequest};
pub use sync_policy::{EventPayload, SyncFailure, SyncPolicy, SyncReport, SyncSnapshot};
pub use task::{Priority, Task, TaskKind};
