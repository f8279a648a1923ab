//! Fixed scheduling and sync constants. These are not user configurable.

/// Attempts per sync operation before it is marked failed.
pub const RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff: `base * 2^(attempt-1)`.
pub const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Tasks pushed concurrently per sync batch.
pub const SYNC_BATCH_SIZE: usize = 5;

/// Pause between sync batches.
pub const SYNC_BATCH_DELAY_MS: u64 = 1000;

/// Minimum spacing between two automatic sync passes for one user.
pub const AUTO_SYNC_COOLDOWN_MS: i64 = 300_000;

/// Duration of an event-type task.
pub const DEFAULT_EVENT_DURATION_HOURS: i64 = 1;

/// Monthly operations per operation type on the free tier.
pub const FREE_TIER_MONTHLY_CAP: u32 = 25;

// Business hours (local time).
pub const DAY_START_HOUR: u32 = 9;
pub const DAY_END_HOUR: u32 = 18;
pub const LUNCH_START_HOUR: u32 = 12;
pub const LUNCH_END_HOUR: u32 = 13;

/// Gap left after every placed slot.
pub const SLOT_GAP_MINUTES: i64 = 30;

pub const DO_DURATION_MINUTES: i64 = 120;
pub const PLAN_DURATION_MINUTES: i64 = 90;
pub const DEFAULT_DURATION_MINUTES: i64 = 60;
