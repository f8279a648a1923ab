//! QuotaGuard: per-user monthly budget of automated operations.
//!
//! Callers ask for the allowance first, truncate their work to it, and charge
//! only what actually succeeded.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use slotwise_core::{Allowance, Clock, OperationType, Tier};
use tracing::debug;

use crate::store::{QuotaStore, TierLookup};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    pub operation: OperationType,
    pub used: u32,
    /// `None` for unlimited tiers.
    pub remaining: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub tier: Tier,
    pub usage: Vec<QuotaUsage>,
}

#[derive(Clone)]
pub struct QuotaGuard {
    store: Arc<dyn QuotaStore>,
    tiers: Arc<dyn TierLookup>,
    clock: Arc<dyn Clock>,
}

impl QuotaGuard {
    pub fn new(store: Arc<dyn QuotaStore>, tiers: Arc<dyn TierLookup>, clock: Arc<dyn Clock>) -> Self {
        Self { store, tiers, clock }
    }

    /// Operations of type `op` the user may still run this month.
    ///
    /// Performs the lazy monthly reset before reading. Paid users are
    /// unlimited and never touch the counters.
    pub async fn tokens_left(&self, user_id: &str, op: OperationType) -> Result<Allowance> {
        if self.tiers.tier(user_id).await? == Tier::Paid {
            return Ok(Allowance::Unlimited);
        }
        let record = self.store.reset_if_stale(user_id, self.clock.now()).await?;
        let remaining = record.remaining(op);
        debug!(user_id, ?op, remaining, "quota allowance");
        Ok(Allowance::Limited(remaining))
    }

    /// Charge `count` successfully processed operations.
    pub async fn consume(&self, user_id: &str, op: OperationType, count: usize) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        self.store.increment(user_id, op, count).await?;
        debug!(user_id, ?op, count, "quota consumed");
        Ok(())
    }

    pub async fn status(&self, user_id: &str) -> Result<QuotaStatus> {
        let tier = self.tiers.tier(user_id).await?;
        let record = self.store.reset_if_stale(user_id, self.clock.now()).await?;
        let usage = OperationType::ALL
            .iter()
            .map(|&op| QuotaUsage {
                operation: op,
                used: record.used(op),
                remaining: match tier {
                    Tier::Free => Some(record.remaining(op)),
                    Tier::Paid => None,
                },
            })
            .collect();
        Ok(QuotaStatus { tier, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::StaticTier;
    use chrono::{Duration, TimeZone, Utc};
    use slotwise_core::FixedClock;

    fn guard(tier: Tier, clock: FixedClock) -> (QuotaGuard, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let g = QuotaGuard::new(store.clone(), Arc::new(StaticTier(tier)), Arc::new(clock));
        (g, store)
    }

    #[tokio::test]
    async fn twenty_five_per_month_then_reset() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 30, 12, 0, 0).unwrap());
        let (g, _) = guard(Tier::Free, clock.clone());
        let op = OperationType::Scheduling;

        assert_eq!(g.tokens_left("u1", op).await.unwrap(), Allowance::Limited(25));
        g.consume("u1", op, 20).await.unwrap();
        g.consume("u1", op, 5).await.unwrap();
        assert_eq!(g.tokens_left("u1", op).await.unwrap(), Allowance::Limited(0));

        g.consume("u1", op, 3).await.unwrap();
        assert_eq!(g.tokens_left("u1", op).await.unwrap(), Allowance::Limited(0));

        // Prioritization has its own budget.
        assert_eq!(
            g.tokens_left("u1", OperationType::Prioritization).await.unwrap(),
            Allowance::Limited(25)
        );

        clock.advance(Duration::days(3));
        assert_eq!(g.tokens_left("u1", op).await.unwrap(), Allowance::Limited(25));
    }

    #[tokio::test]
    async fn paid_tier_is_unlimited_and_uncounted() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap());
        let (g, store) = guard(Tier::Paid, clock);
        assert_eq!(
            g.tokens_left("u1", OperationType::Scheduling).await.unwrap(),
            Allowance::Unlimited
        );
        assert!(store.load("u1").await.unwrap().is_none());

        let status = g.status("u1").await.unwrap();
        assert_eq!(status.tier, Tier::Paid);
        assert!(status.usage.iter().all(|u| u.remaining.is_none()));
    }

    #[tokio::test]
    async fn consume_zero_is_a_no_op() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 3, 12, 0, 0).unwrap());
        let (g, store) = guard(Tier::Free, clock);
        // No record exists yet, so a real increment would fail.
        g.consume("u1", OperationType::Scheduling, 0).await.unwrap();
        assert!(store.load("u1").await.unwrap().is_none());
    }
}
