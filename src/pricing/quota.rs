//! Budget of live-lookup attempts.
//!
//! Consumption goes through [`LookupQuota::try_acquire`], an atomic
//! decrement-if-positive: concurrent resolvers can never collectively exceed
//! the budget, and a resolver that loses the race gets `false` immediately
//! instead of waiting.
//!
//! The window index and the units left share one `AtomicU64` (high and low 32
//! bits), so rolling over to a new window and taking a unit from it happen in
//! the same atomic update.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// When the budget is replenished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuotaWindow {
    /// One budget per run; every run gets its own quota.
    PerRun,
    /// Full budget at the start of every period (e.g. a billing window),
    /// shared by all runs.
    Rolling { period_secs: u64 },
}

impl Default for QuotaWindow {
    fn default() -> Self {
        Self::PerRun
    }
}

fn pack(epoch: u32, remaining: u32) -> u64 {
    (u64::from(epoch) << 32) | u64::from(remaining)
}

fn unpack(state: u64) -> (u32, u32) {
    ((state >> 32) as u32, state as u32)
}

/// State after taking one unit in window `current`, or `None` when it is empty.
fn take_unit(state: u64, current: u32, budget: u32) -> Option<u64> {
    let (epoch, remaining) = unpack(state);
    let remaining = if current > epoch { budget } else { remaining };
    remaining
        .checked_sub(1)
        .map(|left| pack(epoch.max(current), left))
}

#[derive(Debug)]
pub struct LookupQuota {
    budget: u32,
    window: QuotaWindow,
    /// `(window index, units left)`, packed.
    state: AtomicU64,
    origin: Instant,
}

impl LookupQuota {
    /// Budgets above `u32::MAX` are clamped.
    pub fn new(budget: u64, window: QuotaWindow) -> Self {
        let budget = u32::try_from(budget).unwrap_or(u32::MAX);
        Self {
            budget,
            window,
            state: AtomicU64::new(pack(0, budget)),
            origin: Instant::now(),
        }
    }

    /// Take one unit if any is left.
    pub fn try_acquire(&self) -> bool {
        let current = self.current_window();
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| {
                take_unit(state, current, self.budget)
            })
            .is_ok()
    }

    pub fn remaining(&self) -> u64 {
        let (epoch, remaining) = unpack(self.state.load(Ordering::Acquire));
        if self.current_window() > epoch {
            u64::from(self.budget)
        } else {
            u64::from(remaining)
        }
    }

    fn current_window(&self) -> u32 {
        match self.window {
            QuotaWindow::PerRun => 0,
            QuotaWindow::Rolling { period_secs } => {
                let period = Duration::from_secs(period_secs.max(1));
                let index = self.origin.elapsed().as_nanos() / period.as_nanos();
                u32::try_from(index).unwrap_or(u32::MAX)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_acquire_until_exhausted() {
        let quota = LookupQuota::new(2, QuotaWindow::PerRun);
        assert!(quota.try_acquire());
        assert!(quota.try_acquire());
        assert!(!quota.try_acquire());
        assert_eq!(quota.remaining(), 0);
    }

    #[test]
    fn test_zero_budget_never_acquires() {
        let quota = LookupQuota::new(0, QuotaWindow::PerRun);
        assert!(!quota.try_acquire());
        assert_eq!(quota.remaining(), 0);
    }

    #[test]
    fn test_roll_and_take_are_one_transition() {
        // Empty window 0; the first acquisition in window 1 refills and takes.
        assert_eq!(take_unit(pack(0, 0), 1, 3), Some(pack(1, 2)));
        // A caller that still thinks it is in window 0 cannot refill window 1.
        assert_eq!(take_unit(pack(1, 0), 0, 3), None);
        assert_eq!(take_unit(pack(1, 2), 0, 3), Some(pack(1, 1)));
        assert_eq!(take_unit(pack(4, 0), 4, 3), None);
        assert_eq!(take_unit(pack(0, 5), 0, 0), Some(pack(0, 4)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rolling_window_resets_after_period() {
        let quota = LookupQuota::new(1, QuotaWindow::Rolling { period_secs: 60 });
        assert!(quota.try_acquire());
        assert!(!quota.try_acquire());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(quota.remaining(), 1);
        assert!(quota.try_acquire());
        assert!(!quota.try_acquire());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquisition_never_exceeds_budget() {
        let quota = Arc::new(LookupQuota::new(25, QuotaWindow::PerRun));
        let mut handles = Vec::new();
        for _ in 0..64 {
            let quota = quota.clone();
            handles.push(tokio::spawn(async move {
                (0..10).filter(|_| quota.try_acquire()).count()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            granted += handle.await.unwrap();
        }
        assert_eq!(granted, 25);
        assert_eq!(quota.remaining(), 0);
    }
}
