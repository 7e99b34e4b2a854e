//! Inactivity-based redistribution policy.
//!
//! State machine per token: active → (N days without ledger activity) →
//! redistributed. Approaching tokens get warnings at configured
//! days-remaining thresholds. The recipient is a uniformly random active
//! trader, falling back to the community pool when nobody qualifies.
//!
//! Pure decision logic; the store applies the outcome atomically and owns
//! warning deduplication.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::time::days_between;

/// Sentinel owner receiving tokens when no active trader qualifies.
pub const COMMUNITY_POOL: &str = "community-pool";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RedistributionPolicy {
    /// Days without activity before a token is reassigned.
    pub inactive_after_days: u64,
    /// Days-remaining thresholds that trigger a warning, ascending.
    pub warn_at_days: Vec<u64>,
    /// Minimum transfers in the trailing window to count as an active trader.
    pub min_trades: usize,
    /// Trailing window, in days, for the active-trader census.
    pub activity_window_days: u64,
}

impl Default for RedistributionPolicy {
    fn default() -> Self {
        Self {
            inactive_after_days: 30,
            warn_at_days: vec![1, 3, 7],
            min_trades: 2,
            activity_window_days: 30,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
    Active,
    /// Within a warning threshold; carries days remaining until reassignment.
    WarnAt(u64),
    Redistributable,
}

impl RedistributionPolicy {
    /// Classify a token given its last ledger activity.
    pub fn status(&self, last_activity: u64, now: u64) -> TokenStatus {
        let idle_days = days_between(last_activity, now);
        if idle_days >= self.inactive_after_days {
            return TokenStatus::Redistributable;
        }
        let days_left = self.inactive_after_days - idle_days;
        match self.warn_level(days_left) {
            Some(_) => TokenStatus::WarnAt(days_left),
            None => TokenStatus::Active,
        }
    }

    /// The threshold a days-remaining value falls under: the smallest
    /// configured threshold ≥ `days_left`. Used as the dedup key so each
    /// crossing warns once.
    pub fn warn_level(&self, days_left: u64) -> Option<u64> {
        let mut thresholds: Vec<u64> = self.warn_at_days.clone();
        thresholds.sort_unstable();
        thresholds.into_iter().find(|t| *t >= days_left)
    }

    /// Unix seconds marking the start of the active-trader window.
    pub fn window_start(&self, now: u64) -> u64 {
        now.saturating_sub(self.activity_window_days * crate::time::SECS_PER_DAY)
    }

    /// Pick a redistribution recipient from the active-trader census.
    pub fn pick_recipient(&self, traders: &[String], rng: &mut impl Rng) -> String {
        if traders.is_empty() {
            return COMMUNITY_POOL.to_string();
        }
        traders[rng.random_range(0..traders.len())].clone()
    }
}
