//! Windowed engagement scoring.
//!
//! The [`EventLedger`] appends engagement events to per-day buckets and the
//! [`ScoreAggregator`] reduces those buckets into `popularity_score`. The
//! reduction itself is the pure [`recompute`] function so that it can be
//! exercised without a store.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::local_date;
use crate::config::{AppConfig, ScoringConfig};
use crate::domain::item::{EventCounts, EventType, Item, ItemId};
use crate::errors::EngineError;

pub mod aggregator;
pub mod ledger;

pub use aggregator::{ItemLocks, ScoreAggregator};
pub use ledger::{EventLedger, RecordOutcome};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScoringPolicy {
    /// Calendar days counted toward the score, today included.
    pub window_days: u32,
    /// Buckets older than this many days are removed from storage.
    pub retention_days: u32,
    pub offset: FixedOffset,
    pub weights: BTreeMap<EventType, i64>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        let config = AppConfig::default().scoring;
        Self {
            window_days: config.window_days,
            retention_days: config.retention_days,
            offset: FixedOffset::east_opt(config.utc_offset_hours * 3600).unwrap_or(Utc.fix()),
            weights: config.weights,
        }
    }
}

impl ScoringPolicy {
    pub fn from_config(config: &ScoringConfig) -> Result<Self, EngineError> {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600).ok_or_else(|| {
            EngineError::ConfigurationMissing(format!(
                "scoring.utc_offset_hours `{}` is not a valid offset",
                config.utc_offset_hours
            ))
        })?;

        Ok(Self {
            window_days: config.window_days,
            retention_days: config.retention_days,
            offset,
            weights: config.weights.clone(),
        })
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        local_date(now, self.offset)
    }

    /// First day still kept in storage for `today`.
    pub fn retain_from(&self, today: NaiveDate) -> NaiveDate {
        today - chrono::Duration::days(i64::from(self.retention_days))
    }

    fn in_window(&self, today: NaiveDate, day: NaiveDate) -> bool {
        let age = (today - day).num_days();
        (0..i64::from(self.window_days)).contains(&age)
    }
}

/// Outcome of reducing one item's buckets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recomputation {
    pub popularity_score: i64,
    pub event_counts: EventCounts,
    pub retain_from: NaiveDate,
    pub pruned_buckets: usize,
    /// Event types that had activity in the window but no configured weight.
    pub unweighted: Vec<EventType>,
}

/// Per-type sums over the score window, clamped at zero.
pub fn window_totals(
    counts: &EventCounts,
    today: NaiveDate,
    policy: &ScoringPolicy,
) -> BTreeMap<EventType, i64> {
    EventType::ALL
        .into_iter()
        .map(|event_type| {
            let total = counts
                .days(event_type)
                .filter(|(day, _)| policy.in_window(today, *day))
                .fold(0_i64, |sum, (_, count)| sum.saturating_add(count));
            (event_type, total.max(0))
        })
        .collect()
}

pub fn recompute(counts: &EventCounts, today: NaiveDate, policy: &ScoringPolicy) -> Recomputation {
    let retain_from = policy.retain_from(today);
    let mut event_counts = counts.clone();
    let pruned_buckets = event_counts.retain(|_, day| day >= retain_from);

    let mut unweighted = Vec::new();
    let mut popularity_score = 0_i64;
    for (event_type, total) in window_totals(&event_counts, today, policy) {
        match policy.weights.get(&event_type) {
            Some(weight) => {
                popularity_score = popularity_score.saturating_add(total.saturating_mul(*weight));
            }
            None if total > 0 => unweighted.push(event_type),
            None => {}
        }
    }

    Recomputation { popularity_score, event_counts, retain_from, pruned_buckets, unweighted }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularitySummary {
    pub item_id: ItemId,
    pub score: i64,
    pub views: i64,
    pub clicks: i64,
    pub saves: i64,
}

impl PopularitySummary {
    pub fn zero(item_id: ItemId) -> Self {
        Self { item_id, score: 0, views: 0, clicks: 0, saves: 0 }
    }
}

/// Display summary computed from the item's buckets as of `today`.
pub fn summarize(item: &Item, today: NaiveDate, policy: &ScoringPolicy) -> PopularitySummary {
    let totals = window_totals(&item.event_counts, today, policy);
    let total = |event_type: EventType| totals.get(&event_type).copied().unwrap_or(0);

    PopularitySummary {
        item_id: item.id.clone(),
        score: recompute(&item.event_counts, today, policy).popularity_score,
        views: total(EventType::View),
        clicks: total(EventType::Click),
        saves: total(EventType::Save),
    }
}
