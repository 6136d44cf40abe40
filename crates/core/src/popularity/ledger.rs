use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::clock::Clock;
use crate::domain::item::{EventType, ItemId};
use crate::errors::EngineError;
use crate::popularity::aggregator::{ItemLocks, ScoreAggregator};
use crate::ports::ItemRepository;
use crate::retry::RetryPolicy;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub item_id: ItemId,
    pub event_type: EventType,
    pub day: NaiveDate,
    pub amount: i64,
    /// `None` when the event was stored but the follow-up recomputation failed.
    pub popularity_score: Option<i64>,
}

/// Appends engagement events to an item's per-day buckets.
///
/// Each successful `record` recomputes the item's score before returning,
/// under the same per-item lock, so concurrent events on one item never
/// interleave their read-modify-write cycles.
pub struct EventLedger {
    items: Arc<dyn ItemRepository>,
    clock: Arc<dyn Clock>,
    aggregator: Arc<ScoreAggregator>,
    locks: Arc<ItemLocks>,
    retry: RetryPolicy,
}

impl EventLedger {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        clock: Arc<dyn Clock>,
        aggregator: Arc<ScoreAggregator>,
        locks: Arc<ItemLocks>,
    ) -> Self {
        Self { items, clock, aggregator, locks, retry: RetryPolicy::default() }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn record(
        &self,
        item_id: &ItemId,
        event_type: EventType,
        amount: i64,
    ) -> Result<RecordOutcome, EngineError> {
        if item_id.0.trim().is_empty() {
            return Err(EngineError::MalformedInput("item id must not be empty".to_string()));
        }
        if amount == 0 {
            return Err(EngineError::MalformedInput("event amount must not be zero".to_string()));
        }

        let _guard = self.locks.acquire(item_id).await;
        let day = self.aggregator.policy().today(self.clock.now());

        let applied = self
            .retry
            .run(&item_id.0, || self.items.apply_event(item_id, event_type, day, amount))
            .await?;
        if !applied {
            return Err(EngineError::item_not_found(item_id.to_string()));
        }

        info!(
            event_name = "popularity.event.recorded",
            item_id = %item_id,
            event_type = %event_type,
            day = %day,
            amount,
            "engagement event recorded"
        );

        let popularity_score = match self.aggregator.recompute_locked(item_id).await {
            Ok(result) => result.map(|result| result.popularity_score),
            Err(err) => {
                error!(
                    event_name = "popularity.recompute.failed",
                    item_id = %item_id,
                    error = %err,
                    "event stored but score recomputation failed"
                );
                None
            }
        };

        Ok(RecordOutcome { item_id: item_id.clone(), event_type, day, amount, popularity_score })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::EventLedger;
    use crate::clock::FixedClock;
    use crate::domain::item::{EventType, Item, ItemId};
    use crate::errors::EngineError;
    use crate::popularity::{ItemLocks, ScoreAggregator, ScoringPolicy};
    use crate::ports::ItemRepository;
    use crate::test_support::MemoryItems;

    fn ledger(items: Arc<MemoryItems>, clock: FixedClock) -> EventLedger {
        let clock = Arc::new(clock);
        let locks = Arc::new(ItemLocks::default());
        let aggregator = Arc::new(ScoreAggregator::new(
            items.clone(),
            clock.clone(),
            ScoringPolicy::default(),
            locks.clone(),
        ));
        EventLedger::new(items, clock, aggregator, locks)
    }

    fn item_id(id: &str) -> ItemId {
        ItemId(id.to_string())
    }

    #[tokio::test]
    async fn view_view_click_save_scores_twelve() {
        let start = Utc.with_ymd_and_hms(2026, 3, 18, 3, 0, 0).single().expect("valid time");
        let clock = FixedClock::new(start);
        let items = Arc::new(MemoryItems::with(vec![Item::new("x", "Item X")]));
        let ledger = ledger(items.clone(), clock.clone());

        ledger.record(&item_id("x"), EventType::View, 1).await.expect("view");
        clock.advance(Duration::days(1));
        ledger.record(&item_id("x"), EventType::View, 1).await.expect("view");
        ledger.record(&item_id("x"), EventType::Click, 1).await.expect("click");
        clock.advance(Duration::days(1));
        let outcome = ledger.record(&item_id("x"), EventType::Save, 1).await.expect("save");

        assert_eq!(outcome.popularity_score, Some(12));
        let stored = items.find_by_id(&item_id("x")).await.expect("find").expect("exists");
        assert_eq!(stored.popularity_score, 12);
    }

    #[tokio::test]
    async fn undo_may_leave_a_negative_bucket_without_failing() {
        let now = Utc.with_ymd_and_hms(2026, 3, 18, 3, 0, 0).single().expect("valid time");
        let items = Arc::new(MemoryItems::with(vec![Item::new("x", "Item X")]));
        let ledger = ledger(items.clone(), FixedClock::new(now));

        let outcome = ledger.record(&item_id("x"), EventType::Save, -1).await.expect("undo");

        assert_eq!(outcome.popularity_score, Some(0));
        let stored = items.find_by_id(&item_id("x")).await.expect("find").expect("exists");
        assert_eq!(stored.event_counts.get(EventType::Save, outcome.day), Some(-1));
    }

    #[tokio::test]
    async fn unknown_item_is_not_found_and_creates_nothing() {
        let now = Utc.with_ymd_and_hms(2026, 3, 18, 3, 0, 0).single().expect("valid time");
        let items = Arc::new(MemoryItems::default());
        let ledger = ledger(items.clone(), FixedClock::new(now));

        let result = ledger.record(&item_id("ghost"), EventType::View, 1).await;

        assert!(matches!(result, Err(EngineError::NotFound { kind: "item", .. })));
        assert!(items.find_by_id(&item_id("ghost")).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn rejected_unknown_ids_do_not_accumulate_locks() {
        let now = Utc.with_ymd_and_hms(2026, 3, 18, 3, 0, 0).single().expect("valid time");
        let items = Arc::new(MemoryItems::default());
        let clock = Arc::new(FixedClock::new(now));
        let locks = Arc::new(ItemLocks::default());
        let aggregator = Arc::new(ScoreAggregator::new(
            items.clone(),
            clock.clone(),
            ScoringPolicy::default(),
            locks.clone(),
        ));
        let ledger = EventLedger::new(items, clock, aggregator, locks.clone());

        for n in 0..500 {
            let result = ledger.record(&item_id(&format!("ghost-{n}")), EventType::Click, 1).await;
            assert!(result.is_err());
        }

        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn concurrent_records_on_one_item_are_not_lost() {
        let now = Utc.with_ymd_and_hms(2026, 3, 18, 3, 0, 0).single().expect("valid time");
        let items = Arc::new(MemoryItems::with(vec![Item::new("x", "Item X")]));
        let ledger = Arc::new(ledger(items.clone(), FixedClock::new(now)));

        let tasks = (0..20)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.record(&item_id("x"), EventType::Click, 1).await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.expect("join").expect("record");
        }

        let stored = items.find_by_id(&item_id("x")).await.expect("find").expect("exists");
        assert_eq!(stored.popularity_score, 60);
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let now = Utc.with_ymd_and_hms(2026, 3, 18, 3, 0, 0).single().expect("valid time");
        let items = Arc::new(MemoryItems::with(vec![Item::new("x", "Item X")]));
        let ledger = ledger(items, FixedClock::new(now));

        let result = ledger.record(&item_id("x"), EventType::View, 0).await;

        assert!(matches!(result, Err(EngineError::MalformedInput(_))));
    }
}
