use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::domain::item::ItemId;
use crate::errors::EngineError;
use crate::locks::KeyedLocks;
use crate::popularity::{recompute, Recomputation, ScoringPolicy};
use crate::ports::{ItemRepository, PopularityUpdate};
use crate::retry::RetryPolicy;

/// Per-item async locks serializing read-modify-write cycles on one item.
pub type ItemLocks = KeyedLocks<ItemId>;

pub struct ScoreAggregator {
    items: Arc<dyn ItemRepository>,
    clock: Arc<dyn Clock>,
    policy: ScoringPolicy,
    locks: Arc<ItemLocks>,
    retry: RetryPolicy,
}

impl ScoreAggregator {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        clock: Arc<dyn Clock>,
        policy: ScoringPolicy,
        locks: Arc<ItemLocks>,
    ) -> Self {
        Self { items, clock, policy, locks, retry: RetryPolicy::default() }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Recomputes and stores the score of `id`. A missing item yields `Ok(None)`.
    pub async fn recompute(&self, id: &ItemId) -> Result<Option<Recomputation>, EngineError> {
        let _guard = self.locks.acquire(id).await;
        self.recompute_locked(id).await
    }

    /// Same as [`Self::recompute`] for callers that already hold the item lock.
    pub(crate) async fn recompute_locked(
        &self,
        id: &ItemId,
    ) -> Result<Option<Recomputation>, EngineError> {
        let subject = id.to_string();
        let Some(item) = self.retry.run(&subject, || self.items.find_by_id(id)).await? else {
            debug!(
                event_name = "popularity.recompute.skipped",
                item_id = %id,
                "item no longer exists, nothing to recompute"
            );
            return Ok(None);
        };

        let today = self.policy.today(self.clock.now());
        let result = recompute(&item.event_counts, today, &self.policy);

        for event_type in &result.unweighted {
            warn!(
                event_name = "popularity.weight.missing",
                item_id = %id,
                event_type = %event_type,
                error = %EngineError::ConfigurationMissing(format!("scoring weight for `{event_type}`")),
                "event type has no configured weight and contributes nothing"
            );
        }

        let update = PopularityUpdate {
            popularity_score: result.popularity_score,
            retain_from: result.retain_from,
        };
        let stored = self
            .retry
            .run(&subject, || self.items.update_popularity(id, update.clone()))
            .await?;
        if !stored {
            debug!(
                event_name = "popularity.recompute.skipped",
                item_id = %id,
                "item removed during recomputation"
            );
            return Ok(None);
        }

        info!(
            event_name = "popularity.recompute.completed",
            item_id = %id,
            popularity_score = result.popularity_score,
            pruned_buckets = result.pruned_buckets,
            "popularity score recomputed"
        );
        Ok(Some(result))
    }
}
