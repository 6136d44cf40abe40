//! Request-facing facade over the ledger, signal cache, rule engine, and
//! session merge.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::domain::history::{HistoryRecord, TrailEntry, UserId};
use crate::domain::item::{EventType, Item, ItemId};
use crate::domain::signal::{CacheEntry, SignalKey, SignalStatus};
use crate::domain::weather::WeatherReading;
use crate::errors::EngineError;
use crate::popularity::{
    summarize, EventLedger, ItemLocks, PopularitySummary, Recomputation, RecordOutcome,
    ScoreAggregator, ScoringPolicy,
};
use crate::ports::{HistoryRepository, ItemRepository, SignalCacheRepository, SignalFetcher};
use crate::rules::{RelevanceWeights, RuleEngine, ScoredItem};
use crate::session::{MergeReport, SessionMerge};
use crate::signals::{RefreshReport, SignalCache};

/// Stores the engine runs on.
#[derive(Clone)]
pub struct EngineStores {
    pub items: Arc<dyn ItemRepository>,
    pub signals: Arc<dyn SignalCacheRepository>,
    pub history: Arc<dyn HistoryRepository>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecommendations {
    pub explanations: Vec<String>,
    pub weights: RelevanceWeights,
    pub items: Vec<ScoredItem>,
    pub signal_status: SignalStatus,
}

pub struct Engine {
    items: Arc<dyn ItemRepository>,
    clock: Arc<dyn Clock>,
    ledger: EventLedger,
    aggregator: Arc<ScoreAggregator>,
    signals: SignalCache,
    rules: RuleEngine,
    session: SessionMerge,
    default_limit: usize,
}

impl Engine {
    pub fn new(
        stores: EngineStores,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Result<Self, EngineError> {
        let policy = ScoringPolicy::from_config(&config.scoring)?;
        let locks = Arc::new(ItemLocks::default());
        let aggregator = Arc::new(ScoreAggregator::new(
            stores.items.clone(),
            clock.clone(),
            policy,
            locks.clone(),
        ));
        let ledger =
            EventLedger::new(stores.items.clone(), clock.clone(), aggregator.clone(), locks);

        Ok(Self {
            items: stores.items,
            ledger,
            aggregator,
            signals: SignalCache::from_config(stores.signals, clock.clone(), &config.signals),
            rules: RuleEngine::from_config(&config.recommendations),
            session: SessionMerge::new(stores.history, config.session.trail_limit),
            default_limit: config.recommendations.default_limit,
            clock,
        })
    }

    pub fn signal_cache(&self) -> &SignalCache {
        &self.signals
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn record_event(
        &self,
        item_id: &ItemId,
        event_type: EventType,
        amount: i64,
    ) -> Result<RecordOutcome, EngineError> {
        self.ledger.record(item_id, event_type, amount).await
    }

    pub async fn recompute_popularity(
        &self,
        item_id: &ItemId,
    ) -> Result<Option<Recomputation>, EngineError> {
        self.aggregator.recompute(item_id).await
    }

    /// Window totals and score for display. A store failure degrades to a
    /// zero summary; only a missing item is reported.
    pub async fn get_popularity_summary(
        &self,
        item_id: &ItemId,
    ) -> Result<PopularitySummary, EngineError> {
        match self.items.find_by_id(item_id).await {
            Ok(Some(item)) => {
                let policy = self.aggregator.policy();
                Ok(summarize(&item, policy.today(self.clock.now()), policy))
            }
            Ok(None) => Err(EngineError::item_not_found(item_id.to_string())),
            Err(err) => {
                error!(
                    event_name = "popularity.summary.degraded",
                    item_id = %item_id,
                    error = %err,
                    "could not load item, reporting zero popularity"
                );
                Ok(PopularitySummary::zero(item_id.clone()))
            }
        }
    }

    pub async fn get_cached_signal(&self, key: &SignalKey) -> CacheEntry {
        self.signals.get(key).await
    }

    pub async fn list_cached_signals(&self) -> Vec<CacheEntry> {
        self.signals.list().await
    }

    pub async fn refresh_signal(
        &self,
        key: &SignalKey,
        fetcher: &dyn SignalFetcher,
        force: bool,
    ) -> Result<RefreshReport, EngineError> {
        self.signals.refresh(key, fetcher, force).await
    }

    /// Catalog items matching the current weather, best first. Missing or
    /// failed weather data yields an empty list, never an error.
    pub async fn get_weather_recommendations(&self, limit: Option<usize>) -> WeatherRecommendations {
        let limit = limit.unwrap_or(self.default_limit);
        let weather = self.signals.get(&SignalKey::weather()).await;
        let signal_status = weather.status();

        let reading = match (&weather.payload, weather.ok) {
            (Some(payload), true) => WeatherReading::from_payload(payload),
            _ => WeatherReading::default(),
        };
        let evaluation = self.rules.evaluate_weather(&reading);

        let items = if evaluation.weights.has_positive() {
            match self.candidates().await {
                Some(candidates) => self.rules.rank_items(candidates, &evaluation.weights, limit),
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        info!(
            event_name = "recommendations.weather.served",
            signal_status = signal_status.as_str(),
            fired_rules = evaluation.explanations.len(),
            items = items.len(),
            "weather recommendations computed"
        );

        WeatherRecommendations {
            explanations: evaluation.explanations,
            weights: evaluation.weights,
            items,
            signal_status,
        }
    }

    pub async fn migrate_anonymous_trail(
        &self,
        trail: Vec<TrailEntry>,
        user_id: &UserId,
    ) -> Result<MergeReport, EngineError> {
        self.session.migrate(trail, user_id).await
    }

    pub async fn record_authenticated_view(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        viewed_at: Option<DateTime<Utc>>,
    ) -> Result<bool, EngineError> {
        let viewed_at = viewed_at.unwrap_or_else(|| self.clock.now());
        self.session.record_view(user_id, item_id, viewed_at).await
    }

    pub async fn recent_history(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, EngineError> {
        self.session.recent_history(user_id, limit).await
    }

    /// Catalog ordered by popularity, highest first, stable on catalog order.
    async fn candidates(&self) -> Option<Vec<Item>> {
        match self.items.list().await {
            Ok(mut items) => {
                items.sort_by(|a, b| b.popularity_score.cmp(&a.popularity_score));
                Some(items)
            }
            Err(err) => {
                error!(
                    event_name = "recommendations.catalog.unavailable",
                    error = %err,
                    "could not list catalog, serving no recommendations"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{Engine, EngineStores};
    use crate::clock::FixedClock;
    use crate::config::AppConfig;
    use crate::domain::item::{EventType, Item, ItemId};
    use crate::domain::signal::{SignalKey, SignalStatus};
    use crate::errors::EngineError;
    use crate::test_support::{MemoryHistory, MemoryItems, MemorySignalCache, ScriptedFetcher};

    fn engine(items: Vec<Item>) -> Engine {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).single().expect("valid time");
        Engine::new(
            EngineStores {
                items: Arc::new(MemoryItems::with(items)),
                signals: Arc::new(MemorySignalCache::default()),
                history: Arc::new(MemoryHistory::default()),
            },
            Arc::new(FixedClock::new(now)),
            &AppConfig::default(),
        )
        .expect("engine")
    }

    fn catalog() -> Vec<Item> {
        let mut popular_coat = Item::new("coat-2", "ウール コート");
        popular_coat.popularity_score = 50;
        vec![
            Item::new("sandal", "サンダル"),
            Item::new("coat-1", "チェスター コート"),
            popular_coat,
            Item::new("rain", "防水 ジャケット"),
        ]
    }

    #[tokio::test]
    async fn recommendations_are_empty_without_weather() {
        let engine = engine(catalog());

        let recommendations = engine.get_weather_recommendations(None).await;

        assert!(recommendations.items.is_empty());
        assert!(recommendations.explanations.is_empty());
        assert_eq!(recommendations.signal_status, SignalStatus::Unpopulated);
    }

    #[tokio::test]
    async fn recommendations_rank_by_score_then_popularity() {
        let engine = engine(catalog());
        let fetcher = ScriptedFetcher::new(vec![Ok(json!({
            "precip_prob_max": 60,
            "today_max": 8,
            "wind_max": 10
        }))]);
        engine.refresh_signal(&SignalKey::weather(), &fetcher, false).await.expect("refresh");

        let recommendations = engine.get_weather_recommendations(Some(10)).await;
        let ids =
            recommendations.items.iter().map(|scored| scored.item.id.0.as_str()).collect::<Vec<_>>();

        assert_eq!(ids, vec!["rain", "coat-2", "coat-1"]);
        assert_eq!(recommendations.explanations.len(), 3);
        assert_eq!(recommendations.signal_status, SignalStatus::Fresh);
    }

    #[tokio::test]
    async fn recording_events_updates_summary() {
        let engine = engine(catalog());
        let id = ItemId("sandal".to_string());

        engine.record_event(&id, EventType::View, 1).await.expect("view");
        engine.record_event(&id, EventType::Save, 1).await.expect("save");
        let summary = engine.get_popularity_summary(&id).await.expect("summary");

        assert_eq!(summary.score, 8);
        assert_eq!((summary.views, summary.clicks, summary.saves), (1, 0, 1));
    }

    #[tokio::test]
    async fn summary_of_unknown_item_is_not_found() {
        let engine = engine(catalog());

        let result = engine.get_popularity_summary(&ItemId("missing".to_string())).await;

        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }
}
