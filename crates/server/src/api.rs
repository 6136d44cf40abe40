//! JSON API over the engine.
//!
//! - `POST /api/v1/items/{item_id}/events`: record a view / click / save (or undo)
//! - `GET  /api/v1/items/{item_id}/popularity`: window totals and score
//! - `GET  /api/v1/signals`: every cached signal
//! - `GET  /api/v1/signals/{key}`: one cached signal, never blocks on upstream
//! - `POST /api/v1/signals/{key}/refresh?force=bool`: run one refresh now
//! - `GET  /api/v1/recommendations/weather?limit=N`: weather-driven item ranking
//! - `POST /api/v1/users/{user_id}/trail`: merge an anonymous trail into history
//! - `POST /api/v1/users/{user_id}/views`: record an authenticated view
//! - `GET  /api/v1/users/{user_id}/history?limit=N`: recent history, newest first

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use mystyle_core::{
    CacheEntry, Engine, EngineError, EventType, HistoryRecord, InterfaceError, ItemId,
    MergeReport, PopularitySummary, RecordOutcome, RefreshReport, SignalKey, SignalStatus,
    TrailEntry, UserId, WeatherRecommendations,
};

use crate::fetchers::FetcherRegistry;

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<Engine>,
    pub fetchers: Arc<FetcherRegistry>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub event_type: String,
    #[serde(default = "default_amount")]
    pub amount: i64,
}

fn default_amount() -> i64 {
    1
}

#[derive(Debug, Serialize)]
pub struct SignalResponse {
    #[serde(flatten)]
    pub entry: CacheEntry,
    pub status: SignalStatus,
}

impl From<CacheEntry> for SignalResponse {
    fn from(entry: CacheEntry) -> Self {
        let status = entry.status();
        Self { entry, status }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct TrailRequest {
    pub entries: Vec<TrailEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    pub item_id: String,
    pub viewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ViewResponse {
    pub written: bool,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/items/{item_id}/events", post(record_event))
        .route("/api/v1/items/{item_id}/popularity", get(popularity_summary))
        .route("/api/v1/signals", get(list_signals))
        .route("/api/v1/signals/{key}", get(get_signal))
        .route("/api/v1/signals/{key}/refresh", post(refresh_signal))
        .route("/api/v1/recommendations/weather", get(weather_recommendations))
        .route("/api/v1/users/{user_id}/trail", post(merge_trail))
        .route("/api/v1/users/{user_id}/views", post(record_view))
        .route("/api/v1/users/{user_id}/history", get(recent_history))
        .with_state(state)
}

fn correlation_id() -> String {
    Uuid::new_v4().to_string()
}

fn interface_error(err: InterfaceError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(
            event_name = "api.request.failed",
            correlation_id = %err.correlation_id(),
            error = %err,
            "request failed"
        );
    } else {
        warn!(
            event_name = "api.request.rejected",
            correlation_id = %err.correlation_id(),
            error = %err,
            "request rejected"
        );
    }
    (
        status,
        Json(ApiError {
            error: err.user_message(),
            correlation_id: err.correlation_id().to_string(),
        }),
    )
}

fn engine_error(err: EngineError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    interface_error(err.into_interface(correlation_id))
}

fn unknown_signal(key: &SignalKey, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    engine_error(EngineError::NotFound { kind: "signal", id: key.to_string() }, correlation_id)
}

async fn record_event(
    Path(item_id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<EventRequest>,
) -> ApiResult<RecordOutcome> {
    let correlation_id = correlation_id();
    let event_type =
        EventType::from_str(&body.event_type).map_err(|e| engine_error(e, &correlation_id))?;

    let outcome = state
        .engine
        .record_event(&ItemId(item_id), event_type, body.amount)
        .await
        .map_err(|e| engine_error(e, &correlation_id))?;

    info!(
        event_name = "api.event.recorded",
        correlation_id = %correlation_id,
        item_id = %outcome.item_id,
        event_type = %outcome.event_type,
        amount = outcome.amount,
        "engagement event recorded"
    );
    Ok(Json(outcome))
}

async fn popularity_summary(
    Path(item_id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<PopularitySummary> {
    let correlation_id = correlation_id();
    state
        .engine
        .get_popularity_summary(&ItemId(item_id))
        .await
        .map(Json)
        .map_err(|e| engine_error(e, &correlation_id))
}

async fn list_signals(State(state): State<ApiState>) -> Json<Vec<SignalResponse>> {
    let entries = state.engine.list_cached_signals().await;
    Json(entries.into_iter().map(SignalResponse::from).collect())
}

async fn get_signal(
    Path(key): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<SignalResponse> {
    let key = SignalKey::new(key);
    if state.engine.signal_cache().policy(&key).is_none() {
        return Err(unknown_signal(&key, &correlation_id()));
    }
    Ok(Json(state.engine.get_cached_signal(&key).await.into()))
}

async fn refresh_signal(
    Path(key): Path<String>,
    State(state): State<ApiState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<RefreshReport> {
    let correlation_id = correlation_id();
    let key = SignalKey::new(key);
    let Some(fetcher) = state.fetchers.get(&key) else {
        return Err(unknown_signal(&key, &correlation_id));
    };

    let report = state
        .engine
        .refresh_signal(&key, fetcher.as_ref(), query.force)
        .await
        .map_err(|e| engine_error(e, &correlation_id))?;

    info!(
        event_name = "api.signal.refreshed",
        correlation_id = %correlation_id,
        signal_key = %key,
        force = query.force,
        status = report.entry.status().as_str(),
        "signal refresh requested"
    );
    Ok(Json(report))
}

async fn weather_recommendations(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> Json<WeatherRecommendations> {
    Json(state.engine.get_weather_recommendations(query.limit).await)
}

async fn merge_trail(
    Path(user_id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<TrailRequest>,
) -> ApiResult<MergeReport> {
    let correlation_id = correlation_id();
    state
        .engine
        .migrate_anonymous_trail(body.entries, &UserId(user_id))
        .await
        .map(Json)
        .map_err(|e| engine_error(e, &correlation_id))
}

async fn record_view(
    Path(user_id): Path<String>,
    State(state): State<ApiState>,
    Json(body): Json<ViewRequest>,
) -> ApiResult<ViewResponse> {
    let correlation_id = correlation_id();
    let written = state
        .engine
        .record_authenticated_view(&UserId(user_id), &ItemId(body.item_id), body.viewed_at)
        .await
        .map_err(|e| engine_error(e, &correlation_id))?;
    Ok(Json(ViewResponse { written }))
}

async fn recent_history(
    Path(user_id): Path<String>,
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<HistoryRecord>> {
    let correlation_id = correlation_id();
    state
        .engine
        .recent_history(&UserId(user_id), query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .await
        .map(Json)
        .map_err(|e| engine_error(e, &correlation_id))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::Json;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Value};

    use mystyle_core::config::AppConfig;
    use mystyle_core::{
        Engine, EngineStores, FetchError, FixedClock, ItemRepository, SignalFetcher, SignalKey,
        SignalStatus, TrailEntry,
    };
    use mystyle_db::{
        demo_catalog, InMemoryHistoryRepository, InMemoryItemRepository,
        InMemorySignalCacheRepository,
    };

    use super::*;
    use crate::fetchers::FetcherRegistry;

    struct StaticFetcher(Value);

    #[async_trait]
    impl SignalFetcher for StaticFetcher {
        async fn fetch(&self) -> Result<Value, FetchError> {
            Ok(self.0.clone())
        }
    }

    async fn state() -> State<ApiState> {
        let items = Arc::new(InMemoryItemRepository::default());
        for item in demo_catalog() {
            items.save(item).await.expect("seed");
        }
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).single().expect("valid time");
        let engine = Engine::new(
            EngineStores {
                items,
                signals: Arc::new(InMemorySignalCacheRepository::default()),
                history: Arc::new(InMemoryHistoryRepository::default()),
            },
            Arc::new(FixedClock::new(now)),
            &AppConfig::default(),
        )
        .expect("engine");

        let mut fetchers = FetcherRegistry::default();
        fetchers.insert(
            SignalKey::weather(),
            Arc::new(StaticFetcher(json!({"precip_prob_max": 90, "today_max": 10}))),
        );
        State(ApiState { engine: Arc::new(engine), fetchers: Arc::new(fetchers) })
    }

    #[tokio::test]
    async fn recording_an_event_returns_the_new_score() {
        let state = state().await;

        let Json(outcome) = record_event(
            Path("basic-rain-coat".to_string()),
            state.clone(),
            Json(EventRequest { event_type: "saves".to_string(), amount: 1 }),
        )
        .await
        .expect("record");

        assert_eq!(outcome.popularity_score, Some(7));
        let Json(summary) = popularity_summary(Path("basic-rain-coat".to_string()), state)
            .await
            .expect("summary");
        assert_eq!(summary.saves, 1);
    }

    #[tokio::test]
    async fn unknown_event_type_is_a_bad_request() {
        let result = record_event(
            Path("basic-rain-coat".to_string()),
            state().await,
            Json(EventRequest { event_type: "purchase".to_string(), amount: 1 }),
        )
        .await;

        let (status, Json(body)) = result.expect_err("should reject");
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn events_for_unknown_items_are_not_found() {
        let result = record_event(
            Path("missing".to_string()),
            state().await,
            Json(EventRequest { event_type: "view".to_string(), amount: 1 }),
        )
        .await;

        let (status, _) = result.expect_err("should reject");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unpopulated_signal_reads_never_fail() {
        let Json(signal) =
            get_signal(Path("wiki".to_string()), state().await).await.expect("signal");

        assert_eq!(signal.status, SignalStatus::Unpopulated);
        assert!(signal.entry.payload.is_none());
    }

    #[tokio::test]
    async fn unknown_signal_key_is_not_found() {
        let result = get_signal(Path("stocks".to_string()), state().await).await;

        let (status, _) = result.expect_err("should reject");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn refresh_then_recommend_uses_the_weather_payload() {
        let state = state().await;

        let Json(report) = refresh_signal(
            Path("weather".to_string()),
            state.clone(),
            Query(RefreshQuery { force: true }),
        )
        .await
        .expect("refresh");
        let Json(recommendations) =
            weather_recommendations(state, Query(LimitQuery { limit: Some(2) })).await;

        assert_eq!(report.entry.status(), SignalStatus::Fresh);
        assert_eq!(recommendations.items.len(), 2);
        assert_eq!(recommendations.items[0].item.id.0, "basic-rain-coat");
    }

    #[tokio::test]
    async fn refresh_without_fetcher_is_not_found() {
        let result = refresh_signal(
            Path("trends".to_string()),
            state().await,
            Query(RefreshQuery::default()),
        )
        .await;

        let (status, _) = result.expect_err("should reject");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn trail_merge_is_idempotent_over_http() {
        let state = state().await;
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).single().expect("valid time");
        let entries = vec![
            TrailEntry::new("rock-blouson", at),
            TrailEntry::new("rock-blouson", at + Duration::minutes(5)),
            TrailEntry::new("y2k-crop-top", at + Duration::minutes(9)),
        ];

        let Json(first) = merge_trail(
            Path("u-1".to_string()),
            state.clone(),
            Json(TrailRequest { entries: entries.clone() }),
        )
        .await
        .expect("merge");
        let Json(replay) =
            merge_trail(Path("u-1".to_string()), state.clone(), Json(TrailRequest { entries }))
                .await
                .expect("replay");
        let Json(history) =
            recent_history(Path("u-1".to_string()), state, Query(LimitQuery::default()))
                .await
                .expect("history");

        assert_eq!(first.written, 2);
        assert_eq!(replay.skipped, 2);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn empty_user_id_is_a_bad_request() {
        let result = record_view(
            Path(" ".to_string()),
            state().await,
            Json(ViewRequest { item_id: "rock-blouson".to_string(), viewed_at: None }),
        )
        .await;

        let (status, _) = result.expect_err("should reject");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
