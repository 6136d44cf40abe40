use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use mystyle_core::{Engine, SignalStatus};
use mystyle_db::DbPool;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub engine: Arc<Engine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub signals: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Readiness is decided by the database alone; signal sources have fallbacks
/// and only ever report `degraded`.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";
    let signals = signals_check(&state.engine).await;

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "mystyle-server runtime initialized".to_string(),
        },
        database,
        signals,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn signals_check(engine: &Engine) -> HealthCheck {
    let keys = engine.signal_cache().keys().cloned().collect::<Vec<_>>();
    let mut usable = 0;
    for key in &keys {
        let status = engine.get_cached_signal(key).await.status();
        if matches!(status, SignalStatus::Fresh | SignalStatus::Stale) {
            usable += 1;
        }
    }

    HealthCheck {
        status: if usable == keys.len() { "ready" } else { "degraded" },
        detail: format!("{usable}/{} signals have usable data", keys.len()),
    }
}
