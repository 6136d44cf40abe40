use std::sync::Arc;

use mystyle_core::config::{AppConfig, ConfigError, LoadOptions};
use mystyle_core::{Clock, Engine, EngineError, EngineStores, FetchError, SystemClock};
use mystyle_db::{
    connect_from_config, migrations, DbPool, SqlHistoryRepository, SqlItemRepository,
    SqlSignalCacheRepository,
};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;
use crate::fetchers::FetcherRegistry;
use crate::health::HealthState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<Engine>,
    pub fetchers: Arc<FetcherRegistry>,
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState { engine: self.engine.clone(), fetchers: self.fetchers.clone() }
    }

    pub fn health_state(&self) -> HealthState {
        HealthState { db_pool: self.db_pool.clone(), engine: self.engine.clone() }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("engine construction failed: {0}")]
    Engine(#[source] EngineError),
    #[error("signal fetchers could not be built: {0}")]
    Fetchers(#[source] FetchError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_from_config(&config.database)
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let engine = Engine::new(
        EngineStores {
            items: Arc::new(SqlItemRepository::new(db_pool.clone())),
            signals: Arc::new(SqlSignalCacheRepository::new(db_pool.clone())),
            history: Arc::new(SqlHistoryRepository::new(db_pool.clone())),
        },
        clock.clone(),
        &config,
    )
    .map_err(BootstrapError::Engine)?;
    let fetchers =
        FetcherRegistry::from_config(&config.signals, clock).map_err(BootstrapError::Fetchers)?;
    info!(
        event_name = "system.bootstrap.engine_ready",
        correlation_id = "bootstrap",
        fetchers = fetchers.keys().count(),
        "engine and signal fetchers initialized"
    );

    Ok(Application { config, db_pool, engine: Arc::new(engine), fetchers: Arc::new(fetchers) })
}
