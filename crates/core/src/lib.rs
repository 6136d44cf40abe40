pub mod clock;
pub mod config;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod locks;
pub mod popularity;
pub mod ports;
pub mod retry;
pub mod rules;
pub mod session;
pub mod signals;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::history::{HistoryRecord, TrailEntry, UserId};
pub use domain::item::{EventCounts, EventType, Item, ItemId};
pub use domain::signal::{CacheEntry, SignalKey, SignalStatus};
pub use domain::weather::WeatherReading;
pub use engine::{Engine, EngineStores, WeatherRecommendations};
pub use errors::{EngineError, InterfaceError};
pub use popularity::{PopularitySummary, RecordOutcome};
pub use ports::{
    FetchError, HistoryRepository, ItemRepository, PopularityUpdate, RepositoryError,
    SignalCacheRepository, SignalFetcher,
};
pub use rules::{Dimension, RelevanceWeights, RuleEngine, ScoredItem};
pub use session::MergeReport;
pub use signals::{RefreshReport, RefreshSource, SignalCache};
