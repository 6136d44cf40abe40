pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_from_config, connect_with_settings, DbPool};
pub use fixtures::{clear_catalog, demo_catalog, seed_demo_catalog, SeedResult};
pub use repositories::{
    db_error, InMemoryHistoryRepository, InMemoryItemRepository, InMemorySignalCacheRepository,
    SqlHistoryRepository, SqlItemRepository, SqlSignalCacheRepository,
};
