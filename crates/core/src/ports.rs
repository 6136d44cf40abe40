//! Persistence and fetcher boundaries consumed by the engine.
//!
//! Implementations live outside this crate: `mystyle-db` provides SQL and
//! in-memory repositories, `mystyle-server` provides the HTTP fetchers.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::domain::history::{HistoryRecord, UserId};
use crate::domain::item::{EventType, Item, ItemId};
use crate::domain::signal::{CacheEntry, SignalKey};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(String),
    #[error("decode error: {0}")]
    Decode(String),
    /// The store is locked by a concurrent writer; the operation may be retried.
    #[error("store busy: {0}")]
    Busy(String),
}

impl RepositoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

/// Result of one score recomputation, written back in a single step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PopularityUpdate {
    pub popularity_score: i64,
    /// Buckets dated before this day are removed from storage.
    pub retain_from: NaiveDate,
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError>;

    /// Every catalog item in catalog order, with event counts attached.
    async fn list(&self) -> Result<Vec<Item>, RepositoryError>;

    /// Inserts or replaces the catalog attributes of `item`. Event counts and
    /// the popularity score of an existing row are left untouched.
    async fn save(&self, item: Item) -> Result<(), RepositoryError>;

    /// Adds `amount` to one `(event_type, day)` bucket. Returns `false`
    /// without writing anything when the item does not exist.
    async fn apply_event(
        &self,
        id: &ItemId,
        event_type: EventType,
        day: NaiveDate,
        amount: i64,
    ) -> Result<bool, RepositoryError>;

    /// Prunes expired buckets and stores the derived score atomically.
    /// Returns `false` when the item does not exist.
    async fn update_popularity(
        &self,
        id: &ItemId,
        update: PopularityUpdate,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait SignalCacheRepository: Send + Sync {
    async fn load(&self, key: &SignalKey) -> Result<Option<CacheEntry>, RepositoryError>;

    /// Replaces the entry for `entry.key` as a whole (last write wins).
    async fn store(&self, entry: &CacheEntry) -> Result<(), RepositoryError>;

    async fn list(&self) -> Result<Vec<CacheEntry>, RepositoryError>;
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Writes `record` unless a record for the same user and item already
    /// carries an equal or newer `viewed_at`. Returns whether a write happened.
    async fn upsert_if_newer(&self, record: &HistoryRecord) -> Result<bool, RepositoryError>;

    /// History for `user_id`, newest first.
    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, RepositoryError>;
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode upstream payload: {0}")]
    Decode(String),
    #[error("fetch timed out after {0} seconds")]
    Timeout(u64),
    #[error("no upstream is configured for this signal")]
    NotConfigured,
}

/// Single-attempt retrieval of one external signal payload.
#[async_trait]
pub trait SignalFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Value, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::RepositoryError;

    #[test]
    fn only_busy_errors_are_retryable() {
        assert!(RepositoryError::Busy("database is locked".to_string()).is_retryable());
        assert!(!RepositoryError::Database("disk I/O error".to_string()).is_retryable());
        assert!(!RepositoryError::Decode("bad day".to_string()).is_retryable());
    }
}
