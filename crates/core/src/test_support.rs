//! Store and fetcher doubles shared by the unit tests of this crate.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::domain::history::{HistoryRecord, UserId};
use crate::domain::item::{EventType, Item, ItemId};
use crate::domain::signal::{CacheEntry, SignalKey};
use crate::ports::{
    FetchError, HistoryRepository, ItemRepository, PopularityUpdate, RepositoryError,
    SignalCacheRepository, SignalFetcher,
};

#[derive(Default)]
pub struct MemoryItems {
    items: RwLock<Vec<Item>>,
}

impl MemoryItems {
    pub fn with(items: Vec<Item>) -> Self {
        Self { items: RwLock::new(items) }
    }
}

#[async_trait]
impl ItemRepository for MemoryItems {
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError> {
        Ok(self.items.read().await.iter().find(|item| &item.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Item>, RepositoryError> {
        Ok(self.items.read().await.clone())
    }

    async fn save(&self, item: Item) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
        Ok(())
    }

    async fn apply_event(
        &self,
        id: &ItemId,
        event_type: EventType,
        day: NaiveDate,
        amount: i64,
    ) -> Result<bool, RepositoryError> {
        let mut items = self.items.write().await;
        let Some(item) = items.iter_mut().find(|item| &item.id == id) else {
            return Ok(false);
        };
        item.event_counts.add(event_type, day, amount);
        Ok(true)
    }

    async fn update_popularity(
        &self,
        id: &ItemId,
        update: PopularityUpdate,
    ) -> Result<bool, RepositoryError> {
        let mut items = self.items.write().await;
        let Some(item) = items.iter_mut().find(|item| &item.id == id) else {
            return Ok(false);
        };
        item.event_counts.retain(|_, day| day >= update.retain_from);
        item.popularity_score = update.popularity_score;
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemorySignalCache {
    entries: RwLock<BTreeMap<SignalKey, CacheEntry>>,
}

#[async_trait]
impl SignalCacheRepository for MemorySignalCache {
    async fn load(&self, key: &SignalKey) -> Result<Option<CacheEntry>, RepositoryError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), RepositoryError> {
        self.entries.write().await.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CacheEntry>, RepositoryError> {
        Ok(self.entries.read().await.values().cloned().collect())
    }
}

/// Signal store whose next `load` calls fail with queued errors.
#[derive(Default)]
pub struct FlakySignalCache {
    inner: MemorySignalCache,
    load_failures: Mutex<VecDeque<RepositoryError>>,
}

impl FlakySignalCache {
    pub fn fail_loads(&self, errors: Vec<RepositoryError>) {
        match self.load_failures.lock() {
            Ok(mut failures) => failures.extend(errors),
            Err(poisoned) => poisoned.into_inner().extend(errors),
        }
    }
}

#[async_trait]
impl SignalCacheRepository for FlakySignalCache {
    async fn load(&self, key: &SignalKey) -> Result<Option<CacheEntry>, RepositoryError> {
        let failure = match self.load_failures.lock() {
            Ok(mut failures) => failures.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        match failure {
            Some(error) => Err(error),
            None => self.inner.load(key).await,
        }
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), RepositoryError> {
        self.inner.store(entry).await
    }

    async fn list(&self) -> Result<Vec<CacheEntry>, RepositoryError> {
        self.inner.list().await
    }
}

#[derive(Default)]
pub struct MemoryHistory {
    records: RwLock<BTreeMap<(UserId, ItemId), HistoryRecord>>,
}

impl MemoryHistory {
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl HistoryRepository for MemoryHistory {
    async fn upsert_if_newer(&self, record: &HistoryRecord) -> Result<bool, RepositoryError> {
        let mut records = self.records.write().await;
        let key = (record.user_id.clone(), record.item_id.clone());
        if records.get(&key).is_some_and(|existing| existing.viewed_at >= record.viewed_at) {
            return Ok(false);
        }
        records.insert(key, record.clone());
        Ok(true)
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, RepositoryError> {
        let mut records = self
            .records
            .read()
            .await
            .values()
            .filter(|record| &record.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        records.sort_by(|a, b| b.viewed_at.cmp(&a.viewed_at));
        records.truncate(limit);
        Ok(records)
    }
}

/// Fetcher that replays queued results and counts calls.
#[derive(Default)]
pub struct ScriptedFetcher {
    results: Mutex<VecDeque<Result<Value, FetchError>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new(results: Vec<Result<Value, FetchError>>) -> Self {
        Self { results: Mutex::new(results.into()), calls: AtomicUsize::new(0), delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalFetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = match self.results.lock() {
            Ok(mut results) => results.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Err(FetchError::Transport("no scripted result left".to_string())))
    }
}
