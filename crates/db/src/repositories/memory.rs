use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::RwLock;

use mystyle_core::{
    CacheEntry, EventType, HistoryRecord, HistoryRepository, Item, ItemId, ItemRepository,
    PopularityUpdate, RepositoryError, SignalCacheRepository, SignalKey, UserId,
};

/// Catalog kept in insertion order.
#[derive(Default)]
pub struct InMemoryItemRepository {
    items: RwLock<Vec<Item>>,
}

#[async_trait::async_trait]
impl ItemRepository for InMemoryItemRepository {
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError> {
        let items = self.items.read().await;
        Ok(items.iter().find(|item| &item.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<Item>, RepositoryError> {
        Ok(self.items.read().await.clone())
    }

    async fn save(&self, item: Item) -> Result<(), RepositoryError> {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => {
                let popularity_score = existing.popularity_score;
                let event_counts = std::mem::take(&mut existing.event_counts);
                *existing = Item { popularity_score, event_counts, ..item };
            }
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
pub struct InMemorySignalCacheRepository {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

#[async_trait::async_trait]
impl SignalCacheRepository for InMemorySignalCacheRepository {
    async fn load(&self, key: &SignalKey) -> Result<Option<CacheEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.get(key.as_str()).cloned())
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.insert(entry.key.as_str().to_string(), entry.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<CacheEntry>, RepositoryError> {
        let mut entries = self.entries.read().await.values().cloned().collect::<Vec<_>>();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }
}

#[derive(Default)]
pub struct InMemoryHistoryRepository {
    records: RwLock<HashMap<(String, String), HistoryRecord>>,
}

#[async_trait::async_trait]
impl HistoryRepository for InMemoryHistoryRepository {
    async fn upsert_if_newer(&self, record: &HistoryRecord) -> Result<bool, RepositoryError> {
        let mut records = self.records.write().await;
        let key = (record.user_id.0.clone(), record.item_id.0.clone());
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
        let records = self.records.read().await;
        let mut history = records
            .values()
            .filter(|record| &record.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        history.sort_by(|a, b| {
            b.viewed_at.cmp(&a.viewed_at).then_with(|| a.item_id.cmp(&b.item_id))
        });
        history.truncate(limit);
        Ok(history)
    }
}
