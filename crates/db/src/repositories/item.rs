use std::collections::HashMap;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use mystyle_core::domain::item::parse_tags;
use mystyle_core::{
    EventCounts, EventType, Item, ItemId, ItemRepository, PopularityUpdate, RepositoryError,
};

use super::{db_error, day_to_text, decode_error, parse_day, timestamp_to_text};
use crate::DbPool;

const ITEM_COLUMNS: &str = "id, name, category, price, styles, colors, description, image_url, \
                            shop_url, popularity_score";

pub struct SqlItemRepository {
    pool: DbPool,
}

impl SqlItemRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_counts(
        &self,
        item_id: Option<&ItemId>,
    ) -> Result<HashMap<String, EventCounts>, RepositoryError> {
        let rows = match item_id {
            Some(id) => {
                sqlx::query(
                    "SELECT item_id, event_type, day, count FROM item_event_counts
                     WHERE item_id = ?",
                )
                .bind(&id.0)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query("SELECT item_id, event_type, day, count FROM item_event_counts")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(db_error)?;

        let mut counts: HashMap<String, EventCounts> = HashMap::new();
        for row in &rows {
            let (item_id, event_type, day, count) = row_to_bucket(row)?;
            counts.entry(item_id).or_default().add(event_type, day, count);
        }
        Ok(counts)
    }
}

fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}

fn row_to_item(row: &SqliteRow) -> Result<Item, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let name: String = row.try_get("name").map_err(decode_error)?;
    let category: Option<String> = row.try_get("category").map_err(decode_error)?;
    let price: Option<i64> = row.try_get("price").map_err(decode_error)?;
    let styles: String = row.try_get("styles").map_err(decode_error)?;
    let colors: String = row.try_get("colors").map_err(decode_error)?;
    let description: Option<String> = row.try_get("description").map_err(decode_error)?;
    let image_url: Option<String> = row.try_get("image_url").map_err(decode_error)?;
    let shop_url: Option<String> = row.try_get("shop_url").map_err(decode_error)?;
    let popularity_score: i64 = row.try_get("popularity_score").map_err(decode_error)?;

    Ok(Item {
        id: ItemId(id),
        name,
        category,
        price,
        styles: parse_tags(&styles),
        colors: parse_tags(&colors),
        description,
        image_url,
        shop_url,
        popularity_score,
        event_counts: EventCounts::new(),
    })
}

fn row_to_bucket(
    row: &SqliteRow,
) -> Result<(String, EventType, NaiveDate, i64), RepositoryError> {
    let item_id: String = row.try_get("item_id").map_err(decode_error)?;
    let event_type: String = row.try_get("event_type").map_err(decode_error)?;
    let day: String = row.try_get("day").map_err(decode_error)?;
    let count: i64 = row.try_get("count").map_err(decode_error)?;

    let event_type = EventType::from_str(&event_type).map_err(decode_error)?;
    Ok((item_id, event_type, parse_day(&day)?, count))
}

#[async_trait::async_trait]
impl ItemRepository for SqlItemRepository {
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut item = row_to_item(&row)?;
        item.event_counts = self.load_counts(Some(id)).await?.remove(&id.0).unwrap_or_default();
        Ok(Some(item))
    }

    async fn list(&self) -> Result<Vec<Item>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY rowid"))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        let mut counts = self.load_counts(None).await?;

        rows.iter()
            .map(|row| {
                let mut item = row_to_item(row)?;
                item.event_counts = counts.remove(&item.id.0).unwrap_or_default();
                Ok(item)
            })
            .collect()
    }

    async fn save(&self, item: Item) -> Result<(), RepositoryError> {
        let now = timestamp_to_text(Utc::now());
        sqlx::query(
            "INSERT INTO items (
                id, name, category, price, styles, colors, description, image_url, shop_url,
                popularity_score, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                price = excluded.price,
                styles = excluded.styles,
                colors = excluded.colors,
                description = excluded.description,
                image_url = excluded.image_url,
                shop_url = excluded.shop_url,
                updated_at = excluded.updated_at",
        )
        .bind(&item.id.0)
        .bind(&item.name)
        .bind(&item.category)
        .bind(item.price)
        .bind(join_tags(&item.styles))
        .bind(join_tags(&item.colors))
        .bind(&item.description)
        .bind(&item.image_url)
        .bind(&item.shop_url)
        .bind(item.popularity_score)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn apply_event(
        &self,
        id: &ItemId,
        event_type: EventType,
        day: NaiveDate,
        amount: i64,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let exists = sqlx::query("SELECT 1 AS present FROM items WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?
            .is_some();
        if !exists {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO item_event_counts (item_id, event_type, day, count)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(item_id, event_type, day) DO UPDATE SET
                count = item_event_counts.count + excluded.count",
        )
        .bind(&id.0)
        .bind(event_type.as_str())
        .bind(day_to_text(day))
        .bind(amount)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(true)
    }

    async fn update_popularity(
        &self,
        id: &ItemId,
        update: PopularityUpdate,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let updated = sqlx::query(
            "UPDATE items SET popularity_score = ?, updated_at = ? WHERE id = ?",
        )
        .bind(update.popularity_score)
        .bind(timestamp_to_text(Utc::now()))
        .bind(&id.0)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?
        .rows_affected();
        if updated == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM item_event_counts WHERE item_id = ? AND day < ?")
            .bind(&id.0)
            .bind(day_to_text(update.retain_from))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(true)
    }
}
