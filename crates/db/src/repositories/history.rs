use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use mystyle_core::{HistoryRecord, HistoryRepository, ItemId, RepositoryError, UserId};

use super::{db_error, decode_error, parse_timestamp, timestamp_to_text};
use crate::DbPool;

pub struct SqlHistoryRepository {
    pool: DbPool,
}

impl SqlHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &SqliteRow) -> Result<HistoryRecord, RepositoryError> {
    let user_id: String = row.try_get("user_id").map_err(decode_error)?;
    let item_id: String = row.try_get("item_id").map_err(decode_error)?;
    let viewed_at: String = row.try_get("viewed_at").map_err(decode_error)?;

    Ok(HistoryRecord {
        user_id: UserId(user_id),
        item_id: ItemId(item_id),
        viewed_at: parse_timestamp("viewed_at", &viewed_at)?,
    })
}

#[async_trait::async_trait]
impl HistoryRepository for SqlHistoryRepository {
    async fn upsert_if_newer(&self, record: &HistoryRecord) -> Result<bool, RepositoryError> {
        let written = sqlx::query(
            "INSERT INTO user_history (user_id, item_id, viewed_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id, item_id) DO UPDATE SET viewed_at = excluded.viewed_at
             WHERE excluded.viewed_at > user_history.viewed_at",
        )
        .bind(&record.user_id.0)
        .bind(&record.item_id.0)
        .bind(timestamp_to_text(record.viewed_at))
        .execute(&self.pool)
        .await
        .map_err(db_error)?
        .rows_affected();

        Ok(written > 0)
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, RepositoryError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            "SELECT user_id, item_id, viewed_at FROM user_history
             WHERE user_id = ?
             ORDER BY viewed_at DESC, item_id
             LIMIT ?",
        )
        .bind(&user_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_record).collect()
    }
}
