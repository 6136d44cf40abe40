use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use mystyle_core::{CacheEntry, RepositoryError, SignalCacheRepository, SignalKey};

use super::{db_error, decode_error, parse_optional_timestamp, timestamp_to_text};
use crate::DbPool;

/// Signal cache rows keyed by signal name. Entries survive restarts, so the
/// last good payload is available before the first refresh of a new process.
pub struct SqlSignalCacheRepository {
    pool: DbPool,
}

impl SqlSignalCacheRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<CacheEntry, RepositoryError> {
    let key: String = row.try_get("key").map_err(decode_error)?;
    let payload_json: Option<String> = row.try_get("payload_json").map_err(decode_error)?;
    let fetched_at: Option<String> = row.try_get("fetched_at").map_err(decode_error)?;
    let attempted_at: Option<String> = row.try_get("attempted_at").map_err(decode_error)?;
    let ok: bool = row.try_get("ok").map_err(decode_error)?;
    let stale: bool = row.try_get("stale").map_err(decode_error)?;
    let error: Option<String> = row.try_get("last_error").map_err(decode_error)?;

    let payload: Option<serde_json::Value> = payload_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("invalid payload for `{key}`: {e}")))?;

    Ok(CacheEntry {
        payload,
        fetched_at: parse_optional_timestamp("fetched_at", fetched_at)?,
        attempted_at: parse_optional_timestamp("attempted_at", attempted_at)?,
        ok,
        stale,
        error,
        key: SignalKey(key),
    })
}

#[async_trait::async_trait]
impl SignalCacheRepository for SqlSignalCacheRepository {
    async fn load(&self, key: &SignalKey) -> Result<Option<CacheEntry>, RepositoryError> {
        let row = sqlx::query(
            "SELECT key, payload_json, fetched_at, attempted_at, ok, stale, last_error
             FROM signal_cache WHERE key = ?",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), RepositoryError> {
        let payload_json = entry
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(decode_error)?;

        sqlx::query(
            "INSERT INTO signal_cache (
                key, payload_json, fetched_at, attempted_at, ok, stale, last_error, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                payload_json = excluded.payload_json,
                fetched_at = excluded.fetched_at,
                attempted_at = excluded.attempted_at,
                ok = excluded.ok,
                stale = excluded.stale,
                last_error = excluded.last_error,
                updated_at = excluded.updated_at",
        )
        .bind(entry.key.as_str())
        .bind(payload_json)
        .bind(entry.fetched_at.map(timestamp_to_text))
        .bind(entry.attempted_at.map(timestamp_to_text))
        .bind(entry.ok)
        .bind(entry.stale)
        .bind(&entry.error)
        .bind(timestamp_to_text(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<CacheEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT key, payload_json, fetched_at, attempted_at, ok, stale, last_error
             FROM signal_cache ORDER BY key",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(row_to_entry).collect()
    }
}
