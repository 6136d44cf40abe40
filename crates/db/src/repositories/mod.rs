use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use mystyle_core::RepositoryError;

pub mod history;
pub mod item;
pub mod memory;
pub mod signal_cache;

pub use history::SqlHistoryRepository;
pub use item::SqlItemRepository;
pub use memory::{
    InMemoryHistoryRepository, InMemoryItemRepository, InMemorySignalCacheRepository,
};
pub use signal_cache::SqlSignalCacheRepository;

const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";

/// Maps a driver error onto the engine's store error, separating lock
/// contention (retryable) from everything else.
pub fn db_error(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::PoolTimedOut => RepositoryError::Busy(err.to_string()),
        sqlx::Error::Database(db) => {
            let code = db.code();
            let message = db.message().to_ascii_lowercase();
            if matches!(code.as_deref(), Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
                || message.contains("database is locked")
                || message.contains("busy")
            {
                RepositoryError::Busy(db.message().to_string())
            } else {
                RepositoryError::Database(db.message().to_string())
            }
        }
        _ => RepositoryError::Database(err.to_string()),
    }
}

pub(crate) fn decode_error(err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(err.to_string())
}

/// Fixed-width RFC3339 so stored timestamps compare correctly as text.
pub(crate) fn timestamp_to_text(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid {column} `{value}`: {e}")))
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.as_deref().map(|raw| parse_timestamp(column, raw)).transpose()
}

pub(crate) fn day_to_text(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_day(value: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| RepositoryError::Decode(format!("invalid day `{value}`: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use mystyle_core::RepositoryError;

    use super::{db_error, day_to_text, parse_day, parse_timestamp, timestamp_to_text};

    #[test]
    fn pool_timeouts_are_busy() {
        assert!(db_error(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(matches!(db_error(sqlx::Error::RowNotFound), RepositoryError::Database(_)));
    }

    #[test]
    fn timestamps_round_trip_through_fixed_width_text() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).single().expect("valid time");

        let text = timestamp_to_text(at);

        assert_eq!(text, "2026-03-01T09:30:00.000000Z");
        assert_eq!(parse_timestamp("viewed_at", &text).expect("parse"), at);
    }

    #[test]
    fn invalid_day_is_a_decode_error() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date");
        assert_eq!(parse_day(&day_to_text(day)).expect("parse"), day);
        assert!(matches!(parse_day("03/01/2026"), Err(RepositoryError::Decode(_))));
    }
}
