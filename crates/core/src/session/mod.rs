//! Anonymous view trail and its merge into authenticated history.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::history::{HistoryRecord, TrailEntry, UserId};
use crate::domain::item::ItemId;
use crate::errors::EngineError;
use crate::ports::HistoryRepository;
use crate::retry::RetryPolicy;

/// Anonymous view trail as submitted by a client, normalized and capped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct AnonymousTrail {
    entries: Vec<TrailEntry>,
}

impl AnonymousTrail {
    pub(crate) fn from_entries(entries: Vec<TrailEntry>, limit: usize) -> Self {
        Self { entries: normalize(entries, limit) }
    }

    pub(crate) fn into_entries(self) -> Vec<TrailEntry> {
        self.entries
    }
}

/// One entry per item carrying its latest view, newest first, at most `limit`.
fn normalize(entries: Vec<TrailEntry>, limit: usize) -> Vec<TrailEntry> {
    let mut latest: HashMap<ItemId, DateTime<Utc>> = HashMap::new();
    let mut order = Vec::new();
    for entry in entries {
        match latest.get_mut(&entry.item_id) {
            Some(viewed_at) => *viewed_at = (*viewed_at).max(entry.viewed_at),
            None => {
                order.push(entry.item_id.clone());
                latest.insert(entry.item_id, entry.viewed_at);
            }
        }
    }

    let mut normalized = order
        .into_iter()
        .filter_map(|item_id| {
            let viewed_at = latest.get(&item_id).copied()?;
            Some(TrailEntry { item_id, viewed_at })
        })
        .collect::<Vec<_>>();
    normalized.sort_by(|a, b| b.viewed_at.cmp(&a.viewed_at));
    normalized.truncate(limit);
    normalized
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub written: usize,
    /// Entries already covered by an equal or newer authenticated record.
    pub skipped: usize,
}

pub struct SessionMerge {
    history: Arc<dyn HistoryRepository>,
    trail_limit: usize,
    retry: RetryPolicy,
}

impl SessionMerge {
    pub fn new(history: Arc<dyn HistoryRepository>, trail_limit: usize) -> Self {
        Self { history, trail_limit, retry: RetryPolicy::default() }
    }

    /// Folds an anonymous trail into `user_id`'s history. Replaying the same
    /// trail leaves the history unchanged.
    pub async fn migrate(
        &self,
        trail: Vec<TrailEntry>,
        user_id: &UserId,
    ) -> Result<MergeReport, EngineError> {
        validate_user(user_id)?;
        if trail.iter().any(|entry| entry.item_id.0.trim().is_empty()) {
            return Err(EngineError::MalformedInput(
                "trail entries must carry a non-empty item id".to_string(),
            ));
        }

        let mut report = MergeReport::default();
        for entry in AnonymousTrail::from_entries(trail, self.trail_limit).into_entries() {
            let record = HistoryRecord {
                user_id: user_id.clone(),
                item_id: entry.item_id,
                viewed_at: entry.viewed_at,
            };
            if self.upsert(&record).await? {
                report.written += 1;
            } else {
                report.skipped += 1;
            }
        }

        info!(
            event_name = "session.merge.completed",
            user_id = %user_id,
            written = report.written,
            skipped = report.skipped,
            "anonymous trail merged into history"
        );
        Ok(report)
    }

    pub async fn record_view(
        &self,
        user_id: &UserId,
        item_id: &ItemId,
        viewed_at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        validate_user(user_id)?;
        if item_id.0.trim().is_empty() {
            return Err(EngineError::MalformedInput("item id must not be empty".to_string()));
        }

        let record =
            HistoryRecord { user_id: user_id.clone(), item_id: item_id.clone(), viewed_at };
        self.upsert(&record).await
    }

    pub async fn recent_history(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<HistoryRecord>, EngineError> {
        validate_user(user_id)?;
        self.retry.run(&user_id.0, || self.history.list_for_user(user_id, limit)).await
    }

    async fn upsert(&self, record: &HistoryRecord) -> Result<bool, EngineError> {
        self.retry.run(&record.user_id.0, || self.history.upsert_if_newer(record)).await
    }
}

fn validate_user(user_id: &UserId) -> Result<(), EngineError> {
    if user_id.0.trim().is_empty() {
        return Err(EngineError::MalformedInput("user id must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{normalize, AnonymousTrail, SessionMerge};
    use crate::domain::history::{TrailEntry, UserId};
    use crate::domain::item::ItemId;
    use crate::errors::EngineError;
    use crate::test_support::MemoryHistory;

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid time")
            + Duration::minutes(minute)
    }

    fn user(id: &str) -> UserId {
        UserId(id.to_string())
    }

    #[test]
    fn trail_keeps_newest_entries_up_to_the_limit() {
        let entries = ["a", "b", "c", "a", "d"]
            .into_iter()
            .enumerate()
            .map(|(minute, id)| TrailEntry::new(id, t(minute as i64)))
            .collect();

        let trail = AnonymousTrail::from_entries(entries, 3).into_entries();

        let ids = trail.iter().map(|entry| entry.item_id.0.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["d", "a", "c"]);
    }

    #[test]
    fn normalize_keeps_latest_timestamp_per_item() {
        let normalized = normalize(
            vec![TrailEntry::new("a", t(1)), TrailEntry::new("a", t(5)), TrailEntry::new("b", t(3))],
            20,
        );

        assert_eq!(normalized, vec![TrailEntry::new("a", t(5)), TrailEntry::new("b", t(3))]);
    }

    #[tokio::test]
    async fn migrating_the_same_trail_twice_yields_two_records() {
        let history = Arc::new(MemoryHistory::default());
        let merge = SessionMerge::new(history.clone(), 20);
        let trail =
            vec![TrailEntry::new("A", t(1)), TrailEntry::new("A", t(2)), TrailEntry::new("B", t(3))];

        let first = merge.migrate(trail.clone(), &user("u-1")).await.expect("first merge");
        let second = merge.migrate(trail, &user("u-1")).await.expect("replayed merge");

        assert_eq!(first.written, 2);
        assert_eq!(second.skipped, 2);
        assert_eq!(history.len().await, 2);
        let records = merge.recent_history(&user("u-1"), 10).await.expect("history");
        assert_eq!(records[0].item_id, ItemId("B".to_string()));
        assert_eq!(records[1].viewed_at, t(2));
    }

    #[tokio::test]
    async fn older_anonymous_view_never_overwrites_newer_history() {
        let history = Arc::new(MemoryHistory::default());
        let merge = SessionMerge::new(history, 20);
        merge
            .record_view(&user("u-1"), &ItemId("A".to_string()), t(30))
            .await
            .expect("authenticated view");

        let report =
            merge.migrate(vec![TrailEntry::new("A", t(5))], &user("u-1")).await.expect("merge");

        assert_eq!(report.skipped, 1);
        let records = merge.recent_history(&user("u-1"), 10).await.expect("history");
        assert_eq!(records[0].viewed_at, t(30));
    }

    #[tokio::test]
    async fn malformed_input_is_rejected() {
        let merge = SessionMerge::new(Arc::new(MemoryHistory::default()), 20);

        let empty_user = merge.migrate(vec![TrailEntry::new("A", t(1))], &user(" ")).await;
        let empty_item = merge.migrate(vec![TrailEntry::new("", t(1))], &user("u-1")).await;

        assert!(matches!(empty_user, Err(EngineError::MalformedInput(_))));
        assert!(matches!(empty_item, Err(EngineError::MalformedInput(_))));
    }
}
