use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::item::ItemId;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the client-held trail of recently viewed items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailEntry {
    pub item_id: ItemId,
    pub viewed_at: DateTime<Utc>,
}

impl TrailEntry {
    pub fn new(item_id: impl Into<String>, viewed_at: DateTime<Utc>) -> Self {
        Self { item_id: ItemId(item_id.into()), viewed_at }
    }
}

/// Per-user view history, one record per item carrying the latest view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub user_id: UserId,
    pub item_id: ItemId,
    pub viewed_at: DateTime<Utc>,
}
