use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[serde(alias = "views")]
    View,
    #[serde(alias = "clicks")]
    Click,
    #[serde(alias = "saves")]
    Save,
}

impl EventType {
    pub const ALL: [EventType; 3] = [EventType::View, EventType::Click, EventType::Save];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Click => "click",
            Self::Save => "save",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "view" | "views" => Ok(Self::View),
            "click" | "clicks" => Ok(Self::Click),
            "save" | "saves" => Ok(Self::Save),
            other => Err(EngineError::MalformedInput(format!(
                "unsupported event type `{other}` (expected view|click|save)"
            ))),
        }
    }
}

/// Running totals per event type and calendar day.
///
/// A bucket may go negative transiently when an undo lands on a day with no
/// matching record; readers must tolerate that.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts(BTreeMap<EventType, BTreeMap<NaiveDate, i64>>);

impl EventCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event_type: EventType, day: NaiveDate, amount: i64) {
        let bucket = self.0.entry(event_type).or_default().entry(day).or_insert(0);
        *bucket = bucket.saturating_add(amount);
    }

    pub fn get(&self, event_type: EventType, day: NaiveDate) -> Option<i64> {
        self.0.get(&event_type).and_then(|days| days.get(&day)).copied()
    }

    pub fn days(&self, event_type: EventType) -> impl Iterator<Item = (NaiveDate, i64)> + '_ {
        self.0.get(&event_type).into_iter().flat_map(|days| days.iter().map(|(d, c)| (*d, *c)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventType, NaiveDate, i64)> + '_ {
        self.0.iter().flat_map(|(event_type, days)| {
            days.iter().map(move |(day, count)| (*event_type, *day, *count))
        })
    }

    pub fn event_types(&self) -> impl Iterator<Item = EventType> + '_ {
        self.0.keys().copied()
    }

    /// Keeps the buckets for which `keep` returns true and returns how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(EventType, NaiveDate) -> bool) -> usize {
        let mut dropped = 0;
        for (event_type, days) in self.0.iter_mut() {
            let before = days.len();
            days.retain(|day, _| keep(*event_type, *day));
            dropped += before - days.len();
        }
        self.0.retain(|_, days| !days.is_empty());
        dropped
    }

    pub fn bucket_count(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(EventType, NaiveDate, i64)> for EventCounts {
    fn from_iter<T: IntoIterator<Item = (EventType, NaiveDate, i64)>>(iter: T) -> Self {
        let mut counts = Self::new();
        for (event_type, day, count) in iter {
            counts.add(event_type, day, count);
        }
        counts
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub category: Option<String>,
    pub price: Option<i64>,
    pub styles: Vec<String>,
    pub colors: Vec<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub shop_url: Option<String>,
    /// Derived from `event_counts`; only the score aggregator writes it.
    pub popularity_score: i64,
    pub event_counts: EventCounts,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ItemId(id.into()),
            name: name.into(),
            category: None,
            price: None,
            styles: Vec::new(),
            colors: Vec::new(),
            description: None,
            image_url: None,
            shop_url: None,
            popularity_score: 0,
            event_counts: EventCounts::new(),
        }
    }

    /// Lowercased concatenation of every free-text attribute, used for keyword matching.
    pub fn searchable_text(&self) -> String {
        let mut parts: Vec<&str> = vec![self.name.as_str()];
        parts.extend(self.category.as_deref());
        parts.extend(self.styles.iter().map(String::as_str));
        parts.extend(self.colors.iter().map(String::as_str));
        parts.extend(self.description.as_deref());
        parts.join(" ").to_lowercase()
    }
}

/// Splits a stored tag list (`"a, b、c"`) into trimmed, deduplicated, sorted tags.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags = raw
        .replace('、', ",")
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    tags.sort();
    tags.dedup();
    tags
}
