use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignalKey(pub String);

impl SignalKey {
    pub const TRENDS: &'static str = "trends";
    pub const WEATHER: &'static str = "weather";
    pub const WIKI: &'static str = "wiki";

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn trends() -> Self {
        Self::new(Self::TRENDS)
    }

    pub fn weather() -> Self {
        Self::new(Self::WEATHER)
    }

    pub fn wiki() -> Self {
        Self::new(Self::WIKI)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Fresh,
    Stale,
    Failed,
    Unpopulated,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Failed => "failed",
            Self::Unpopulated => "unpopulated",
        }
    }
}

/// Last known state of one external signal.
///
/// `ok` and `stale` are always definite: an entry that has never been
/// refreshed is reported as `ok = false, stale = false` with no payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: SignalKey,
    pub payload: Option<Value>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub ok: bool,
    pub stale: bool,
    /// Diagnostic only. Not meant for end-user rendering.
    pub error: Option<String>,
}

impl CacheEntry {
    pub fn unpopulated(key: SignalKey) -> Self {
        Self {
            key,
            payload: None,
            fetched_at: None,
            attempted_at: None,
            ok: false,
            stale: false,
            error: Some("not yet populated".to_string()),
        }
    }

    pub fn fresh(key: SignalKey, payload: Value, now: DateTime<Utc>) -> Self {
        Self {
            key,
            payload: Some(payload),
            fetched_at: Some(now),
            attempted_at: Some(now),
            ok: true,
            stale: false,
            error: None,
        }
    }

    pub fn status(&self) -> SignalStatus {
        match (self.ok, self.stale) {
            (true, false) => SignalStatus::Fresh,
            (true, true) => SignalStatus::Stale,
            (false, _) if self.attempted_at.is_none() => SignalStatus::Unpopulated,
            (false, _) => SignalStatus::Failed,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.fetched_at.map(|fetched_at| now - fetched_at)
    }

    /// A fresh entry is a successful, non-stale fetch younger than `ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        if !self.ok || self.stale {
            return false;
        }
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return true;
        };
        self.age(now).is_some_and(|age| age < ttl)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{CacheEntry, SignalKey, SignalStatus};

    #[test]
    fn unpopulated_entry_has_definite_flags() {
        let entry = CacheEntry::unpopulated(SignalKey::weather());

        assert!(!entry.ok);
        assert!(!entry.stale);
        assert_eq!(entry.status(), SignalStatus::Unpopulated);
    }

    #[test]
    fn freshness_respects_ttl_and_stale_flag() {
        let fetched = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid time");
        let mut entry = CacheEntry::fresh(SignalKey::trends(), json!({"value": 1}), fetched);
        let ttl = Duration::from_secs(3600);

        assert!(entry.is_fresh(fetched + chrono::Duration::minutes(59), ttl));
        assert!(!entry.is_fresh(fetched + chrono::Duration::minutes(60), ttl));

        entry.stale = true;
        assert!(!entry.is_fresh(fetched, ttl));
        assert_eq!(entry.status(), SignalStatus::Stale);
    }

    #[test]
    fn failed_status_requires_an_attempt() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid time");
        let mut entry = CacheEntry::unpopulated(SignalKey::wiki());
        entry.attempted_at = Some(now);

        assert_eq!(entry.status(), SignalStatus::Failed);
    }
}
