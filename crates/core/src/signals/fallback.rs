use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::signal::{CacheEntry, SignalKey};
use crate::errors::EngineError;
use crate::ports::FetchError;

/// Where the payload of a refreshed entry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshSource {
    Fetched,
    LastKnownGood,
    Synthetic,
    Unavailable,
}

impl RefreshSource {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Fetched => "signal.refresh.succeeded",
            Self::LastKnownGood => "signal.refresh.fallback_stale",
            Self::Synthetic => "signal.refresh.fallback_synthetic",
            Self::Unavailable => "signal.refresh.failed",
        }
    }
}

/// Builds the entry that replaces `current` after one refresh attempt.
///
/// A failed fetch falls back, in order, to the last payload we held, then to
/// the configured synthetic payload, and only then to a failed entry.
pub fn resolve_refresh(
    key: &SignalKey,
    current: Option<&CacheEntry>,
    fetched: Result<Value, FetchError>,
    synthetic_default: Option<&Value>,
    now: DateTime<Utc>,
) -> (CacheEntry, RefreshSource) {
    let error = match fetched {
        Ok(payload) => return (CacheEntry::fresh(key.clone(), payload, now), RefreshSource::Fetched),
        Err(error) => {
            EngineError::UpstreamFetchFailed { key: key.to_string(), message: error.to_string() }
                .to_string()
        }
    };

    if let Some(previous) = current.filter(|entry| entry.payload.is_some()) {
        let entry = CacheEntry {
            key: key.clone(),
            payload: previous.payload.clone(),
            fetched_at: previous.fetched_at,
            attempted_at: Some(now),
            ok: true,
            stale: true,
            error: Some(error),
        };
        return (entry, RefreshSource::LastKnownGood);
    }

    if let Some(synthetic) = synthetic_default {
        let entry = CacheEntry {
            key: key.clone(),
            payload: Some(synthetic.clone()),
            fetched_at: Some(now),
            attempted_at: Some(now),
            ok: true,
            stale: true,
            error: Some(error),
        };
        return (entry, RefreshSource::Synthetic);
    }

    let entry = CacheEntry {
        key: key.clone(),
        payload: None,
        fetched_at: None,
        attempted_at: Some(now),
        ok: false,
        stale: false,
        error: Some(error),
    };
    (entry, RefreshSource::Unavailable)
}
