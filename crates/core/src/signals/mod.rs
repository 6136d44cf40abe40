//! TTL-backed cache for externally sourced signals.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::{SignalSourceConfig, SignalsConfig};
use crate::domain::signal::{CacheEntry, SignalKey};
use crate::errors::EngineError;
use crate::locks::KeyedLocks;
use crate::ports::{FetchError, SignalCacheRepository, SignalFetcher};
use crate::retry::RetryPolicy;

pub mod fallback;
pub mod wiki;

pub use fallback::{resolve_refresh, RefreshSource};

#[derive(Clone, Debug, PartialEq)]
pub struct SignalPolicy {
    pub ttl: Duration,
    pub fetch_timeout: Duration,
    pub synthetic_default: Option<Value>,
}

impl From<&SignalSourceConfig> for SignalPolicy {
    fn from(config: &SignalSourceConfig) -> Self {
        Self {
            ttl: config.ttl(),
            fetch_timeout: config.fetch_timeout(),
            synthetic_default: config.synthetic_default.clone(),
        }
    }
}

/// Result of one `refresh` call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RefreshReport {
    pub entry: CacheEntry,
    /// `None` when no fetch was issued: the entry was fresh, or another
    /// caller's in-flight refresh produced it.
    pub source: Option<RefreshSource>,
}

pub struct SignalCache {
    store: Arc<dyn SignalCacheRepository>,
    clock: Arc<dyn Clock>,
    policies: BTreeMap<SignalKey, SignalPolicy>,
    in_flight: KeyedLocks<SignalKey>,
    retry: RetryPolicy,
}

impl SignalCache {
    pub fn new(
        store: Arc<dyn SignalCacheRepository>,
        clock: Arc<dyn Clock>,
        policies: BTreeMap<SignalKey, SignalPolicy>,
    ) -> Self {
        Self {
            store,
            clock,
            policies,
            in_flight: KeyedLocks::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(
        store: Arc<dyn SignalCacheRepository>,
        clock: Arc<dyn Clock>,
        config: &SignalsConfig,
    ) -> Self {
        let policies = config
            .keys()
            .into_iter()
            .filter_map(|key| {
                let policy = config.source(&key).map(SignalPolicy::from)?;
                Some((key, policy))
            })
            .collect();
        Self::new(store, clock, policies)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SignalKey> {
        self.policies.keys()
    }

    pub fn policy(&self, key: &SignalKey) -> Option<&SignalPolicy> {
        self.policies.get(key)
    }

    /// Last stored entry for `key`, or the "not yet populated" sentinel.
    ///
    /// Never fails: a store error is logged and reported as unpopulated.
    pub async fn get(&self, key: &SignalKey) -> CacheEntry {
        match self.store.load(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => CacheEntry::unpopulated(key.clone()),
            Err(err) => {
                error!(
                    event_name = "signal.cache.read_failed",
                    signal_key = %key,
                    error = %err,
                    "signal cache read failed"
                );
                CacheEntry::unpopulated(key.clone())
            }
        }
    }

    pub async fn list(&self) -> Vec<CacheEntry> {
        let mut entries = Vec::with_capacity(self.policies.len());
        for key in self.policies.keys() {
            entries.push(self.get(key).await);
        }
        entries
    }

    /// Refreshes `key` through `fetcher` unless the stored entry is still
    /// fresh (`force` skips that check).
    ///
    /// At most one fetch per key is in flight. A caller arriving while a
    /// refresh runs waits for it and returns the entry it stored.
    pub async fn refresh(
        &self,
        key: &SignalKey,
        fetcher: &dyn SignalFetcher,
        force: bool,
    ) -> Result<RefreshReport, EngineError> {
        let policy = self.policies.get(key).ok_or_else(|| {
            EngineError::ConfigurationMissing(format!("no cache policy for signal `{key}`"))
        })?;

        let _guard = match self.in_flight.try_acquire(key) {
            Some(guard) => guard,
            None => {
                debug!(
                    event_name = "signal.refresh.joined",
                    signal_key = %key,
                    "refresh already in flight, waiting for its result"
                );
                let _joined = self.in_flight.acquire(key).await;
                return Ok(RefreshReport { entry: self.get(key).await, source: None });
            }
        };

        let now = self.clock.now();
        // A failed read must not reach the fallback chain as "no prior entry".
        let current = self.retry.run(key.as_str(), || self.store.load(key)).await.map_err(|err| {
            error!(
                event_name = "signal.cache.read_failed",
                signal_key = %key,
                error = %err,
                "could not read current entry, skipping refresh"
            );
            err
        })?;

        if !force {
            if let Some(entry) = current.as_ref().filter(|entry| entry.is_fresh(now, policy.ttl)) {
                debug!(
                    event_name = "signal.refresh.skipped_fresh",
                    signal_key = %key,
                    "entry is within its ttl"
                );
                return Ok(RefreshReport { entry: entry.clone(), source: None });
            }
        }

        let fetched = match tokio::time::timeout(policy.fetch_timeout, fetcher.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(policy.fetch_timeout.as_secs())),
        };

        let (entry, source) = resolve_refresh(
            key,
            current.as_ref(),
            fetched,
            policy.synthetic_default.as_ref(),
            self.clock.now(),
        );

        self.retry.run(key.as_str(), || self.store.store(&entry)).await?;

        match source {
            RefreshSource::Fetched => info!(
                event_name = source.event_name(),
                signal_key = %key,
                forced = force,
                "signal refreshed"
            ),
            RefreshSource::LastKnownGood | RefreshSource::Synthetic => warn!(
                event_name = source.event_name(),
                signal_key = %key,
                error = entry.error.as_deref().unwrap_or_default(),
                "signal fetch failed, serving fallback payload"
            ),
            RefreshSource::Unavailable => warn!(
                event_name = source.event_name(),
                signal_key = %key,
                error = entry.error.as_deref().unwrap_or_default(),
                "signal fetch failed and no fallback is available"
            ),
        }

        Ok(RefreshReport { entry, source: Some(source) })
    }
}
