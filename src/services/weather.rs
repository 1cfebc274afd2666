use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{AppError, AppResult, ModelError},
    models::{Location, WeatherSnapshot},
    services::{gateway::ModelGateway, providers::WeatherProvider},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherCacheConfig {
    /// Freshness window: a snapshot younger than this is served without an
    /// upstream call.
    pub ttl: Duration,
    /// Maximum age at which a stale snapshot may still serve as a fallback
    /// when the upstream fails.
    pub staleness_ceiling: Duration,
    /// Absolute age past which a snapshot is dropped on next access.
    pub eviction_ceiling: Duration,
}

struct StoredSnapshot {
    snapshot: WeatherSnapshot,
    stored_at: Instant,
}

/// One cache slot per location key. The fetch lock is the in-flight marker:
/// whoever holds it is the single fetcher for this key.
struct CacheSlot {
    value: Option<StoredSnapshot>,
    fetch_lock: Arc<Mutex<()>>,
}

impl CacheSlot {
    fn empty() -> Self {
        Self {
            value: None,
            fetch_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Time-bounded weather snapshot cache with single-flight misses.
///
/// Owns its entries exclusively and is the sole authority on weather
/// staleness. The entry map lock is never held across upstream I/O; only the
/// per-key fetch lock spans the fetch, which is exactly what serializes
/// concurrent misses onto one upstream call.
pub struct WeatherCache {
    config: WeatherCacheConfig,
    timeout: Duration,
    gateway: Arc<ModelGateway>,
    provider: Arc<dyn WeatherProvider>,
    entries: RwLock<HashMap<String, CacheSlot>>,
}

impl WeatherCache {
    pub fn new(
        config: WeatherCacheConfig,
        timeout: Duration,
        gateway: Arc<ModelGateway>,
        provider: Arc<dyn WeatherProvider>,
    ) -> Self {
        Self {
            config,
            timeout,
            gateway,
            provider,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a snapshot for the location, fetching at most once per key at
    /// a time.
    ///
    /// Hit within TTL: served directly. Miss/expiry: one caller fetches while
    /// concurrent callers for the same key await the same fetch and then read
    /// its result. Upstream failure: the last good snapshot is served if not
    /// older than the staleness ceiling, otherwise `WeatherUnavailable`.
    pub async fn get(
        &self,
        location: &Location,
        cancel: &CancellationToken,
    ) -> AppResult<WeatherSnapshot> {
        let key = location.cache_key();

        if let Some(snapshot) = self.fresh_value(&key).await {
            tracing::debug!(location = %key, "weather cache hit");
            return Ok(snapshot);
        }

        let fetch_lock = self.slot_lock(&key).await;
        let _in_flight = fetch_lock.lock().await;

        // A concurrent caller may have refreshed the slot while we waited for
        // the fetch lock.
        if let Some(snapshot) = self.fresh_value(&key).await {
            tracing::debug!(location = %key, "weather cache refreshed while waiting");
            return Ok(snapshot);
        }

        let provider = &*self.provider;
        let fetched = self
            .gateway
            .invoke("weather_provider", self.timeout, cancel, || {
                provider.observe(location)
            })
            .await;

        match fetched {
            Ok(snapshot) => {
                self.store(&key, snapshot.clone()).await;
                tracing::info!(
                    location = %key,
                    condition = %snapshot.condition.text,
                    temperature_c = snapshot.temperature_c,
                    "weather snapshot refreshed"
                );
                Ok(snapshot)
            }
            Err(ModelError::Cancelled) => Err(ModelError::Cancelled.into()),
            Err(err) => {
                if let Some(stale) = self.stale_value(&key).await {
                    tracing::warn!(
                        location = %key,
                        error = %err,
                        "upstream weather failed, serving last good snapshot"
                    );
                    return Ok(stale);
                }
                Err(AppError::WeatherUnavailable(format!("{key}: {err}")))
            }
        }
    }

    /// Snapshot younger than TTL, if any.
    async fn fresh_value(&self, key: &str) -> Option<WeatherSnapshot> {
        let entries = self.entries.read().await;
        let stored = entries.get(key)?.value.as_ref()?;
        if stored.stored_at.elapsed() < self.config.ttl {
            Some(stored.snapshot.clone())
        } else {
            None
        }
    }

    /// Snapshot no older than the staleness ceiling, if any.
    async fn stale_value(&self, key: &str) -> Option<WeatherSnapshot> {
        let entries = self.entries.read().await;
        let stored = entries.get(key)?.value.as_ref()?;
        if stored.stored_at.elapsed() <= self.config.staleness_ceiling {
            Some(stored.snapshot.clone())
        } else {
            None
        }
    }

    /// Returns the per-key fetch lock, creating the slot on first access and
    /// lazily evicting a value past the absolute ceiling.
    async fn slot_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut entries = self.entries.write().await;
        let slot = entries
            .entry(key.to_string())
            .or_insert_with(CacheSlot::empty);
        if let Some(stored) = &slot.value {
            if stored.stored_at.elapsed() >= self.config.eviction_ceiling {
                tracing::debug!(location = %key, "evicting expired weather entry");
                slot.value = None;
            }
        }
        slot.fetch_lock.clone()
    }

    async fn store(&self, key: &str, snapshot: WeatherSnapshot) {
        let mut entries = self.entries.write().await;
        let slot = entries
            .entry(key.to_string())
            .or_insert_with(CacheSlot::empty);
        slot.value = Some(StoredSnapshot {
            snapshot,
            stored_at: Instant::now(),
        });
    }
}
