//! In-memory TTL cache keyed by request fingerprint.
//!
//! Entries expire lazily: an entry older than its kind's TTL is dropped on
//! the read that finds it. Values are stored type-erased and handed back as
//! the type the caller asks for.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::endpoint::{CacheKey, EndpointKind};
use nimbus_core::CacheConfig;

/// Time-to-live per endpoint kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub current_weather: Duration,
    pub forecast: Duration,
    pub air_quality: Duration,
    pub alerts: Duration,
    pub geocoding: Duration,
    pub map_tile: Duration,
}

impl CacheTtl {
    pub fn for_kind(&self, kind: EndpointKind) -> Duration {
        match kind {
            EndpointKind::CurrentWeather => self.current_weather,
            EndpointKind::Forecast => self.forecast,
            EndpointKind::AirQuality => self.air_quality,
            EndpointKind::Alerts => self.alerts,
            EndpointKind::Geocoding => self.geocoding,
            EndpointKind::MapTile => self.map_tile,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            current_weather: Duration::from_secs(config.current_weather_ttl_secs),
            forecast: Duration::from_secs(config.forecast_ttl_secs),
            air_quality: Duration::from_secs(config.air_quality_ttl_secs),
            alerts: Duration::from_secs(config.alerts_ttl_secs),
            geocoding: Duration::from_secs(config.geocoding_ttl_secs),
            map_tile: Duration::from_secs(config.map_tile_ttl_secs),
        }
    }
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    stored_at: Instant,
    last_used: Instant,
}

/// Shared cache for fetched API values.
///
/// Safe to share between tasks behind an `Arc`; the lock is held only for
/// map operations, never across I/O.
pub struct CacheStore {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: CacheTtl,
    max_entries: Option<usize>,
}

impl CacheStore {
    /// Create an unbounded cache.
    pub fn new(ttl: CacheTtl) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: None,
        }
    }

    /// Create a cache holding at most `max_entries`, evicting the least
    /// recently used entry when full.
    pub fn bounded(ttl: CacheTtl, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: Some(max_entries.max(1)),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let ttl = CacheTtl::from_config(config);
        match config.max_entries {
            Some(max) => Self::bounded(ttl, max),
            None => Self::new(ttl),
        }
    }

    pub fn ttl(&self) -> &CacheTtl {
        &self.ttl
    }

    /// Look up a live value for `key`.
    ///
    /// Returns `None` when absent, expired, or stored as a different type.
    pub fn get<T>(&self, key: &CacheKey) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let now = Instant::now();
        let ttl = self.ttl.for_kind(key.kind());
        let mut entries = self.entries.lock();

        let entry = entries.get_mut(key)?;
        if now.saturating_duration_since(entry.stored_at) >= ttl {
            entries.remove(key);
            tracing::debug!("Cache expired: {}", key);
            return None;
        }

        entry.last_used = now;
        match entry.value.downcast_ref::<T>() {
            Some(value) => {
                tracing::debug!("Cache hit: {}", key);
                Some(value.clone())
            }
            None => {
                tracing::warn!("Cache entry {} holds a different type than requested", key);
                None
            }
        }
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn put<T>(&self, key: CacheKey, value: T)
    where
        T: Send + Sync + 'static,
    {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        tracing::debug!("Cache store: {}", key);
        entries.insert(
            key.clone(),
            CacheEntry {
                value: Arc::new(value),
                stored_at: now,
                last_used: now,
            },
        );

        if let Some(max) = self.max_entries {
            while entries.len() > max {
                let victim = entries
                    .iter()
                    .filter(|(k, _)| **k != key)
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone());
                match victim {
                    Some(victim) => {
                        tracing::debug!("Cache evict (capacity): {}", victim);
                        entries.remove(&victim);
                    }
                    None => break,
                }
            }
        }
    }

    /// Number of stored entries, expired ones included until next read
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheTtl::default())
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::endpoint::Endpoint;

    fn current_key(lat: f64) -> CacheKey {
        Endpoint::CurrentWeather { lat, lon: 0.0 }.cache_key()
    }

    fn short_ttl() -> CacheTtl {
        CacheTtl {
            current_weather: Duration::from_secs(60),
            forecast: Duration::from_secs(600),
            air_quality: Duration::from_secs(60),
            alerts: Duration::from_secs(60),
            geocoding: Duration::from_secs(3600),
            map_tile: Duration::from_secs(600),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_then_get_until_ttl() {
        let cache = CacheStore::new(short_ttl());
        let key = current_key(1.0);
        cache.put(key.clone(), "sunny".to_string());

        assert_eq!(cache.get::<String>(&key).as_deref(), Some("sunny"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get::<String>(&key).as_deref(), Some("sunny"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get::<String>(&key), None);
        // Expired entry is evicted by the read
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_follows_request_kind() {
        let cache = CacheStore::new(short_ttl());
        let current = Endpoint::CurrentWeather { lat: 1.0, lon: 2.0 }.cache_key();
        let forecast = Endpoint::Forecast { lat: 1.0, lon: 2.0 }.cache_key();
        cache.put(current.clone(), 1u32);
        cache.put(forecast.clone(), 2u32);

        tokio::time::advance(Duration::from_secs(120)).await;

        assert_eq!(cache.get::<u32>(&current), None);
        assert_eq!(cache.get::<u32>(&forecast), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_overwrites_and_restarts_ttl() {
        let cache = CacheStore::new(short_ttl());
        let key = current_key(1.0);
        cache.put(key.clone(), 1u32);
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.put(key.clone(), 2u32);
        tokio::time::advance(Duration::from_secs(50)).await;

        assert_eq!(cache.get::<u32>(&key), Some(2));
    }

    #[test]
    fn test_wrong_type_is_a_miss() {
        let cache = CacheStore::default();
        let key = current_key(1.0);
        cache.put(key.clone(), 42u32);
        assert_eq!(cache.get::<String>(&key), None);
        assert_eq!(cache.get::<u32>(&key), Some(42));
    }

    #[test]
    fn test_missing_key() {
        let cache = CacheStore::default();
        assert_eq!(cache.get::<u32>(&current_key(3.0)), None);
    }

    #[test]
    fn test_zero_ttl_disables_caching() {
        let ttl = CacheTtl {
            current_weather: Duration::ZERO,
            ..short_ttl()
        };
        let cache = CacheStore::new(ttl);
        let key = current_key(1.0);
        cache.put(key.clone(), 1u32);
        assert_eq!(cache.get::<u32>(&key), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_evicts_least_recently_used() {
        let cache = CacheStore::bounded(short_ttl(), 2);
        let (a, b, c) = (current_key(1.0), current_key(2.0), current_key(3.0));

        cache.put(a.clone(), 1u32);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.put(b.clone(), 2u32);
        tokio::time::advance(Duration::from_secs(1)).await;
        // Touch `a` so `b` becomes the eviction candidate
        assert_eq!(cache.get::<u32>(&a), Some(1));
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.put(c.clone(), 3u32);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<u32>(&a), Some(1));
        assert_eq!(cache.get::<u32>(&b), None);
        assert_eq!(cache.get::<u32>(&c), Some(3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_access_distinct_keys() {
        let cache = Arc::new(CacheStore::default());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let key = current_key(f64::from(i));
                for n in 0..100u32 {
                    cache.put(key.clone(), n);
                    let read = cache.get::<u32>(&key);
                    assert!(read.is_some());
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_and_writer_same_key() {
        let cache = Arc::new(CacheStore::default());
        let key = current_key(7.0);
        cache.put(key.clone(), 0u32);

        let writer = {
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                for n in 1..=500u32 {
                    cache.put(key.clone(), n);
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let key = key.clone();
            readers.push(tokio::spawn(async move {
                let mut last = 0u32;
                for _ in 0..500 {
                    // Never torn or missing, and never older than a prior read
                    let value = cache.get::<u32>(&key).unwrap();
                    assert!(value >= last, "read went backwards: {} < {}", value, last);
                    last = value;
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(cache.get::<u32>(&key), Some(500));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ttl_from_config() {
        let config = CacheConfig {
            forecast_ttl_secs: 5,
            ..CacheConfig::default()
        };
        let ttl = CacheTtl::from_config(&config);
        assert_eq!(ttl.forecast, Duration::from_secs(5));
        assert_eq!(ttl.for_kind(EndpointKind::Geocoding), Duration::from_secs(86_400));
    }
}
