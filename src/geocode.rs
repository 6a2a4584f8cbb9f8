//! Reverse geocoding with a bounded, shared cache.
//!
//! Exports resolve a human-readable place name for every asset that carries
//! coordinates. Lookups go to Nominatim, which rate-limits aggressively, so
//! results are cached behind an LRU keyed on coordinates rounded to four
//! decimal places (roughly 11 m). The cache is shared by the export worker
//! pool; a racing miss for the same key may duplicate the external call but
//! never corrupts the cache.

use crate::error::{AuraError, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;
use tracing::debug;

/// External reverse-geocoding backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Resolve coordinates to a place name. `Ok(None)` means the backend
    /// had no answer for this location.
    async fn reverse(&self, lat: f64, lon: f64) -> Result<Option<String>>;
}

/// Cache key: coordinates rounded to 4 decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GeoKey {
    lat_e4: i64,
    lon_e4: i64,
}

impl GeoKey {
    fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat_e4: (lat * 10_000.0).round() as i64,
            lon_e4: (lon * 10_000.0).round() as i64,
        }
    }
}

/// LRU-cached front for a [`ReverseGeocoder`].
pub struct GeocodeCache<G> {
    geocoder: G,
    cache: Mutex<LruCache<GeoKey, Option<String>>>,
}

impl<G: ReverseGeocoder> GeocodeCache<G> {
    pub fn new(geocoder: G, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            geocoder,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Resolve a place name, consulting the cache first. Negative results
    /// are cached too.
    pub async fn resolve(&self, lat: f64, lon: f64) -> Result<Option<String>> {
        let key = GeoKey::new(lat, lon);

        {
            let mut cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&key) {
                return Ok(cached.clone());
            }
        }

        // Resolve outside the lock so one slow lookup does not serialize
        // the whole worker pool. Racing misses for the same key may each
        // call the backend once; last insert wins.
        let resolved = self.geocoder.reverse(lat, lon).await?;
        debug!(lat, lon, place = ?resolved, "reverse geocoded");

        let mut cache = self.cache.lock().await;
        cache.put(key, resolved.clone());
        Ok(resolved)
    }
}

/// Nominatim-backed reverse geocoder.
pub struct NominatimGeocoder {
    http: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub const DEFAULT_BASE_URL: &'static str = "https://nominatim.openstreetmap.org";

    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<Option<String>> {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                // City-level granularity, matching what the frame displays
                ("zoom", "10".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuraError::from_status(status.as_u16(), body));
        }

        let body: serde_json::Value = response.json().await?;
        if body.get("error").is_some() {
            return Ok(None);
        }
        Ok(body
            .get("display_name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Counting geocoder that answers with a deterministic name per key.
    struct CountingGeocoder {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl ReverseGeocoder for CountingGeocoder {
        async fn reverse(&self, lat: f64, lon: f64) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("place@{lat:.4},{lon:.4}")))
        }
    }

    #[tokio::test]
    async fn test_hit_skips_external_call_and_returns_identical_value() {
        let calls = Arc::new(AtomicU32::new(0));
        let cache = GeocodeCache::new(
            CountingGeocoder {
                calls: calls.clone(),
            },
            10,
        );

        let first = cache.resolve(40.7128, -74.0060).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let second = cache.resolve(40.7128, -74.0060).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_nearby_coordinates_share_a_key() {
        let calls = Arc::new(AtomicU32::new(0));
        let cache = GeocodeCache::new(
            CountingGeocoder {
                calls: calls.clone(),
            },
            10,
        );

        cache.resolve(40.71280, -74.00600).await.unwrap();
        // Differs only past the 4th decimal place
        cache.resolve(40.71281, -74.00601).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lru_eviction_of_least_recently_used_key() {
        let calls = Arc::new(AtomicU32::new(0));
        let cache = GeocodeCache::new(
            CountingGeocoder {
                calls: calls.clone(),
            },
            2,
        );

        cache.resolve(1.0, 1.0).await.unwrap();
        cache.resolve(2.0, 2.0).await.unwrap();
        // Touch key 1 so key 2 becomes least recently used
        cache.resolve(1.0, 1.0).await.unwrap();
        // Capacity + 1 distinct keys: evicts key 2
        cache.resolve(3.0, 3.0).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cache.resolve(1.0, 1.0).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cache.resolve(2.0, 2.0).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
