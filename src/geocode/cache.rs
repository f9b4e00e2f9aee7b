//! LRU cache in front of a geocoder.

use super::{GatewayError, Geocoder};
use crate::types::Position;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Remembers successful lookups. Failures always go to the inner geocoder.
pub struct CachedGeocoder<G> {
    inner: G,
    cache: Mutex<LruCache<String, Position>>,
}

impl<G: Geocoder> CachedGeocoder<G> {
    pub fn new(inner: G, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached addresses.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<G: Geocoder> Geocoder for CachedGeocoder<G> {
    fn resolve(&self, address: &str) -> Result<Position, GatewayError> {
        let key = address.trim().to_string();

        if let Some(position) = self.cache.lock().get(&key) {
            return Ok(*position);
        }

        let position = self.inner.resolve(&key)?;
        self.cache.lock().put(key, position);
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGeocoder {
        calls: AtomicUsize,
    }

    impl Geocoder for CountingGeocoder {
        fn resolve(&self, address: &str) -> Result<Position, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if address == "lost" {
                Err(GatewayError::NoResult)
            } else {
                Ok(Position::new(address.len() as f64, 0.0).unwrap())
            }
        }
    }

    #[test]
    fn test_hits_skip_inner() {
        let geocoder = CachedGeocoder::new(CountingGeocoder { calls: AtomicUsize::new(0) }, 4);

        geocoder.resolve("main st").unwrap();
        geocoder.resolve(" main st ").unwrap();

        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(geocoder.cached(), 1);
    }

    #[test]
    fn test_failures_not_cached() {
        let geocoder = CachedGeocoder::new(CountingGeocoder { calls: AtomicUsize::new(0) }, 4);

        assert!(geocoder.resolve("lost").is_err());
        assert!(geocoder.resolve("lost").is_err());

        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(geocoder.cached(), 0);
    }

    #[test]
    fn test_eviction() {
        let geocoder = CachedGeocoder::new(CountingGeocoder { calls: AtomicUsize::new(0) }, 2);
        geocoder.resolve("a").unwrap();
        geocoder.resolve("bb").unwrap();
        geocoder.resolve("ccc").unwrap();
        assert_eq!(geocoder.cached(), 2);

        // "a" was evicted
        geocoder.resolve("a").unwrap();
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 4);
    }
}
