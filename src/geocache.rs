//! Process-lifetime address→coordinate cache.
//!
//! Keys are whitespace-normalized address strings; entries are written on
//! first successful geocode and never invalidated. The cache is the only
//! shared mutable structure in the engine; writes are idempotent, so a
//! plain mutex-guarded map is sufficient.

use std::collections::HashMap;
use std::sync::Mutex;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::place::{Coordinates, Place};
use crate::provider::RoutingProvider;

/// Collapses runs of whitespace and trims the ends.
pub fn normalize_address(address: &str) -> String {
    address.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Default)]
pub struct GeoCache {
    entries: Mutex<HashMap<String, Coordinates>>,
}

impl GeoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, address: &str) -> Option<Coordinates> {
        self.lock().get(address).copied()
    }

    pub fn store(&self, address: &str, coord: Coordinates) {
        self.lock().insert(address.to_string(), coord);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolves one place to coordinates, consulting the cache before the
    /// provider. On success the coordinates are written through to both
    /// the cache and the place record.
    pub fn resolve(
        &self,
        provider: &dyn RoutingProvider,
        place: &mut Place,
    ) -> Result<Coordinates, ProviderError> {
        if let Some(coord) = place.coordinates {
            return Ok(coord);
        }

        let query = place.address.as_deref().unwrap_or(&place.name);
        let key = normalize_address(query);
        if key.is_empty() {
            return Err(ProviderError::Geocode(place.name.clone()));
        }

        if let Some(coord) = self.lookup(&key) {
            debug!(place = %place.name, "geocode cache hit");
            place.coordinates = Some(coord);
            return Ok(coord);
        }

        let coord = provider.geocode(&key)?;
        self.store(&key, coord);
        place.coordinates = Some(coord);
        Ok(coord)
    }

    /// Resolves a whole batch concurrently. Failures are logged and leave
    /// the place without coordinates; the batch never aborts. Returns the
    /// number of places that ended up with coordinates.
    pub fn resolve_all(&self, provider: &dyn RoutingProvider, places: &mut [Place]) -> usize {
        places.par_iter_mut().for_each(|place| {
            if let Err(err) = self.resolve(provider, place) {
                warn!(place = %place.name, error = %err, "dropping place from routing input");
            }
        });
        places.iter().filter(|p| p.coordinates.is_some()).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Coordinates>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::matrix::CostCell;
    use crate::place::TravelMode;
    use crate::provider::{DirectionsRequest, Leg};

    struct CountingGeocoder {
        calls: AtomicUsize,
    }

    impl CountingGeocoder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RoutingProvider for CountingGeocoder {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn supports_transit(&self) -> bool {
            true
        }

        fn supports_matrix(&self) -> bool {
            false
        }

        fn geocode(&self, address: &str) -> Result<Coordinates, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if address.contains("nowhere") {
                return Err(ProviderError::Geocode(address.to_string()));
            }
            Ok(Coordinates::new(37.5, 127.0))
        }

        fn matrix_chunk(
            &self,
            _origins: &[Coordinates],
            _destinations: &[Coordinates],
            _mode: TravelMode,
            _departure: Option<i64>,
        ) -> Result<Vec<Vec<Option<CostCell>>>, ProviderError> {
            Err(ProviderError::Unsupported("distance matrix"))
        }

        fn directions(&self, _request: &DirectionsRequest) -> Result<Vec<Leg>, ProviderError> {
            Err(ProviderError::Empty)
        }
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_address("  12  Sejong-daero \t Jung-gu "), "12 Sejong-daero Jung-gu");
    }

    #[test]
    fn test_duplicate_addresses_geocode_once() {
        let cache = GeoCache::new();
        let provider = CountingGeocoder::new();
        let mut a = Place::with_address("A", "12 Sejong-daero");
        let mut b = Place::with_address("B", "12   Sejong-daero");

        cache.resolve(&provider, &mut a).unwrap();
        cache.resolve(&provider, &mut b).unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.coordinates, b.coordinates);
    }

    #[test]
    fn test_existing_coordinates_skip_network() {
        let cache = GeoCache::new();
        let provider = CountingGeocoder::new();
        let mut place = Place::with_coordinates("A", 37.0, 127.0);

        cache.resolve(&provider, &mut place).unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_place_is_dropped_not_fatal() {
        let cache = GeoCache::new();
        let provider = CountingGeocoder::new();
        let mut places = vec![
            Place::with_address("Good", "12 Sejong-daero"),
            Place::with_address("Bad", "nowhere at all"),
        ];

        let resolved = cache.resolve_all(&provider, &mut places);
        assert_eq!(resolved, 1);
        assert!(places[0].coordinates.is_some());
        assert!(places[1].coordinates.is_none());
    }
}
