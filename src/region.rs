//! Region classification for provider selection.
//!
//! The regional provider only covers one country, so it is eligible only
//! when every coordinate-bearing place falls inside the domestic bounding
//! box. Unknown coordinates count against regional use.

use tracing::debug;

use crate::place::{Coordinates, Place};

/// A latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl RegionBounds {
    pub const fn new(min_lat: f64, max_lat: f64, min_lng: f64, max_lng: f64) -> Self {
        Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    /// South Korea, Jeju through the DMZ.
    pub const fn korea() -> Self {
        Self::new(33.0, 38.6, 124.5, 132.0)
    }

    pub fn contains(&self, coord: Coordinates) -> bool {
        coord.lat >= self.min_lat
            && coord.lat <= self.max_lat
            && coord.lng >= self.min_lng
            && coord.lng <= self.max_lng
    }

    /// True only when at least one place carries coordinates and every
    /// coordinate-bearing place is inside the box. Places without
    /// coordinates neither qualify nor disqualify, but an itinerary with
    /// no coordinates at all is conservatively reported as out of region.
    pub fn all_in_region(&self, places: &[Place]) -> bool {
        let mut seen = false;
        for place in places {
            let Some(coord) = place.coordinates else {
                continue;
            };
            if !self.contains(coord) {
                debug!(place = %place.name, lat = coord.lat, lng = coord.lng, "place outside region");
                return false;
            }
            seen = true;
        }
        seen
    }
}
