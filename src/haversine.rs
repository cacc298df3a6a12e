//! Haversine great-circle estimates (fallback when matrix cells are missing).
//!
//! Less accurate than provider travel times (ignores roads and schedules)
//! but always available.

use crate::place::Coordinates;

/// Average speed assumption for converting distance to a duration proxy.
const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Earth radius in meters.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters.
pub fn distance_meters(from: Coordinates, to: Coordinates) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Travel-time proxy in seconds for a straight-line distance, assuming the
/// default average speed.
pub fn duration_proxy_seconds(meters: f64) -> u32 {
    let hours = meters / 1000.0 / DEFAULT_SPEED_KMH;
    (hours * 3600.0).round() as u32
}
