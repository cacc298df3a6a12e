//! Turn-by-turn leg assembly over a finalized visiting order.
//!
//! For each consecutive pair the assembler requests directions, trying the
//! caller's preferred modes in priority order, and normalizes the provider
//! response into [`RouteSegment`]s. Per-leg requests run concurrently and
//! are re-associated by leg index, never by completion order.

use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::haversine;
use crate::place::{Coordinates, Place, RouteSegment, Step, TravelMode};
use crate::polyline;
use crate::provider::{DirectionsRequest, Leg, RoutingProvider};

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    /// Modes to try per leg, in priority order. Empty means "just the
    /// requested mode".
    pub preferred_modes: Vec<TravelMode>,
    /// Attempts per request; only transport errors are retried.
    pub max_attempts: usize,
    /// Base delay for linear backoff (attempt × delay).
    pub retry_delay: Duration,
    /// Maximum points kept per step path.
    pub path_point_cap: usize,
    /// Provider cap on intermediate waypoints per batched request.
    pub waypoint_cap: usize,
    /// Legs shorter than this are returned directly, without a provider
    /// call.
    pub too_near_meters: f64,
    /// Unix timestamp for transit costing.
    pub departure: Option<i64>,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            preferred_modes: Vec::new(),
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            path_point_cap: 50,
            waypoint_cap: 10,
            too_near_meters: 10.0,
            departure: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssembledRoute {
    pub segments: Vec<RouteSegment>,
    pub total_duration_s: u32,
    pub total_distance_m: u64,
}

/// Assembles directions for every consecutive pair of `places`.
///
/// Per-leg errors are recorded on the segment; only authentication
/// failures abort the whole assembly, because they doom every remaining
/// leg and the coordinator needs them typed for its fallback decision.
pub fn assemble(
    provider: &dyn RoutingProvider,
    places: &[Place],
    mode: TravelMode,
    options: &AssembleOptions,
) -> Result<AssembledRoute, ProviderError> {
    let stops: Vec<(&Place, Coordinates)> = places
        .iter()
        .filter_map(|p| p.coordinates.map(|c| (p, c)))
        .collect();

    if stops.len() < 2 {
        return Ok(AssembledRoute::default());
    }

    let waypoint_count = stops.len() - 2;

    // The caller's highest-priority mode drives the batching decision and
    // the batched request itself; lower-priority modes only come into
    // play per leg, after a failure.
    let lead_mode = mode_priority(provider, mode, options)[0];

    // Batching a multi-leg request is only safe for a plain two-stop
    // route: providers return empty responses for batched walking/driving
    // requests with waypoints, transit never accepts waypoints, and the
    // waypoint cap bounds the rest.
    let must_split = lead_mode == TravelMode::Transit
        || (waypoint_count > 0 && matches!(lead_mode, TravelMode::Walking | TravelMode::Driving))
        || waypoint_count > options.waypoint_cap;

    if !must_split {
        // A batch-eligible route is exactly two stops; apply the too-near
        // shortcut before spending a provider call on it.
        let crow_flies = haversine::distance_meters(stops[0].1, stops[1].1);
        if crow_flies < options.too_near_meters {
            let segment =
                direct_segment(stops[0].0, stops[1].0, stops[0].1, stops[1].1, crow_flies, lead_mode);
            return Ok(totalled(vec![segment]));
        }
        match assemble_batched(provider, &stops, lead_mode, options) {
            Ok(Some(route)) => return Ok(route),
            Ok(None) => {
                debug!(provider = provider.name(), "batched request empty, splitting per leg");
            }
            Err(err @ ProviderError::Auth(_)) => return Err(err),
            Err(err) => {
                debug!(provider = provider.name(), error = %err, "batched request failed, splitting per leg");
            }
        }
    }

    let segments: Result<Vec<RouteSegment>, ProviderError> = (0..stops.len() - 1)
        .into_par_iter()
        .map(|i| leg_segment(provider, stops[i], stops[i + 1], mode, options))
        .collect();
    let segments = segments?;

    Ok(totalled(segments))
}

/// One request covering every leg at once. `Ok(None)` means the response
/// was unusable and the caller should fall back to per-leg requests.
fn assemble_batched(
    provider: &dyn RoutingProvider,
    stops: &[(&Place, Coordinates)],
    mode: TravelMode,
    options: &AssembleOptions,
) -> Result<Option<AssembledRoute>, ProviderError> {
    let (first, origin) = stops[0];
    let (last, destination) = stops[stops.len() - 1];

    let request = DirectionsRequest {
        origin,
        destination,
        waypoints: stops[1..stops.len() - 1].iter().map(|&(_, c)| c).collect(),
        mode,
        origin_name: first.name.clone(),
        destination_name: last.name.clone(),
        departure: options.departure,
    };

    let legs = request_with_retry(provider, &request, options)?;
    if legs.len() != stops.len() - 1 {
        return Ok(None);
    }

    let segments = legs
        .into_iter()
        .enumerate()
        .map(|(i, leg)| segment_from_leg(stops[i].0, stops[i + 1].0, mode, leg, options))
        .collect();

    Ok(Some(totalled(segments)))
}

fn leg_segment(
    provider: &dyn RoutingProvider,
    from: (&Place, Coordinates),
    to: (&Place, Coordinates),
    mode: TravelMode,
    options: &AssembleOptions,
) -> Result<RouteSegment, ProviderError> {
    let (from_place, from_coord) = from;
    let (to_place, to_coord) = to;

    let crow_flies = haversine::distance_meters(from_coord, to_coord);
    if crow_flies < options.too_near_meters {
        debug!(
            from = %from_place.name,
            to = %to_place.name,
            meters = crow_flies,
            "stops too near, emitting direct segment"
        );
        return Ok(direct_segment(from_place, to_place, from_coord, to_coord, crow_flies, mode));
    }

    let modes = mode_priority(provider, mode, options);

    let mut last_error: Option<ProviderError> = None;
    for try_mode in modes {
        let mut request = DirectionsRequest::leg(from_coord, to_coord, try_mode);
        request.origin_name = from_place.name.clone();
        request.destination_name = to_place.name.clone();
        request.departure = options.departure;

        match request_with_retry(provider, &request, options) {
            Ok(legs) => match legs.into_iter().next() {
                Some(leg) => {
                    return Ok(segment_from_leg(from_place, to_place, try_mode, leg, options));
                }
                None => last_error = Some(ProviderError::Empty),
            },
            Err(err @ ProviderError::Auth(_)) => return Err(err),
            Err(err) => {
                warn!(
                    provider = provider.name(),
                    from = %from_place.name,
                    to = %to_place.name,
                    mode = %try_mode,
                    error = %err,
                    "leg failed"
                );
                last_error = Some(err);
            }
        }
    }

    let message = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| ProviderError::Empty.to_string());
    Ok(failed_segment(from_place, to_place, from_coord, to_coord, mode, message))
}

/// Modes to try for a leg, in priority order. The caller's preference
/// list wins over the requested mode; transit is dropped when the
/// provider cannot route it. Never empty.
fn mode_priority(
    provider: &dyn RoutingProvider,
    mode: TravelMode,
    options: &AssembleOptions,
) -> Vec<TravelMode> {
    let mut modes: Vec<TravelMode> = if options.preferred_modes.is_empty() {
        vec![mode]
    } else {
        options.preferred_modes.clone()
    };
    if !provider.supports_transit() {
        modes.retain(|m| *m != TravelMode::Transit);
    }
    if modes.is_empty() {
        modes.push(mode);
    }
    modes
}

/// Bounded retry loop: up to `max_attempts` tries with linear backoff,
/// and only for transport errors. Everything else is a final answer.
fn request_with_retry(
    provider: &dyn RoutingProvider,
    request: &DirectionsRequest,
    options: &AssembleOptions,
) -> Result<Vec<Leg>, ProviderError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match provider.directions(request) {
            Ok(legs) => return Ok(legs),
            Err(err) if err.is_retryable() && attempt < options.max_attempts => {
                warn!(
                    provider = provider.name(),
                    attempt,
                    error = %err,
                    "directions request failed, retrying"
                );
                std::thread::sleep(options.retry_delay * attempt as u32);
            }
            Err(err) => return Err(err),
        }
    }
}

fn segment_from_leg(
    from: &Place,
    to: &Place,
    mode: TravelMode,
    leg: Leg,
    options: &AssembleOptions,
) -> RouteSegment {
    let steps: Vec<Step> = leg
        .steps
        .into_iter()
        .map(|mut step| {
            step.path = polyline::sample(&step.path, options.path_point_cap);
            step
        })
        .collect();

    RouteSegment {
        from: from.name.clone(),
        to: to.name.clone(),
        from_address: from.address.clone(),
        to_address: to.address.clone(),
        mode,
        duration_s: leg.duration_s,
        distance_m: leg.distance_m,
        steps,
        start_location: leg.start,
        end_location: leg.end,
        fare: leg.fare,
        error: None,
    }
}

fn direct_segment(
    from: &Place,
    to: &Place,
    start: Coordinates,
    end: Coordinates,
    meters: f64,
    mode: TravelMode,
) -> RouteSegment {
    let instruction = format!("Walk from {} to {}", from.name, to.name);
    RouteSegment {
        from: from.name.clone(),
        to: to.name.clone(),
        from_address: from.address.clone(),
        to_address: to.address.clone(),
        mode,
        duration_s: 0,
        distance_m: meters.round() as u32,
        steps: vec![Step {
            instruction: instruction.clone(),
            formatted_instruction: instruction,
            distance_m: meters.round() as u32,
            duration_s: 0,
            travel_mode: mode,
            transit: None,
            path: vec![start, end],
        }],
        start_location: start,
        end_location: end,
        fare: None,
        error: None,
    }
}

fn failed_segment(
    from: &Place,
    to: &Place,
    start: Coordinates,
    end: Coordinates,
    mode: TravelMode,
    error: String,
) -> RouteSegment {
    RouteSegment {
        from: from.name.clone(),
        to: to.name.clone(),
        from_address: from.address.clone(),
        to_address: to.address.clone(),
        mode,
        duration_s: 0,
        distance_m: 0,
        steps: Vec::new(),
        start_location: start,
        end_location: end,
        fare: None,
        error: Some(error),
    }
}

fn totalled(segments: Vec<RouteSegment>) -> AssembledRoute {
    let total_duration_s = segments.iter().map(|s| s.duration_s).sum();
    let total_distance_m = segments.iter().map(|s| u64::from(s.distance_m)).sum();
    AssembledRoute {
        segments,
        total_duration_s,
        total_distance_m,
    }
}
