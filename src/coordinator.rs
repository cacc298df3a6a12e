//! Top-level route engine: geocoding, provider selection, ordering and
//! assembly, with regional-to-primary fallback.
//!
//! Provider choice is one-directional. A domestic walking or driving
//! itinerary starts on the regional provider; any typed failure or a
//! fully failed assembly retries once on the primary provider. Routes
//! that start on the primary provider never fall back.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::assembler::{self, AssembleOptions};
use crate::error::ProviderError;
use crate::geocache::GeoCache;
use crate::haversine;
use crate::matrix::{CostMatrix, MatrixBuilder, DEFAULT_ELEMENT_CAP};
use crate::optimizer;
use crate::place::{Coordinates, Place, RouteResult, TravelMode};
use crate::provider::RoutingProvider;
use crate::region::RegionBounds;

/// A single routing request.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub places: Vec<Place>,
    /// Optional fixed starting point; defaults to the place nearest the
    /// first input.
    pub origin: Option<Coordinates>,
    /// Optional fixed final stop; defaults to the last input place.
    pub destination: Option<Coordinates>,
    pub mode: TravelMode,
    /// Per-leg mode priority. Empty means "just `mode`".
    pub preferred_modes: Vec<TravelMode>,
    /// ISO-8601-style departure time (e.g. `2026-08-23T12:00:00+09:00`),
    /// used for transit costing; transit defaults to now. Bare unix
    /// seconds are accepted too.
    pub departure_time: Option<String>,
    /// When false the input order is kept as-is.
    pub optimize_waypoints: bool,
}

impl RouteRequest {
    pub fn new(places: Vec<Place>, mode: TravelMode) -> Self {
        Self {
            places,
            origin: None,
            destination: None,
            mode,
            preferred_modes: Vec::new(),
            departure_time: None,
            optimize_waypoints: true,
        }
    }

    fn wants_transit(&self) -> bool {
        self.mode == TravelMode::Transit
            || self.preferred_modes.contains(&TravelMode::Transit)
    }
}

pub struct RouteEngine {
    primary: Arc<dyn RoutingProvider>,
    regional: Option<Arc<dyn RoutingProvider>>,
    cache: GeoCache,
    region: RegionBounds,
    assemble_options: AssembleOptions,
    element_cap: usize,
}

impl RouteEngine {
    pub fn new(primary: Arc<dyn RoutingProvider>) -> Self {
        Self {
            primary,
            regional: None,
            cache: GeoCache::new(),
            region: RegionBounds::korea(),
            assemble_options: AssembleOptions::default(),
            element_cap: DEFAULT_ELEMENT_CAP,
        }
    }

    pub fn with_regional(mut self, regional: Arc<dyn RoutingProvider>) -> Self {
        self.regional = Some(regional);
        self
    }

    pub fn with_region(mut self, region: RegionBounds) -> Self {
        self.region = region;
        self
    }

    pub fn with_assemble_options(mut self, options: AssembleOptions) -> Self {
        self.assemble_options = options;
        self
    }

    pub fn with_element_cap(mut self, cap: usize) -> Self {
        self.element_cap = cap;
        self
    }

    /// Plans a full route for the request. Always returns a result; hard
    /// failures come back as a [`RouteResult`] with `success == false`.
    pub fn plan(&self, request: &RouteRequest) -> RouteResult {
        if request.places.is_empty() {
            return RouteResult::failure(Vec::new(), "no places to route".to_string());
        }

        let mut places = request.places.clone();
        let resolved = self.cache.resolve_all(self.primary.as_ref(), &mut places);
        places.retain(|p| p.coordinates.is_some());
        if resolved < 2 {
            return RouteResult::failure(
                places,
                "fewer than two places could be resolved to coordinates".to_string(),
            );
        }

        let provider = self.select_provider(request, &places);
        if !Arc::ptr_eq(&provider, &self.primary) {
            match self.run_pipeline(provider.as_ref(), &places, request) {
                Ok(result) if result.success => return result,
                Ok(result) => {
                    warn!(
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "regional route unusable, retrying on primary provider"
                    );
                }
                Err(err) => {
                    warn!(error = %err, "regional provider failed, retrying on primary provider");
                }
            }
        }

        match self.run_pipeline(self.primary.as_ref(), &places, request) {
            Ok(result) => result,
            Err(err) => RouteResult::failure(places, err.to_string()),
        }
    }

    /// Regional routing needs the provider configured, a non-transit
    /// request and every resolved place inside the regional bounds.
    fn select_provider(
        &self,
        request: &RouteRequest,
        places: &[Place],
    ) -> Arc<dyn RoutingProvider> {
        if let Some(regional) = &self.regional {
            let mode_ok = matches!(request.mode, TravelMode::Walking | TravelMode::Driving);
            if mode_ok && !request.wants_transit() && self.region.all_in_region(places) {
                info!(provider = regional.name(), "routing on regional provider");
                return Arc::clone(regional);
            }
        }
        Arc::clone(&self.primary)
    }

    fn run_pipeline(
        &self,
        provider: &dyn RoutingProvider,
        places: &[Place],
        request: &RouteRequest,
    ) -> Result<RouteResult, ProviderError> {
        let coords: Vec<Coordinates> = places
            .iter()
            .map(|p| {
                p.coordinates
                    .ok_or_else(|| ProviderError::Parse(format!("unresolved place {}", p.name)))
            })
            .collect::<Result<_, _>>()?;

        let start = match request.origin {
            Some(origin) => Some(nearest_index(&coords, origin)),
            None => None,
        };
        let end = request
            .destination
            .and_then(|dest| coords.iter().position(|c| c.near(dest)));

        let departure = match request.departure_time.as_deref() {
            Some(raw) => {
                let parsed = parse_departure(raw);
                if parsed.is_none() {
                    warn!(raw, "ignoring unparsable departure time");
                }
                parsed
            }
            None => None,
        };
        let departure = match request.mode {
            TravelMode::Transit => Some(departure.unwrap_or_else(now_unix)),
            _ => departure,
        };

        let order = if request.optimize_waypoints && coords.len() > 2 {
            let matrix = if provider.supports_matrix() {
                MatrixBuilder::new(provider)
                    .with_element_cap(self.element_cap)
                    .build(&coords, request.mode, departure)
            } else {
                CostMatrix::new()
            };
            optimizer::optimize_with_provider(provider, &coords, &matrix, start, end, request.mode)
        } else {
            (0..coords.len()).collect()
        };

        let ordered: Vec<Place> = order.iter().map(|&i| places[i].clone()).collect();

        let mut options = self.assemble_options.clone();
        options.preferred_modes = request.preferred_modes.clone();
        options.departure = departure;

        let assembled = assembler::assemble(provider, &ordered, request.mode, &options)?;

        let success = assembled.segments.iter().any(|s| s.is_valid());
        let error = if success {
            None
        } else {
            Some(aggregate_segment_errors(&assembled.segments))
        };

        Ok(RouteResult {
            optimized_places: ordered,
            total_duration_s: assembled.total_duration_s,
            total_distance_m: assembled.total_distance_m,
            segments: assembled.segments,
            success,
            error,
        })
    }
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Parses an ISO-8601-style timestamp (`YYYY-MM-DDTHH:MM[:SS]` with an
/// optional `Z` or `±hh[:mm]` offset, fractional seconds ignored) into
/// unix seconds. Bare digit strings pass through as unix seconds.
fn parse_departure(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse().ok();
    }

    let split_at = raw.find('T').or_else(|| raw.find(' '))?;
    let (date, rest) = raw.split_at(split_at);
    let rest = &rest[1..];

    let mut date_parts = date.split('-');
    let year: i64 = date_parts.next()?.parse().ok()?;
    let month: u32 = date_parts.next()?.parse().ok()?;
    let day: u32 = date_parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    // The time-of-day part contains no 'Z', '+' or '-', so the first one
    // found starts the offset.
    let (time, offset_s) = match rest.find(['Z', 'z', '+', '-']) {
        Some(pos) => {
            let (time, offset) = rest.split_at(pos);
            (time, parse_utc_offset(offset)?)
        }
        None => (rest, 0),
    };

    let mut time_parts = time.split(':');
    let hour: i64 = time_parts.next()?.trim().parse().ok()?;
    let minute: i64 = time_parts.next()?.parse().ok()?;
    let second: i64 = match time_parts.next() {
        Some(s) => s.split('.').next()?.parse().ok()?,
        None => 0,
    };
    if hour > 23 || minute > 59 || second > 60 {
        return None;
    }

    Some(days_from_civil(year, month, day) * 86_400 + hour * 3_600 + minute * 60 + second - offset_s)
}

fn parse_utc_offset(raw: &str) -> Option<i64> {
    if raw.eq_ignore_ascii_case("z") {
        return Some(0);
    }
    let sign = match raw.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = raw[1..].chars().filter(|c| c.is_ascii_digit()).collect();
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i64>().ok()?, 0),
        4 => (digits[..2].parse::<i64>().ok()?, digits[2..].parse::<i64>().ok()?),
        _ => return None,
    };
    Some(sign * (hours * 3_600 + minutes * 60))
}

/// Days since 1970-01-01 for a proleptic Gregorian civil date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let doy = (153 * ((i64::from(month) + 9) % 12) + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Index of the coordinate matching `target`, preferring an exact
/// tolerance match and falling back to the nearest point.
fn nearest_index(coords: &[Coordinates], target: Coordinates) -> usize {
    if let Some(i) = coords.iter().position(|c| c.near(target)) {
        return i;
    }
    coords
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            haversine::distance_meters(**a, target)
                .total_cmp(&haversine::distance_meters(**b, target))
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Condenses per-segment errors into one message: the first three
/// distinct errors plus a count of the rest.
fn aggregate_segment_errors(segments: &[crate::place::RouteSegment]) -> String {
    let mut distinct: Vec<&str> = Vec::new();
    let mut failed = 0usize;
    for segment in segments {
        if let Some(err) = segment.error.as_deref() {
            failed += 1;
            if distinct.len() < 3 && !distinct.contains(&err) {
                distinct.push(err);
            }
        }
    }
    if failed == 0 {
        return "no segments produced".to_string();
    }
    let mut message = format!("all legs failed: {}", distinct.join("; "));
    if failed > distinct.len() {
        message.push_str(&format!(" (and {} more failed legs)", failed - distinct.len()));
    }
    message
}
