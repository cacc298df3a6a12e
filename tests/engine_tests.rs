//! End-to-end engine tests
//!
//! Exercise provider selection, regional-to-primary fallback, per-leg
//! splitting, too-near shortcuts and native waypoint optimization against
//! a scripted in-memory provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tour_planner::assembler::AssembleOptions;
use tour_planner::coordinator::{RouteEngine, RouteRequest};
use tour_planner::error::ProviderError;
use tour_planner::matrix::{CostCell, MatrixBuilder};
use tour_planner::place::{Coordinates, Place, Step, TravelMode};
use tour_planner::provider::{DirectionsRequest, Leg, RoutingProvider};

// ============================================================================
// Test Fixtures
// ============================================================================

/// What the mock does when asked for directions.
#[derive(Clone, Copy)]
enum Script {
    Succeed,
    AuthError,
    CoverageError,
    /// Legs whose origin latitude exceeds the threshold fail; the rest
    /// succeed.
    FailNorthOf(f64),
    /// Requests in the given mode fail; other modes succeed.
    FailMode(TravelMode),
    /// Every request fails with a retryable transport error.
    TransportError,
}

struct MockProvider {
    name: &'static str,
    transit: bool,
    matrix: bool,
    script: Script,
    /// Waypoint order to return from native optimization; `None` leaves
    /// the trait default (unsupported).
    native_order: Option<Vec<usize>>,
    directions_calls: AtomicUsize,
    matrix_calls: AtomicUsize,
    max_waypoints_seen: AtomicUsize,
    modes_seen: Mutex<Vec<TravelMode>>,
}

impl MockProvider {
    fn new(name: &'static str, script: Script) -> Self {
        Self {
            name,
            transit: true,
            matrix: true,
            script,
            native_order: None,
            directions_calls: AtomicUsize::new(0),
            matrix_calls: AtomicUsize::new(0),
            max_waypoints_seen: AtomicUsize::new(0),
            modes_seen: Mutex::new(Vec::new()),
        }
    }

    fn regional(script: Script) -> Self {
        Self {
            transit: false,
            matrix: false,
            ..Self::new("mock-regional", script)
        }
    }

    fn with_native_order(mut self, order: Vec<usize>) -> Self {
        self.native_order = Some(order);
        self
    }

    fn make_legs(request: &DirectionsRequest) -> Vec<Leg> {
        let mut points = Vec::with_capacity(request.waypoints.len() + 2);
        points.push(request.origin);
        points.extend(request.waypoints.iter().copied());
        points.push(request.destination);

        points
            .windows(2)
            .map(|pair| Leg {
                duration_s: 600,
                distance_m: 1000,
                steps: vec![Step {
                    instruction: "Head onward".to_string(),
                    formatted_instruction: "Head onward".to_string(),
                    distance_m: 1000,
                    duration_s: 600,
                    travel_mode: request.mode,
                    transit: None,
                    path: vec![pair[0], pair[1]],
                }],
                start: pair[0],
                end: pair[1],
                fare: None,
            })
            .collect()
    }
}

impl RoutingProvider for MockProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn supports_transit(&self) -> bool {
        self.transit
    }

    fn supports_matrix(&self) -> bool {
        self.matrix
    }

    fn geocode(&self, address: &str) -> Result<Coordinates, ProviderError> {
        Err(ProviderError::Geocode(address.to_string()))
    }

    fn matrix_chunk(
        &self,
        origins: &[Coordinates],
        destinations: &[Coordinates],
        _mode: TravelMode,
        _departure: Option<i64>,
    ) -> Result<Vec<Vec<Option<CostCell>>>, ProviderError> {
        self.matrix_calls.fetch_add(1, Ordering::SeqCst);
        // Encode the coordinates into the cell so merge keying is
        // verifiable: latitudes double as indices in matrix tests.
        Ok(origins
            .iter()
            .map(|o| {
                destinations
                    .iter()
                    .map(|d| {
                        Some(CostCell {
                            distance_m: 1000,
                            duration_s: (o.lat as u32) * 100 + d.lat as u32,
                        })
                    })
                    .collect()
            })
            .collect())
    }

    fn directions(&self, request: &DirectionsRequest) -> Result<Vec<Leg>, ProviderError> {
        self.directions_calls.fetch_add(1, Ordering::SeqCst);
        self.max_waypoints_seen
            .fetch_max(request.waypoints.len(), Ordering::SeqCst);
        self.modes_seen.lock().unwrap().push(request.mode);

        match self.script {
            Script::Succeed => Ok(Self::make_legs(request)),
            Script::AuthError => Err(ProviderError::Auth("invalid app key".to_string())),
            Script::CoverageError => {
                Err(ProviderError::Coverage("outside service area".to_string()))
            }
            Script::FailNorthOf(threshold) => {
                if request.origin.lat > threshold {
                    Err(ProviderError::Coverage("outside service area".to_string()))
                } else {
                    Ok(Self::make_legs(request))
                }
            }
            Script::FailMode(bad_mode) => {
                if request.mode == bad_mode {
                    Err(ProviderError::Coverage("outside service area".to_string()))
                } else {
                    Ok(Self::make_legs(request))
                }
            }
            Script::TransportError => {
                // An empty-host URL fails in the request builder, giving a
                // real transport error without touching the network.
                let err = reqwest::blocking::Client::new()
                    .get("http://")
                    .send()
                    .expect_err("empty host must fail");
                Err(ProviderError::Transport(err))
            }
        }
    }

    fn optimize_waypoints(
        &self,
        _origin: Coordinates,
        _destination: Coordinates,
        waypoints: &[Coordinates],
        _mode: TravelMode,
    ) -> Result<Vec<usize>, ProviderError> {
        match &self.native_order {
            Some(order) if order.len() == waypoints.len() => Ok(order.clone()),
            _ => Err(ProviderError::Unsupported("waypoint optimization")),
        }
    }
}

fn fast_options() -> AssembleOptions {
    AssembleOptions {
        retry_delay: Duration::from_millis(0),
        ..AssembleOptions::default()
    }
}

fn seoul_places() -> Vec<Place> {
    vec![
        Place::with_coordinates("Gyeongbokgung", 37.5796, 126.9770),
        Place::with_coordinates("Namsan Tower", 37.5512, 126.9882),
        Place::with_coordinates("Dongdaemun", 37.5714, 127.0095),
    ]
}

// ============================================================================
// Provider selection and fallback
// ============================================================================

#[test]
fn regional_auth_failure_falls_back_to_primary() {
    let primary = Arc::new(MockProvider::new("mock-primary", Script::Succeed));
    let regional = Arc::new(MockProvider::regional(Script::AuthError));
    let engine = RouteEngine::new(primary.clone())
        .with_regional(regional.clone())
        .with_assemble_options(fast_options());

    let result = engine.plan(&RouteRequest::new(seoul_places(), TravelMode::Walking));

    assert!(result.success);
    assert!(regional.directions_calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(primary.directions_calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.segments.len(), 2);
}

#[test]
fn regional_partial_success_does_not_fall_back() {
    // The middle stop sits north of the failure threshold, so one of the
    // two legs fails and one succeeds. Partial results stand as-is.
    let primary = Arc::new(MockProvider::new("mock-primary", Script::Succeed));
    let regional = Arc::new(MockProvider::regional(Script::FailNorthOf(37.6)));
    let engine = RouteEngine::new(primary.clone())
        .with_regional(regional.clone())
        .with_assemble_options(fast_options());

    let places = vec![
        Place::with_coordinates("South", 37.50, 127.00),
        Place::with_coordinates("North", 37.70, 127.00),
        Place::with_coordinates("East", 37.55, 127.10),
    ];
    let mut request = RouteRequest::new(places, TravelMode::Walking);
    request.optimize_waypoints = false;

    let result = engine.plan(&request);

    assert!(result.success);
    assert_eq!(primary.directions_calls.load(Ordering::SeqCst), 0);
    assert!(result.segments[0].error.is_none());
    assert!(result.segments[1].error.is_some());
}

#[test]
fn transit_request_never_routes_regionally() {
    let primary = Arc::new(MockProvider::new("mock-primary", Script::Succeed));
    let regional = Arc::new(MockProvider::regional(Script::Succeed));
    let engine = RouteEngine::new(primary.clone())
        .with_regional(regional.clone())
        .with_assemble_options(fast_options());

    let mut request = RouteRequest::new(seoul_places(), TravelMode::Transit);
    request.optimize_waypoints = false;
    let result = engine.plan(&request);

    assert!(result.success);
    assert_eq!(regional.directions_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn out_of_region_itinerary_routes_on_primary() {
    let primary = Arc::new(MockProvider::new("mock-primary", Script::Succeed));
    let regional = Arc::new(MockProvider::regional(Script::Succeed));
    let engine = RouteEngine::new(primary.clone())
        .with_regional(regional.clone())
        .with_assemble_options(fast_options());

    let places = vec![
        Place::with_coordinates("Gyeongbokgung", 37.5796, 126.9770),
        Place::with_coordinates("Tokyo Tower", 35.6586, 139.7454),
    ];
    let result = engine.plan(&RouteRequest::new(places, TravelMode::Walking));

    assert!(result.success);
    assert_eq!(regional.directions_calls.load(Ordering::SeqCst), 0);
    assert!(primary.directions_calls.load(Ordering::SeqCst) >= 1);
}

// ============================================================================
// Assembly behavior
// ============================================================================

#[test]
fn every_leg_failing_reports_aggregated_error() {
    let primary = Arc::new(MockProvider::new("mock-primary", Script::CoverageError));
    let engine =
        RouteEngine::new(primary.clone()).with_assemble_options(fast_options());

    let mut request = RouteRequest::new(seoul_places(), TravelMode::Walking);
    request.optimize_waypoints = false;
    let result = engine.plan(&request);

    assert!(!result.success);
    let error = result.error.expect("aggregated error");
    assert!(error.starts_with("all legs failed:"), "got: {error}");
    assert_eq!(result.segments.len(), 2);
    assert!(result.segments.iter().all(|s| !s.is_valid()));
}

#[test]
fn transit_always_splits_into_single_leg_requests() {
    let primary = Arc::new(MockProvider::new("mock-primary", Script::Succeed));
    let engine =
        RouteEngine::new(primary.clone()).with_assemble_options(fast_options());

    let places = vec![
        Place::with_coordinates("A", 37.50, 127.00),
        Place::with_coordinates("B", 37.55, 127.02),
        Place::with_coordinates("C", 37.60, 127.04),
        Place::with_coordinates("D", 37.65, 127.06),
    ];
    let mut request = RouteRequest::new(places, TravelMode::Transit);
    request.optimize_waypoints = false;
    let result = engine.plan(&request);

    assert!(result.success);
    assert_eq!(result.segments.len(), 3);
    assert_eq!(primary.directions_calls.load(Ordering::SeqCst), 3);
    assert_eq!(primary.max_waypoints_seen.load(Ordering::SeqCst), 0);
}

#[test]
fn adjacent_stops_produce_direct_segment_without_provider_call() {
    let primary = Arc::new(MockProvider::new("mock-primary", Script::Succeed));
    let engine =
        RouteEngine::new(primary.clone()).with_assemble_options(fast_options());

    // About nine meters apart, under the ten-meter threshold.
    let places = vec![
        Place::with_coordinates("Gate", 37.50000, 127.00000),
        Place::with_coordinates("Ticket booth", 37.50008, 127.00000),
    ];
    let result = engine.plan(&RouteRequest::new(places, TravelMode::Walking));

    assert!(result.success);
    assert_eq!(primary.directions_calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.segments.len(), 1);
    assert_eq!(result.segments[0].duration_s, 0);
    assert_eq!(result.segments[0].steps.len(), 1);
    assert!(result.segments[0].steps[0].instruction.starts_with("Walk from"));
}

#[test]
fn two_stop_route_uses_highest_priority_preferred_mode() {
    let primary = Arc::new(MockProvider::new("mock-primary", Script::Succeed));
    let engine =
        RouteEngine::new(primary.clone()).with_assemble_options(fast_options());

    let places = vec![
        Place::with_coordinates("Gyeongbokgung", 37.5796, 126.9770),
        Place::with_coordinates("Namsan Tower", 37.5512, 126.9882),
    ];
    let mut request = RouteRequest::new(places, TravelMode::Driving);
    request.preferred_modes = vec![TravelMode::Walking, TravelMode::Driving];
    let result = engine.plan(&request);

    assert!(result.success);
    assert_eq!(primary.directions_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*primary.modes_seen.lock().unwrap(), vec![TravelMode::Walking]);
    assert_eq!(result.segments[0].mode, TravelMode::Walking);
}

#[test]
fn preferred_mode_falls_through_to_next_on_failure() {
    let primary = Arc::new(MockProvider::new(
        "mock-primary",
        Script::FailMode(TravelMode::Walking),
    ));
    let engine =
        RouteEngine::new(primary.clone()).with_assemble_options(fast_options());

    let mut request = RouteRequest::new(seoul_places(), TravelMode::Driving);
    request.preferred_modes = vec![TravelMode::Walking, TravelMode::Driving];
    request.optimize_waypoints = false;
    let result = engine.plan(&request);

    assert!(result.success);
    assert!(result.segments.iter().all(|s| s.mode == TravelMode::Driving));
    let modes = primary.modes_seen.lock().unwrap();
    assert!(modes.contains(&TravelMode::Walking));
    assert!(modes.contains(&TravelMode::Driving));
}

#[test]
fn transport_errors_retry_up_to_the_attempt_cap() {
    let primary = Arc::new(MockProvider::new("mock-primary", Script::TransportError));
    let engine =
        RouteEngine::new(primary.clone()).with_assemble_options(fast_options());

    // Transit always goes per leg, so two stops mean exactly one leg and
    // its retries are the only directions traffic.
    let places = vec![
        Place::with_coordinates("Gyeongbokgung", 37.5796, 126.9770),
        Place::with_coordinates("Namsan Tower", 37.5512, 126.9882),
    ];
    let result = engine.plan(&RouteRequest::new(places, TravelMode::Transit));

    assert!(!result.success);
    assert_eq!(primary.directions_calls.load(Ordering::SeqCst), 3);
    assert!(result.error.expect("aggregated error").starts_with("all legs failed:"));
}

#[test]
fn empty_and_unresolvable_inputs_fail_cleanly() {
    let primary = Arc::new(MockProvider::new("mock-primary", Script::Succeed));
    let engine =
        RouteEngine::new(primary.clone()).with_assemble_options(fast_options());

    let empty = engine.plan(&RouteRequest::new(Vec::new(), TravelMode::Walking));
    assert!(!empty.success);

    // The mock geocoder rejects everything, so address-only places cannot
    // be resolved.
    let unresolved = engine.plan(&RouteRequest::new(
        vec![Place::with_address("A", "somewhere"), Place::with_address("B", "elsewhere")],
        TravelMode::Walking,
    ));
    assert!(!unresolved.success);
    assert_eq!(primary.directions_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn native_waypoint_order_is_applied() {
    let primary = Arc::new(
        MockProvider::new("mock-primary", Script::Succeed).with_native_order(vec![2, 0, 1]),
    );
    let engine =
        RouteEngine::new(primary.clone()).with_assemble_options(fast_options());

    let places = vec![
        Place::with_coordinates("P0", 37.50, 127.00),
        Place::with_coordinates("P1", 37.51, 127.01),
        Place::with_coordinates("P2", 37.52, 127.02),
        Place::with_coordinates("P3", 37.53, 127.03),
        Place::with_coordinates("P4", 37.54, 127.04),
    ];
    let result = engine.plan(&RouteRequest::new(places, TravelMode::Driving));

    assert!(result.success);
    let names: Vec<&str> = result.optimized_places.iter().map(|p| p.name.as_str()).collect();
    // Free waypoints are P1..P3; native order [2, 0, 1] maps to P3, P1, P2.
    assert_eq!(names, vec!["P0", "P3", "P1", "P2", "P4"]);
}

#[test]
fn skipping_optimization_preserves_input_order() {
    let primary = Arc::new(MockProvider::new("mock-primary", Script::Succeed));
    let engine =
        RouteEngine::new(primary.clone()).with_assemble_options(fast_options());

    let mut request = RouteRequest::new(seoul_places(), TravelMode::Driving);
    request.optimize_waypoints = false;
    let result = engine.plan(&request);

    assert!(result.success);
    let names: Vec<&str> = result.optimized_places.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Gyeongbokgung", "Namsan Tower", "Dongdaemun"]);
    assert_eq!(primary.matrix_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Matrix chunking
// ============================================================================

#[test]
fn matrix_builder_issues_one_request_per_chunk_pair() {
    let provider = MockProvider::new("mock-primary", Script::Succeed);
    // Latitudes double as indices so cell contents verify merge keying.
    let coords: Vec<Coordinates> =
        (0..25).map(|i| Coordinates::new(i as f64, 0.0)).collect();

    let matrix = MatrixBuilder::new(&provider)
        .with_element_cap(100)
        .build(&coords, TravelMode::Driving, None);

    // 25 points at chunk side 10 means three chunk starts per axis.
    assert_eq!(provider.matrix_calls.load(Ordering::SeqCst), 9);
    assert_eq!(matrix.len(), 625);
    assert_eq!(matrix.get(7, 19).unwrap().duration_s, 719);
    assert_eq!(matrix.get(24, 3).unwrap().duration_s, 2403);
}
