//! Provider-facing trait and request/response shapes.
//!
//! The coordinator, matrix builder and assembler depend only on
//! [`RoutingProvider`]; the concrete primary and regional clients adapt
//! their wire formats to these shapes.

use crate::error::ProviderError;
use crate::matrix::CostCell;
use crate::place::{Coordinates, Fare, Step, TravelMode};

/// A directions request for one leg or one multi-leg batch.
#[derive(Debug, Clone)]
pub struct DirectionsRequest {
    pub origin: Coordinates,
    pub destination: Coordinates,
    /// Intermediate stops, in final visiting order. Empty for a single leg.
    pub waypoints: Vec<Coordinates>,
    pub mode: TravelMode,
    pub origin_name: String,
    pub destination_name: String,
    /// Unix timestamp for time-dependent (transit) costing.
    pub departure: Option<i64>,
}

impl DirectionsRequest {
    pub fn leg(origin: Coordinates, destination: Coordinates, mode: TravelMode) -> Self {
        Self {
            origin,
            destination,
            waypoints: Vec::new(),
            mode,
            origin_name: String::new(),
            destination_name: String::new(),
            departure: None,
        }
    }
}

/// One normalized leg of a provider directions response.
#[derive(Debug, Clone)]
pub struct Leg {
    pub duration_s: u32,
    pub distance_m: u32,
    pub steps: Vec<Step>,
    pub start: Coordinates,
    pub end: Coordinates,
    pub fare: Option<Fare>,
}

/// Uniform interface over one external routing service.
pub trait RoutingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the provider can route transit itineraries.
    fn supports_transit(&self) -> bool;

    /// Whether the provider offers a pairwise distance/duration matrix.
    fn supports_matrix(&self) -> bool;

    /// Resolves a free-form address to coordinates.
    fn geocode(&self, address: &str) -> Result<Coordinates, ProviderError>;

    /// Fetches one origins×destinations chunk of the cost matrix. Rows
    /// follow origin order, columns destination order; unroutable cells
    /// come back as `None`.
    fn matrix_chunk(
        &self,
        origins: &[Coordinates],
        destinations: &[Coordinates],
        mode: TravelMode,
        departure: Option<i64>,
    ) -> Result<Vec<Vec<Option<CostCell>>>, ProviderError>;

    /// Fetches turn-by-turn directions. Returns one leg per consecutive
    /// pair in origin → waypoints → destination order.
    fn directions(&self, request: &DirectionsRequest) -> Result<Vec<Leg>, ProviderError>;

    /// Provider-native waypoint reordering. Returns the visiting order as
    /// indices into `waypoints`. Optional; the local nearest-neighbor
    /// pass covers providers without it.
    fn optimize_waypoints(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        waypoints: &[Coordinates],
        mode: TravelMode,
    ) -> Result<Vec<usize>, ProviderError> {
        let _ = (origin, destination, waypoints, mode);
        Err(ProviderError::Unsupported("waypoint optimization"))
    }
}
