//! Core data model: places, travel modes, steps, segments and route results.

use serde::{Deserialize, Serialize};

/// WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Matching tolerance in degrees (~11 m) used when comparing a resolved
/// place against an origin/destination override.
pub const COORD_MATCH_EPSILON: f64 = 1e-4;

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// True when both components are within [`COORD_MATCH_EPSILON`].
    pub fn near(&self, other: Coordinates) -> bool {
        (self.lat - other.lat).abs() < COORD_MATCH_EPSILON
            && (self.lng - other.lng).abs() < COORD_MATCH_EPSILON
    }
}

/// One visitable point in an itinerary.
///
/// `coordinates` may be absent on input; after resolution it is either
/// populated or the place is excluded from routing (the caller's list is
/// never shortened).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub category: Option<String>,
}

impl Place {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            address: None,
            coordinates: None,
            category: None,
        }
    }

    pub fn with_coordinates(name: &str, lat: f64, lng: f64) -> Self {
        Self {
            name: name.to_string(),
            address: None,
            coordinates: Some(Coordinates::new(lat, lng)),
            category: None,
        }
    }

    pub fn with_address(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: Some(address.to_string()),
            coordinates: None,
            category: None,
        }
    }
}

/// Supported travel modes. Bicycle is deliberately not offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Walking,
    Driving,
    Transit,
}

impl TravelMode {
    /// Wire name used in provider query parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Walking => "walking",
            TravelMode::Driving => "driving",
            TravelMode::Transit => "transit",
        }
    }
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transit vehicle family, derived from the provider's vehicle type and
/// line naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitKind {
    Subway,
    Bus,
    Other,
}

/// Line and stop details for a transit step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitDetail {
    pub kind: TransitKind,
    pub line_name: String,
    pub line_number: String,
    pub departure_stop: String,
    pub arrival_stop: String,
    pub num_stops: u32,
    pub departure_time: String,
    pub arrival_time: String,
}

/// One instruction within a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Plain-text instruction (HTML stripped).
    pub instruction: String,
    /// Multi-line human-readable rendering, richer for transit steps.
    pub formatted_instruction: String,
    pub distance_m: u32,
    pub duration_s: u32,
    pub travel_mode: TravelMode,
    #[serde(default)]
    pub transit: Option<TransitDetail>,
    /// Decoded path geometry, sub-sampled to a configured point cap.
    pub path: Vec<Coordinates>,
}

/// Toll and taxi fare figures reported by the regional provider for
/// driving legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fare {
    pub toll: u32,
    pub taxi: u32,
}

/// One directed edge in the finalized itinerary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub to_address: Option<String>,
    pub mode: TravelMode,
    pub duration_s: u32,
    pub distance_m: u32,
    pub steps: Vec<Step>,
    pub start_location: Coordinates,
    pub end_location: Coordinates,
    #[serde(default)]
    pub fare: Option<Fare>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RouteSegment {
    /// A segment with populated steps or a non-zero duration counts as
    /// valid even when an error is also recorded.
    pub fn is_valid(&self) -> bool {
        !self.steps.is_empty() || self.duration_s > 0
    }
}

/// Top-level routing output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    pub optimized_places: Vec<Place>,
    pub total_duration_s: u32,
    pub total_distance_m: u64,
    pub segments: Vec<RouteSegment>,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl RouteResult {
    /// A failure result carrying no segments at all.
    pub fn failure(places: Vec<Place>, error: String) -> Self {
        Self {
            optimized_places: places,
            total_duration_s: 0,
            total_distance_m: 0,
            segments: Vec::new(),
            success: false,
            error: Some(error),
        }
    }

    /// Slimmed variant without step or path detail, for payload-sensitive
    /// consumers.
    pub fn summary(&self) -> RouteSummary {
        RouteSummary {
            optimized_places: self
                .optimized_places
                .iter()
                .map(|p| p.name.clone())
                .collect(),
            total_duration_s: self.total_duration_s,
            total_distance_m: self.total_distance_m,
            segments: self
                .segments
                .iter()
                .map(|s| SegmentSummary {
                    from: s.from.clone(),
                    to: s.to.clone(),
                    mode: s.mode,
                    duration_s: s.duration_s,
                    distance_m: s.distance_m,
                    error: s.error.clone(),
                })
                .collect(),
            success: self.success,
            error: self.error.clone(),
        }
    }
}

/// Segment summary without steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub from: String,
    pub to: String,
    pub mode: TravelMode,
    pub duration_s: u32,
    pub distance_m: u32,
    #[serde(default)]
    pub error: Option<String>,
}

/// Slim route result for contexts with tight payload budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub optimized_places: Vec<String>,
    pub total_duration_s: u32,
    pub total_distance_m: u64,
    pub segments: Vec<SegmentSummary>,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}
