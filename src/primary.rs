//! HTTP adapter for the primary (global) routing service.
//!
//! Covers geocoding, distance matrices and directions for all modes,
//! including transit. Raw response statuses are classified into typed
//! errors here and nowhere else.

use serde::Deserialize;
use tracing::debug;

use crate::error::ProviderError;
use crate::matrix::CostCell;
use crate::place::{Coordinates, Step, TransitDetail, TransitKind, TravelMode};
use crate::polyline;
use crate::provider::{DirectionsRequest, Leg, RoutingProvider};

#[derive(Debug, Clone)]
pub struct PrimaryMapsConfig {
    pub api_key: String,
    pub base_url: String,
    /// Response language for instruction text.
    pub language: String,
    pub timeout_secs: u64,
}

impl Default for PrimaryMapsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://maps.googleapis.com/maps/api".to_string(),
            language: "ko".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrimaryMapsClient {
    config: PrimaryMapsConfig,
    client: reqwest::blocking::Client,
}

impl PrimaryMapsClient {
    pub fn new(config: PrimaryMapsConfig) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    fn directions_raw(
        &self,
        request: &DirectionsRequest,
        optimize: bool,
    ) -> Result<ApiDirectionsResponse, ProviderError> {
        let mut query: Vec<(&str, String)> = vec![
            ("origin", coord_param(request.origin)),
            ("destination", coord_param(request.destination)),
            ("mode", request.mode.as_str().to_string()),
            ("language", self.config.language.clone()),
            ("key", self.config.api_key.clone()),
        ];
        if !request.waypoints.is_empty() {
            let joined = request
                .waypoints
                .iter()
                .map(|&c| coord_param(c))
                .collect::<Vec<_>>()
                .join("|");
            let value = if optimize {
                format!("optimize:true|{joined}")
            } else {
                joined
            };
            query.push(("waypoints", value));
        }
        if request.mode == TravelMode::Transit {
            if let Some(departure) = request.departure {
                query.push(("departure_time", departure.to_string()));
            }
        }

        let url = format!("{}/directions/json", self.config.base_url);
        debug!(waypoints = request.waypoints.len(), mode = %request.mode, "primary directions request");
        let response: ApiDirectionsResponse =
            self.client.get(url).query(&query).send()?.json()?;
        check_status(&response.status, response.error_message.as_deref())?;
        Ok(response)
    }
}

impl RoutingProvider for PrimaryMapsClient {
    fn name(&self) -> &'static str {
        "primary-maps"
    }

    fn supports_transit(&self) -> bool {
        true
    }

    fn supports_matrix(&self) -> bool {
        true
    }

    fn geocode(&self, address: &str) -> Result<Coordinates, ProviderError> {
        let url = format!("{}/geocode/json", self.config.base_url);
        let response: ApiGeocodeResponse = self
            .client
            .get(url)
            .query(&[
                ("address", address),
                ("language", &self.config.language),
                ("key", &self.config.api_key),
            ])
            .send()?
            .json()?;
        check_status(&response.status, response.error_message.as_deref())
            .map_err(|err| match err {
                ProviderError::Empty => ProviderError::Geocode(address.to_string()),
                other => other,
            })?;

        response
            .results
            .first()
            .map(|r| r.geometry.location.into())
            .ok_or_else(|| ProviderError::Geocode(address.to_string()))
    }

    fn matrix_chunk(
        &self,
        origins: &[Coordinates],
        destinations: &[Coordinates],
        mode: TravelMode,
        departure: Option<i64>,
    ) -> Result<Vec<Vec<Option<CostCell>>>, ProviderError> {
        let mut query: Vec<(&str, String)> = vec![
            ("origins", join_coords(origins)),
            ("destinations", join_coords(destinations)),
            ("mode", mode.as_str().to_string()),
            ("key", self.config.api_key.clone()),
        ];
        if mode == TravelMode::Transit {
            if let Some(departure) = departure {
                query.push(("departure_time", departure.to_string()));
            }
        }

        let url = format!("{}/distancematrix/json", self.config.base_url);
        let response: ApiMatrixResponse = self.client.get(url).query(&query).send()?.json()?;
        check_status(&response.status, response.error_message.as_deref())?;

        let rows = response
            .rows
            .into_iter()
            .map(|row| {
                row.elements
                    .into_iter()
                    .map(|element| {
                        if element.status != "OK" {
                            return None;
                        }
                        match (element.distance, element.duration) {
                            (Some(distance), Some(duration)) => Some(CostCell {
                                distance_m: distance.value,
                                duration_s: duration.value,
                            }),
                            _ => None,
                        }
                    })
                    .collect()
            })
            .collect();
        Ok(rows)
    }

    fn directions(&self, request: &DirectionsRequest) -> Result<Vec<Leg>, ProviderError> {
        let response = self.directions_raw(request, false)?;
        let route = response.routes.into_iter().next().ok_or(ProviderError::Empty)?;
        if route.legs.is_empty() {
            return Err(ProviderError::Empty);
        }
        Ok(route
            .legs
            .into_iter()
            .map(|leg| normalize_leg(leg, request.mode))
            .collect())
    }

    fn optimize_waypoints(
        &self,
        origin: Coordinates,
        destination: Coordinates,
        waypoints: &[Coordinates],
        mode: TravelMode,
    ) -> Result<Vec<usize>, ProviderError> {
        let request = DirectionsRequest {
            origin,
            destination,
            waypoints: waypoints.to_vec(),
            mode,
            origin_name: String::new(),
            destination_name: String::new(),
            departure: None,
        };
        let response = self.directions_raw(&request, true)?;
        let route = response.routes.into_iter().next().ok_or(ProviderError::Empty)?;
        route
            .waypoint_order
            .ok_or_else(|| ProviderError::Parse("missing waypoint_order in response".to_string()))
    }
}

/// Classifies the service's top-level status string exactly once.
fn check_status(status: &str, error_message: Option<&str>) -> Result<(), ProviderError> {
    let detail = || error_message.unwrap_or(status).to_string();
    match status {
        "OK" => Ok(()),
        "ZERO_RESULTS" | "NOT_FOUND" => Err(ProviderError::Empty),
        "REQUEST_DENIED" | "OVER_DAILY_LIMIT" | "OVER_QUERY_LIMIT" => {
            Err(ProviderError::Auth(detail()))
        }
        other => Err(ProviderError::Parse(format!("status {other}: {}", detail()))),
    }
}

fn coord_param(coord: Coordinates) -> String {
    format!("{:.6},{:.6}", coord.lat, coord.lng)
}

fn join_coords(coords: &[Coordinates]) -> String {
    coords
        .iter()
        .map(|&c| coord_param(c))
        .collect::<Vec<_>>()
        .join("|")
}

fn normalize_leg(leg: ApiLeg, requested_mode: TravelMode) -> Leg {
    let steps = leg
        .steps
        .into_iter()
        .map(|step| normalize_step(step, requested_mode))
        .collect();
    Leg {
        duration_s: leg.duration.as_ref().map_or(0, |d| d.value),
        distance_m: leg.distance.as_ref().map_or(0, |d| d.value),
        steps,
        start: leg.start_location.into(),
        end: leg.end_location.into(),
        fare: None,
    }
}

fn normalize_step(step: ApiStep, requested_mode: TravelMode) -> Step {
    let instruction = strip_html(step.html_instructions.as_deref().unwrap_or(""));
    let travel_mode = step
        .travel_mode
        .as_deref()
        .and_then(parse_travel_mode)
        .unwrap_or(requested_mode);

    let transit = step.transit_details.as_ref().map(transit_detail);
    let formatted_instruction = match (&transit, travel_mode) {
        (Some(detail), _) => format_transit(detail),
        (None, TravelMode::Walking) => format_walking(
            step.duration.as_ref().map(|d| d.text.as_str()).unwrap_or(""),
            step.distance.as_ref().map(|d| d.text.as_str()).unwrap_or(""),
            &instruction,
        ),
        _ => instruction.clone(),
    };

    let path = step
        .polyline
        .as_ref()
        .map(|p| polyline::decode(&p.points))
        .unwrap_or_default();

    Step {
        instruction,
        formatted_instruction,
        distance_m: step.distance.as_ref().map_or(0, |d| d.value),
        duration_s: step.duration.as_ref().map_or(0, |d| d.value),
        travel_mode,
        transit,
        path,
    }
}

fn parse_travel_mode(raw: &str) -> Option<TravelMode> {
    match raw.to_ascii_uppercase().as_str() {
        "WALKING" => Some(TravelMode::Walking),
        "DRIVING" => Some(TravelMode::Driving),
        "TRANSIT" => Some(TravelMode::Transit),
        _ => None,
    }
}

/// Drops `<...>` tags, keeping the text between them.
fn strip_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn transit_detail(api: &ApiTransitDetails) -> TransitDetail {
    let line_name = api
        .line
        .as_ref()
        .and_then(|l| l.name.clone())
        .unwrap_or_default();
    let short_name = api
        .line
        .as_ref()
        .and_then(|l| l.short_name.clone())
        .unwrap_or_else(|| line_name.clone());
    let line_number = first_digit_run(&short_name);

    let vehicle = api
        .line
        .as_ref()
        .and_then(|l| l.vehicle.as_ref())
        .and_then(|v| v.kind.as_deref())
        .unwrap_or("")
        .to_ascii_uppercase();
    let names = format!("{} {}", line_name, short_name).to_ascii_lowercase();
    let kind = if vehicle.contains("SUBWAY") || vehicle.contains("HEAVY_RAIL") || names.contains("line") {
        TransitKind::Subway
    } else if vehicle.contains("BUS") || !line_number.is_empty() {
        TransitKind::Bus
    } else {
        TransitKind::Other
    };

    TransitDetail {
        kind,
        line_name,
        line_number,
        departure_stop: api
            .departure_stop
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_default(),
        arrival_stop: api
            .arrival_stop
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_default(),
        num_stops: api.num_stops.unwrap_or(0),
        departure_time: api
            .departure_time
            .as_ref()
            .map(|t| t.text.clone())
            .unwrap_or_default(),
        arrival_time: api
            .arrival_time
            .as_ref()
            .map(|t| t.text.clone())
            .unwrap_or_default(),
    }
}

/// Renders a transit step into a multi-line human-readable instruction.
fn format_transit(detail: &TransitDetail) -> String {
    let mut lines = Vec::new();
    match detail.kind {
        TransitKind::Subway => {
            let line = if detail.line_number.is_empty() {
                detail.line_name.clone()
            } else {
                format!("line {}", detail.line_number)
            };
            lines.push(format!("Take the subway, {line}"));
            if !detail.departure_stop.is_empty() {
                lines.push(format!("  - board at {}", detail.departure_stop));
            }
            if !detail.arrival_stop.is_empty() {
                lines.push(format!("  - alight at {}", detail.arrival_stop));
            }
        }
        TransitKind::Bus => {
            let line = if detail.line_number.is_empty() {
                detail.line_name.clone()
            } else {
                detail.line_number.clone()
            };
            lines.push(format!("Take bus {line}"));
            if !detail.departure_stop.is_empty() {
                lines.push(format!("  - board at {}", detail.departure_stop));
            }
            if !detail.arrival_stop.is_empty() {
                lines.push(format!("  - get off at {}", detail.arrival_stop));
            }
        }
        TransitKind::Other => {
            let line = if detail.line_name.is_empty() {
                "transit".to_string()
            } else {
                detail.line_name.clone()
            };
            lines.push(format!("Take {line}"));
            if !detail.departure_stop.is_empty() {
                lines.push(format!("  - from {}", detail.departure_stop));
            }
            if !detail.arrival_stop.is_empty() {
                lines.push(format!("  - to {}", detail.arrival_stop));
            }
        }
    }
    if detail.num_stops > 0 {
        lines.push(format!("  - {} stops", detail.num_stops));
    }
    if !detail.departure_time.is_empty() {
        lines.push(format!("  - departs {}", detail.departure_time));
    }
    if !detail.arrival_time.is_empty() {
        lines.push(format!("  - arrives {}", detail.arrival_time));
    }
    lines.join("\n")
}

fn format_walking(duration_text: &str, distance_text: &str, instruction: &str) -> String {
    let mut formatted = match (duration_text.is_empty(), distance_text.is_empty()) {
        (false, false) => format!("Walk {duration_text} ({distance_text})"),
        (false, true) => format!("Walk {duration_text}"),
        _ => "Walk".to_string(),
    };
    if !instruction.is_empty() {
        formatted.push_str("\n  - ");
        formatted.push_str(instruction);
    }
    formatted
}

fn first_digit_run(text: &str) -> String {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
        } else if !digits.is_empty() {
            break;
        }
    }
    digits
}

// --- Wire shapes -----------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
struct ApiLatLng {
    lat: f64,
    lng: f64,
}

impl From<ApiLatLng> for Coordinates {
    fn from(value: ApiLatLng) -> Self {
        Coordinates::new(value.lat, value.lng)
    }
}

#[derive(Debug, Deserialize)]
struct ApiTextValue {
    value: u32,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiGeocodeResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<ApiGeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct ApiGeocodeResult {
    geometry: ApiGeometry,
}

#[derive(Debug, Deserialize)]
struct ApiGeometry {
    location: ApiLatLng,
}

#[derive(Debug, Deserialize)]
struct ApiMatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<ApiMatrixRow>,
}

#[derive(Debug, Deserialize)]
struct ApiMatrixRow {
    #[serde(default)]
    elements: Vec<ApiMatrixElement>,
}

#[derive(Debug, Deserialize)]
struct ApiMatrixElement {
    status: String,
    #[serde(default)]
    distance: Option<ApiTextValue>,
    #[serde(default)]
    duration: Option<ApiTextValue>,
}

#[derive(Debug, Deserialize)]
struct ApiDirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<ApiRoute>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    #[serde(default)]
    legs: Vec<ApiLeg>,
    #[serde(default)]
    waypoint_order: Option<Vec<usize>>,
}

#[derive(Debug, Deserialize)]
struct ApiLeg {
    #[serde(default)]
    duration: Option<ApiTextValue>,
    #[serde(default)]
    distance: Option<ApiTextValue>,
    start_location: ApiLatLng,
    end_location: ApiLatLng,
    #[serde(default)]
    steps: Vec<ApiStep>,
}

#[derive(Debug, Deserialize)]
struct ApiStep {
    #[serde(default)]
    html_instructions: Option<String>,
    #[serde(default)]
    distance: Option<ApiTextValue>,
    #[serde(default)]
    duration: Option<ApiTextValue>,
    #[serde(default)]
    travel_mode: Option<String>,
    #[serde(default)]
    transit_details: Option<ApiTransitDetails>,
    #[serde(default)]
    polyline: Option<ApiPolyline>,
}

#[derive(Debug, Deserialize)]
struct ApiPolyline {
    #[serde(default)]
    points: String,
}

#[derive(Debug, Deserialize)]
struct ApiTransitDetails {
    #[serde(default)]
    line: Option<ApiTransitLine>,
    #[serde(default)]
    departure_stop: Option<ApiStop>,
    #[serde(default)]
    arrival_stop: Option<ApiStop>,
    #[serde(default)]
    num_stops: Option<u32>,
    #[serde(default)]
    departure_time: Option<ApiTimeText>,
    #[serde(default)]
    arrival_time: Option<ApiTimeText>,
}

#[derive(Debug, Deserialize)]
struct ApiTransitLine {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
    #[serde(default)]
    vehicle: Option<ApiVehicle>,
}

#[derive(Debug, Deserialize)]
struct ApiVehicle {
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiStop {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiTimeText {
    #[serde(default)]
    text: String,
}
