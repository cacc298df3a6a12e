//! HTTP adapter for the regional routing service.
//!
//! The service covers walking and driving inside one country, returns
//! GeoJSON feature collections, and authenticates with an app key header.
//! It does no geocoding and no matrices; the coordinator uses it only
//! after the region classifier approves the itinerary.

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;
use crate::matrix::CostCell;
use crate::place::{Coordinates, Fare, Step, TravelMode};
use crate::provider::{DirectionsRequest, Leg, RoutingProvider};

#[derive(Debug, Clone)]
pub struct RegionalMapsConfig {
    pub app_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Route search preference for pedestrian requests.
    pub pedestrian_search_option: u32,
    /// Route search preference for car requests.
    pub car_search_option: u32,
}

impl Default for RegionalMapsConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            base_url: "https://apis.openapi.sk.com".to_string(),
            timeout_secs: 30,
            pedestrian_search_option: 10,
            car_search_option: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegionalMapsClient {
    config: RegionalMapsConfig,
    client: reqwest::blocking::Client,
}

impl RegionalMapsClient {
    pub fn new(config: RegionalMapsConfig) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }
}

impl RoutingProvider for RegionalMapsClient {
    fn name(&self) -> &'static str {
        "regional-maps"
    }

    fn supports_transit(&self) -> bool {
        false
    }

    fn supports_matrix(&self) -> bool {
        false
    }

    fn geocode(&self, _address: &str) -> Result<Coordinates, ProviderError> {
        Err(ProviderError::Unsupported("geocoding"))
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

    fn directions(&self, request: &DirectionsRequest) -> Result<Vec<Leg>, ProviderError> {
        let (path, search_option) = match request.mode {
            TravelMode::Walking => (
                "/tmap/routes/pedestrian?version=1",
                self.config.pedestrian_search_option,
            ),
            TravelMode::Driving => ("/tmap/routes?version=1", self.config.car_search_option),
            TravelMode::Transit => return Err(ProviderError::Unsupported("transit directions")),
        };

        let mut body = json!({
            "startX": request.origin.lng,
            "startY": request.origin.lat,
            "endX": request.destination.lng,
            "endY": request.destination.lat,
            "reqCoordType": "WGS84GEO",
            "resCoordType": "WGS84GEO",
            "searchOption": search_option.to_string(),
            "sort": "index",
        });
        if !request.origin_name.is_empty() {
            body["startName"] = json!(percent_encode(&request.origin_name));
        }
        if !request.destination_name.is_empty() {
            body["endName"] = json!(percent_encode(&request.destination_name));
        }
        if !request.waypoints.is_empty() {
            let pass_list = request
                .waypoints
                .iter()
                .map(|c| format!("{},{}", c.lng, c.lat))
                .collect::<Vec<_>>()
                .join("_");
            body["passList"] = json!(pass_list);
        }

        let url = format!("{}{}", self.config.base_url, path);
        debug!(mode = %request.mode, waypoints = request.waypoints.len(), "regional directions request");
        let response = self
            .client
            .post(url)
            .header("appKey", &self.config.app_key)
            .json(&body)
            .send()?;

        let status = response.status();
        let text = response.text()?;
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProviderError::Auth(text));
        }
        if !status.is_success() {
            if status.as_u16() == 400 && text.to_ascii_lowercase().contains("too near") {
                return Err(ProviderError::Empty);
            }
            return Err(ProviderError::Parse(format!("http {status}: {text}")));
        }

        let parsed: FeatureCollection =
            serde_json::from_str(&text).map_err(|e| ProviderError::Parse(e.to_string()))?;
        if parsed.features.is_empty() {
            return Err(ProviderError::Coverage(
                "no route features in response".to_string(),
            ));
        }

        Ok(vec![leg_from_features(request, parsed.features)])
    }
}

/// Folds the GeoJSON feature list into a single leg.
///
/// The start point feature carries route totals; LineString features
/// become steps; turn point features contribute instruction text to the
/// step they precede.
fn leg_from_features(request: &DirectionsRequest, features: Vec<Feature>) -> Leg {
    let mut duration_s = 0u32;
    let mut distance_m = 0u32;
    let mut fare: Option<Fare> = None;
    let mut steps: Vec<Step> = Vec::new();
    let mut pending_instruction: Option<String> = None;

    for feature in features {
        match feature.geometry {
            Geometry::Point { coordinates: _ } => {
                let point_type = feature.properties.point_type.as_deref().unwrap_or("");
                if point_type == "SP" || point_type == "S" {
                    duration_s = feature.properties.total_time.unwrap_or(0);
                    distance_m = feature.properties.total_distance.unwrap_or(0);
                    let toll = feature.properties.total_fare.unwrap_or(0);
                    let taxi = feature.properties.taxi_fare.unwrap_or(0);
                    if toll > 0 || taxi > 0 {
                        fare = Some(Fare { toll, taxi });
                    }
                }
                if let Some(description) = feature.properties.description {
                    if !description.is_empty() {
                        pending_instruction = Some(description);
                    }
                }
            }
            Geometry::LineString { coordinates } => {
                let path: Vec<Coordinates> = coordinates
                    .iter()
                    .filter(|pair| pair.len() >= 2)
                    .map(|pair| Coordinates::new(pair[1], pair[0]))
                    .collect();
                let instruction = pending_instruction
                    .take()
                    .or(feature.properties.description)
                    .unwrap_or_default();
                steps.push(Step {
                    formatted_instruction: instruction.clone(),
                    instruction,
                    distance_m: feature.properties.distance.unwrap_or(0),
                    duration_s: feature.properties.time.unwrap_or(0),
                    travel_mode: request.mode,
                    transit: None,
                    path,
                });
            }
        }
    }

    let start = steps
        .first()
        .and_then(|s| s.path.first().copied())
        .unwrap_or(request.origin);
    let end = steps
        .last()
        .and_then(|s| s.path.last().copied())
        .unwrap_or(request.destination);

    Leg {
        duration_s,
        distance_m,
        steps,
        start,
        end,
        fare,
    }
}

/// The service rejects raw non-ASCII bytes in name fields.
fn percent_encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push_str("%20"),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

// --- Wire shapes -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
    #[serde(default)]
    properties: FeatureProperties,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Point { coordinates: Vec<f64> },
    LineString { coordinates: Vec<Vec<f64>> },
}

#[derive(Debug, Default, Deserialize)]
struct FeatureProperties {
    #[serde(rename = "pointType", default)]
    point_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "totalTime", default)]
    total_time: Option<u32>,
    #[serde(rename = "totalDistance", default)]
    total_distance: Option<u32>,
    #[serde(rename = "totalFare", default)]
    total_fare: Option<u32>,
    #[serde(rename = "taxiFare", default)]
    taxi_fare: Option<u32>,
    #[serde(default)]
    time: Option<u32>,
    #[serde(default)]
    distance: Option<u32>,
}
