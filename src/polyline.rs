//! Polyline codec and path sampling for route geometries.
//!
//! Providers ship step geometry in the delta-encoded polyline format: two
//! interleaved varint streams of latitude and longitude deltas scaled by
//! 1e5. Decoding happens at the provider boundary; internally paths are
//! plain coordinate sequences, sub-sampled to bound payload size.

use crate::place::Coordinates;

const SCALE: f64 = 1e5;

/// Decodes an encoded polyline into coordinate points.
///
/// Malformed trailing data is tolerated: decoding stops at the first
/// truncated varint and returns the points recovered so far.
pub fn decode(encoded: &str) -> Vec<Coordinates> {
    let bytes = encoded.as_bytes();
    let mut points = Vec::new();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lng: i64 = 0;

    while index < bytes.len() {
        let (dlat, next) = match decode_varint(bytes, index) {
            Some(v) => v,
            None => break,
        };
        let (dlng, after) = match decode_varint(bytes, next) {
            Some(v) => v,
            None => break,
        };
        lat += dlat;
        lng += dlng;
        index = after;
        points.push(Coordinates::new(lat as f64 / SCALE, lng as f64 / SCALE));
    }

    points
}

/// Encodes coordinate points into the provider polyline format.
pub fn encode(points: &[Coordinates]) -> String {
    let mut out = String::new();
    let mut prev_lat: i64 = 0;
    let mut prev_lng: i64 = 0;

    for point in points {
        let lat = (point.lat * SCALE).round() as i64;
        let lng = (point.lng * SCALE).round() as i64;
        encode_varint(lat - prev_lat, &mut out);
        encode_varint(lng - prev_lng, &mut out);
        prev_lat = lat;
        prev_lng = lng;
    }

    out
}

/// Uniformly sub-samples a path to at most `max_points`, always keeping
/// the first and last original point.
pub fn sample(points: &[Coordinates], max_points: usize) -> Vec<Coordinates> {
    if max_points == 0 || points.is_empty() {
        return Vec::new();
    }
    if points.len() <= max_points {
        return points.to_vec();
    }
    if max_points == 1 {
        return vec![points[0]];
    }

    let mut sampled = Vec::with_capacity(max_points);
    let last = points.len() - 1;
    for i in 0..max_points {
        // Evenly spaced positions over [0, last], endpoints inclusive.
        let pos = (i as f64 * last as f64 / (max_points - 1) as f64).round() as usize;
        sampled.push(points[pos.min(last)]);
    }
    sampled
}

fn decode_varint(bytes: &[u8], mut index: usize) -> Option<(i64, usize)> {
    let mut shift = 0;
    let mut result: i64 = 0;

    loop {
        let b = i64::from(*bytes.get(index)?) - 63;
        index += 1;
        result |= (b & 0x1f) << shift;
        shift += 5;
        if b < 0x20 {
            break;
        }
    }

    let delta = if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    };
    Some((delta, index))
}

fn encode_varint(delta: i64, out: &mut String) {
    let mut value = delta << 1;
    if delta < 0 {
        value = !value;
    }
    while value >= 0x20 {
        out.push((((0x20 | (value & 0x1f)) + 63) as u8) as char);
        value >>= 5;
    }
    out.push(((value + 63) as u8) as char);
}
