//! Visiting-order optimization.
//!
//! Greedy nearest-neighbor over a sparse, possibly asymmetric cost matrix
//! with a great-circle fallback for missing cells. When the provider
//! offers native waypoint reordering and the itinerary qualifies, that is
//! preferred and nearest-neighbor is the fallback; both paths return a
//! permutation of every input index.

use tracing::{debug, warn};

use crate::haversine;
use crate::matrix::CostMatrix;
use crate::place::{Coordinates, TravelMode};
use crate::provider::RoutingProvider;

/// Most providers cap native waypoint reordering around ten stops.
pub const PROVIDER_WAYPOINT_CAP: usize = 10;

/// Orders `coords` into a visiting sequence.
///
/// `start`/`end` fix the first and last index (defaults: first and last
/// input point). Ties on cost break toward the lowest original index, so
/// repeated calls on the same matrix are deterministic.
pub fn optimize(
    coords: &[Coordinates],
    matrix: &CostMatrix,
    start: Option<usize>,
    end: Option<usize>,
) -> Vec<usize> {
    let n = coords.len();
    if n <= 2 {
        return (0..n).collect();
    }

    let start = start.unwrap_or(0).min(n - 1);
    let end = end.unwrap_or(n - 1).min(n - 1);

    // Ascending order here is what makes the tie-break pick the lowest
    // original index below.
    let mut free: Vec<usize> = (0..n).filter(|&i| i != start && i != end).collect();

    let mut order = Vec::with_capacity(n);
    order.push(start);

    if free.len() <= 1 {
        order.extend(free);
        if end != start {
            order.push(end);
        }
        return order;
    }

    let mut current = start;
    while !free.is_empty() {
        let mut best_pos = 0;
        let mut best_cost = f64::INFINITY;
        for (pos, &candidate) in free.iter().enumerate() {
            let cost = edge_cost(matrix, coords, current, candidate);
            if cost < best_cost {
                best_cost = cost;
                best_pos = pos;
            }
        }
        current = free.remove(best_pos);
        order.push(current);
    }

    if end != start {
        order.push(end);
    }
    order
}

/// Prefers the provider's native waypoint optimization when the mode and
/// waypoint count qualify, falling back to local nearest-neighbor on any
/// provider failure or invalid answer.
pub fn optimize_with_provider(
    provider: &dyn RoutingProvider,
    coords: &[Coordinates],
    matrix: &CostMatrix,
    start: Option<usize>,
    end: Option<usize>,
    mode: TravelMode,
) -> Vec<usize> {
    let n = coords.len();
    if n > 2 && mode != TravelMode::Transit {
        let s = start.unwrap_or(0).min(n - 1);
        let e = end.unwrap_or(n - 1).min(n - 1);
        let free: Vec<usize> = (0..n).filter(|&i| i != s && i != e).collect();

        if free.len() > 1 && free.len() <= PROVIDER_WAYPOINT_CAP {
            let waypoints: Vec<Coordinates> = free.iter().map(|&i| coords[i]).collect();
            match provider.optimize_waypoints(coords[s], coords[e], &waypoints, mode) {
                Ok(waypoint_order) if is_permutation(&waypoint_order, free.len()) => {
                    let mut order = Vec::with_capacity(n);
                    order.push(s);
                    order.extend(waypoint_order.iter().map(|&w| free[w]));
                    if e != s {
                        order.push(e);
                    }
                    return order;
                }
                Ok(waypoint_order) => {
                    warn!(
                        provider = provider.name(),
                        ?waypoint_order,
                        "ignoring invalid native waypoint order"
                    );
                }
                Err(err) => {
                    debug!(
                        provider = provider.name(),
                        error = %err,
                        "native waypoint optimization unavailable, using nearest-neighbor"
                    );
                }
            }
        }
    }

    optimize(coords, matrix, start, end)
}

/// Matrix duration when present, otherwise the great-circle distance as a
/// cost proxy.
fn edge_cost(matrix: &CostMatrix, coords: &[Coordinates], from: usize, to: usize) -> f64 {
    match matrix.get(from, to) {
        Some(cell) => f64::from(cell.duration_s),
        None => haversine::distance_meters(coords[from], coords[to]),
    }
}

fn is_permutation(order: &[usize], n: usize) -> bool {
    if order.len() != n {
        return false;
    }
    let mut seen = vec![false; n];
    order.iter().all(|&i| i < n && !std::mem::replace(&mut seen[i], true))
}
