//! Sparse pairwise cost matrix assembled from bounded provider chunks.
//!
//! Providers cap the number of elements per matrix call, so the builder
//! partitions the coordinate list into fixed-size chunks and issues one
//! request per (origin-chunk, destination-chunk) pair. Chunk failures are
//! skipped, leaving the matrix sparse; missing cells fall back to
//! great-circle estimates downstream.

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::place::{Coordinates, TravelMode};
use crate::provider::RoutingProvider;

/// Default provider element cap (origins × destinations per call).
pub const DEFAULT_ELEMENT_CAP: usize = 100;

/// Travel cost for one directed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostCell {
    pub distance_m: u32,
    pub duration_s: u32,
}

/// Sparse, possibly asymmetric cost matrix keyed by dense input-order
/// indices.
#[derive(Debug, Clone, Default)]
pub struct CostMatrix {
    cells: HashMap<(usize, usize), CostCell>,
}

impl CostMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, from: usize, to: usize) -> Option<CostCell> {
        self.cells.get(&(from, to)).copied()
    }

    pub fn insert(&mut self, from: usize, to: usize, cell: CostCell) {
        self.cells.insert((from, to), cell);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Largest chunk side such that `side² ≤ element_cap`.
pub fn chunk_side(element_cap: usize) -> usize {
    let mut side = 1;
    while (side + 1) * (side + 1) <= element_cap {
        side += 1;
    }
    side
}

/// Builds a [`CostMatrix`] from bounded provider chunk requests.
pub struct MatrixBuilder<'a> {
    provider: &'a dyn RoutingProvider,
    element_cap: usize,
}

impl<'a> MatrixBuilder<'a> {
    pub fn new(provider: &'a dyn RoutingProvider) -> Self {
        Self {
            provider,
            element_cap: DEFAULT_ELEMENT_CAP,
        }
    }

    pub fn with_element_cap(mut self, element_cap: usize) -> Self {
        self.element_cap = element_cap.max(1);
        self
    }

    /// Requests every (origin-chunk, destination-chunk) pair concurrently
    /// and merges successful cells by explicit global `(from, to)` key, so
    /// completion order never affects placement.
    pub fn build(
        &self,
        coords: &[Coordinates],
        mode: TravelMode,
        departure: Option<i64>,
    ) -> CostMatrix {
        let mut matrix = CostMatrix::new();
        if coords.len() < 2 || !self.provider.supports_matrix() {
            return matrix;
        }

        let side = chunk_side(self.element_cap);
        let starts: Vec<usize> = (0..coords.len()).step_by(side).collect();
        let pairs: Vec<(usize, usize)> = starts
            .iter()
            .flat_map(|&o| starts.iter().map(move |&d| (o, d)))
            .collect();

        let chunks: Vec<(usize, usize, Vec<Vec<Option<CostCell>>>)> = pairs
            .par_iter()
            .filter_map(|&(origin_base, dest_base)| {
                let origins = &coords[origin_base..(origin_base + side).min(coords.len())];
                let dests = &coords[dest_base..(dest_base + side).min(coords.len())];
                match self.provider.matrix_chunk(origins, dests, mode, departure) {
                    Ok(rows) => Some((origin_base, dest_base, rows)),
                    Err(err) => {
                        warn!(
                            provider = self.provider.name(),
                            origin_base,
                            dest_base,
                            error = %err,
                            "matrix chunk failed, leaving cells sparse"
                        );
                        None
                    }
                }
            })
            .collect();

        for (origin_base, dest_base, rows) in chunks {
            for (r, row) in rows.into_iter().enumerate() {
                for (c, cell) in row.into_iter().enumerate() {
                    if let Some(cell) = cell {
                        matrix.insert(origin_base + r, dest_base + c, cell);
                    }
                }
            }
        }

        matrix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_side() {
        assert_eq!(chunk_side(100), 10);
        assert_eq!(chunk_side(25), 5);
        assert_eq!(chunk_side(99), 9);
        assert_eq!(chunk_side(1), 1);
    }

    #[test]
    fn test_matrix_is_asymmetric_capable() {
        let mut matrix = CostMatrix::new();
        matrix.insert(0, 1, CostCell { distance_m: 100, duration_s: 60 });
        matrix.insert(1, 0, CostCell { distance_m: 400, duration_s: 300 });
        assert_ne!(matrix.get(0, 1), matrix.get(1, 0));
        assert_eq!(matrix.get(2, 0), None);
    }
}
