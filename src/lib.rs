//! tour-planner routing core
//!
//! Plans multi-stop itineraries: resolves places to coordinates, picks a
//! routing provider per region and travel mode, orders the stops, assembles
//! turn-by-turn legs and falls back between providers on total failure.

pub mod assembler;
pub mod coordinator;
pub mod error;
pub mod geocache;
pub mod haversine;
pub mod matrix;
pub mod optimizer;
pub mod place;
pub mod polyline;
pub mod primary;
pub mod provider;
pub mod region;
pub mod regional;
