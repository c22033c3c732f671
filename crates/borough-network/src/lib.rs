//! borough-network: organic street network growth inside polygonal
//! regions, and their partition into city blocks (sans-IO).
//!
//! Generation runs through:
//! topology sampling -> validation -> region decomposition ->
//! per-region seeding, growth and loose-end closing -> merge ->
//! block extraction.
//!
//! This crate has **no I/O dependencies**: it takes in-memory graphs and
//! a [`NetworkConfig`] and returns structured data. Reading inputs and
//! printing reports lives in `borough-bench`.

pub mod blocks;
pub mod city;
pub mod closer;
pub mod cycles;
pub mod diagnostics;
pub mod geometry;
pub mod graph;
pub mod grower;
pub mod region;
pub mod sampler;
pub mod seeds;
pub mod snap;
pub mod topology;
pub mod types;

pub use blocks::Block;
pub use city::{CityNetwork, generate_from_boundary_with_diagnostics, generate_with_diagnostics};
pub use cycles::Cycle;
pub use graph::PlanarGraph;
pub use grower::CycleNetwork;
pub use snap::SnapOutcome;
pub use topology::TopologyGraph;
pub use types::{
    GenerationError, GeometryError, GraphError, NetworkConfig, Point, SampleSelectionKind,
    Segment,
};

use diagnostics::NoopClock;

/// Grow a city from a coarse topology graph.
///
/// # Generation steps
///
/// 1. Sample every topology edge into an organic low-level path
/// 2. Validate the config and check the low-level graph for crossings
/// 3. Decompose it into minimal cycles, one region each
/// 4. In each region (sorted by cycle key, each with its own sub-seed):
///    seed roads on the longest boundary edges, grow inward, close loose
///    ends
/// 5. Merge every region into one graph, splitting shared boundary edges
///    at every region's split points
/// 6. Extract the enclosed blocks
///
/// # Errors
///
/// Returns [`GenerationError::InvalidConfig`] for an out-of-range config
/// or malformed topology, [`GenerationError::EmptyTopology`] if the
/// topology has no edges, [`GeometryError::SelfIntersection`] if sampled
/// edges cross, and [`GenerationError::NoContent`] if nothing grows.
pub fn generate(
    topology: &TopologyGraph,
    config: &NetworkConfig,
) -> Result<CityNetwork, GenerationError> {
    generate_with_diagnostics(topology, config, &NoopClock).map(|(city, _)| city)
}

/// Grow a city inside an existing low-level boundary graph (steps 2-6 of
/// [`generate`]).
///
/// # Errors
///
/// Same as [`generate`], minus the topology checks.
pub fn generate_from_boundary(
    boundary: &PlanarGraph,
    config: &NetworkConfig,
) -> Result<CityNetwork, GenerationError> {
    generate_from_boundary_with_diagnostics(boundary, config, &NoopClock).map(|(city, _)| city)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    fn square(size: f64) -> TopologyGraph {
        TopologyGraph::new(
            vec![p(0.0, 0.0), p(size, 0.0), p(size, size), p(0.0, size)],
            vec![[0, 1], [1, 2], [2, 3], [3, 0]],
        )
    }

    #[test]
    fn generate_empty_topology() {
        let topo = TopologyGraph::new(Vec::new(), Vec::new());
        let result = generate(&topo, &NetworkConfig::default());
        assert!(matches!(result, Err(GenerationError::EmptyTopology)));
    }

    #[test]
    fn generate_rejects_bad_config_before_sampling() {
        let config = NetworkConfig {
            roads_from_point: 1,
            ..NetworkConfig::default()
        };
        let result = generate(&square(100.0), &config);
        assert!(matches!(result, Err(GenerationError::InvalidConfig(ref msg)) if msg.contains("roads_from_point")));
    }

    #[test]
    fn generate_square_produces_blocks() {
        let city = generate(&square(150.0), &NetworkConfig::default()).unwrap();
        assert_eq!(city.cycle_networks.len(), 1);
        assert!(city.blocks.len() > 1);
        assert!(city.graph.find_crossing().is_none());
    }

    #[test]
    fn generate_from_boundary_matches_manual_ring() {
        let mut boundary = PlanarGraph::new();
        let ring = [p(0.0, 0.0), p(120.0, 0.0), p(120.0, 80.0), p(0.0, 80.0)];
        for i in 0..ring.len() {
            boundary.add_edge(ring[i], ring[(i + 1) % ring.len()]).unwrap();
        }
        let city = generate_from_boundary(&boundary, &NetworkConfig::default()).unwrap();
        let area: f64 = city.blocks.iter().map(|b| b.area).sum();
        assert!((area - 120.0 * 80.0).abs() < 1e-6);
    }
}
