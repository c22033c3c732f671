//! Block extraction: the enclosed faces of the finished road graph.

use geo::Polygon;
use serde::{Deserialize, Serialize};

use crate::cycles::{Cycle, decompose};
use crate::graph::PlanarGraph;
use crate::types::GenerationError;

/// An enclosed block of land bounded by roads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// The bounding ring, counter-clockwise.
    pub ring: Cycle,
    /// Enclosed area.
    pub area: f64,
}

impl Block {
    /// The block outline as a `geo::Polygon`.
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        self.ring.to_polygon()
    }
}

/// Every bounded face of `graph`, sorted by ring key.
///
/// Dangling roads bound no face and are ignored.
///
/// # Errors
///
/// Propagates [`GenerationError::InvariantViolation`] from the cycle
/// decomposition.
pub fn extract_blocks(graph: &PlanarGraph) -> Result<Vec<Block>, GenerationError> {
    let blocks = decompose(graph)?
        .cycles
        .into_iter()
        .map(|ring| Block {
            area: ring.area(),
            ring,
        })
        .collect();
    Ok(blocks)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use geo::Area;

    use super::*;
    use crate::types::Point;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    /// A 20x10 rectangle cut in two by a vertical road.
    fn two_lots() -> PlanarGraph {
        let mut g = PlanarGraph::new();
        let ring = [
            p(0.0, 0.0),
            p(10.0, 0.0),
            p(20.0, 0.0),
            p(20.0, 10.0),
            p(10.0, 10.0),
            p(0.0, 10.0),
        ];
        for i in 0..ring.len() {
            g.add_edge(ring[i], ring[(i + 1) % ring.len()]).unwrap();
        }
        g.add_edge(p(10.0, 0.0), p(10.0, 10.0)).unwrap();
        g
    }

    #[test]
    fn rectangle_cut_in_two_yields_two_blocks() {
        let blocks = extract_blocks(&two_lots()).unwrap();
        assert_eq!(blocks.len(), 2);
        for block in &blocks {
            assert!((block.area - 100.0).abs() < 1e-9);
            assert!((block.to_polygon().unsigned_area() - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn dangling_roads_bound_nothing() {
        let mut g = two_lots();
        g.add_edge(p(10.0, 10.0), p(5.0, 5.0)).unwrap();
        g.add_edge(p(5.0, 5.0), p(3.0, 5.0)).unwrap();
        let blocks = extract_blocks(&g).unwrap();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn extraction_is_idempotent() {
        let g = two_lots();
        let first = extract_blocks(&g).unwrap();
        let second = extract_blocks(&g).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn tree_has_no_blocks() {
        let mut g = PlanarGraph::new();
        g.add_edge(p(0.0, 0.0), p(1.0, 0.0)).unwrap();
        g.add_edge(p(1.0, 0.0), p(1.0, 1.0)).unwrap();
        assert!(extract_blocks(&g).unwrap().is_empty());
    }
}
