//! The working graph of one region during growth.
//!
//! A region starts as its boundary ring plus any low-level edges lying
//! inside it. Those are *fixed* edges: growth may split them but never
//! continues along them. Every split of a fixed edge is recorded against
//! the original edge it came from, so the merge step can rebuild the
//! shared boundary from all regions' splits.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::cycles::Cycle;
use crate::geometry::{bounding_box, project};
use crate::graph::PlanarGraph;
use crate::types::{GenerationError, Point, PointKey, Segment, SegmentKey};

/// A region's graph plus growth bookkeeping.
#[derive(Debug, Clone)]
pub struct RegionGraph {
    graph: PlanarGraph,
    /// Current fixed sub-segment → the original edge it lies on.
    fixed: HashMap<SegmentKey, SegmentKey>,
    /// Original fixed edge → points inserted into it, in insertion order.
    splits: BTreeMap<SegmentKey, Vec<Point>>,
    dead_ends: HashSet<PointKey>,
    diagonal: f64,
}

impl RegionGraph {
    /// Build the starting graph from a boundary ring and the fixed edges
    /// inside it.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Graph`] if an obstacle duplicates a ring
    /// edge or is degenerate.
    pub fn new(ring: &Cycle, obstacles: &[Segment]) -> Result<Self, GenerationError> {
        let mut graph = PlanarGraph::new();
        let mut fixed = HashMap::new();
        for edge in ring.edges().chain(obstacles.iter().copied()) {
            graph.add_edge(edge.a, edge.b)?;
            fixed.insert(edge.key(), edge.key());
        }
        let diagonal = bounding_box(ring.vertices().iter().copied())
            .map_or(0.0, |(lo, hi)| lo.distance(hi));
        Ok(Self {
            graph,
            fixed,
            splits: BTreeMap::new(),
            dead_ends: HashSet::new(),
            diagonal,
        })
    }

    /// The current graph.
    #[must_use]
    pub const fn graph(&self) -> &PlanarGraph {
        &self.graph
    }

    /// Diagonal of the ring's bounding box: no straight road inside the
    /// region is longer.
    #[must_use]
    pub const fn diagonal(&self) -> f64 {
        self.diagonal
    }

    /// Whether `road` is (part of) a fixed edge.
    #[must_use]
    pub fn is_fixed(&self, road: &Segment) -> bool {
        self.fixed.contains_key(&road.key())
    }

    /// Whether growth has finished at `p`.
    #[must_use]
    pub fn is_dead_end(&self, p: Point) -> bool {
        self.dead_ends.contains(&p.key())
    }

    /// Stop further growth from `p`.
    pub fn mark_dead_end(&mut self, p: Point) {
        self.dead_ends.insert(p.key());
    }

    /// Add a grown road.
    ///
    /// # Errors
    ///
    /// Propagates [`GraphError`](crate::types::GraphError) from the graph.
    pub fn add_road(&mut self, a: Point, b: Point) -> Result<(), GenerationError> {
        self.graph.add_edge(a, b)?;
        Ok(())
    }

    /// Split `road` at `at`, keeping the fixed-edge bookkeeping current.
    ///
    /// # Errors
    ///
    /// Propagates [`GraphError`](crate::types::GraphError) from the graph.
    pub fn split_road(&mut self, road: Segment, at: Point) -> Result<Point, GenerationError> {
        self.graph.split_edge(road.a, road.b, at)?;
        if let Some(origin) = self.fixed.remove(&road.key()) {
            self.fixed
                .insert(Segment::from_distinct(road.a, at).key(), origin);
            self.fixed
                .insert(Segment::from_distinct(at, road.b).key(), origin);
            self.splits.entry(origin).or_default().push(at);
        }
        Ok(at)
    }

    /// Insert `at` into the original fixed edge `original`, wherever its
    /// current sub-segments are. Returns `at` unchanged if it already is
    /// a vertex.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::InvariantViolation`] if `at` is not on
    /// `original`, or `original` is not a fixed edge of this region.
    pub fn split_original(
        &mut self,
        original: Segment,
        at: Point,
    ) -> Result<Point, GenerationError> {
        if self.graph.contains_vertex(at) {
            return Ok(at);
        }
        let chain = self.original_chain(&original)?;
        let proj = project(at, original.a, original.b)?;
        let host = chain.windows(2).find_map(|w| {
            let (ra, rb) = (w[0].0, w[1].0);
            (ra < proj.r && proj.r < rb).then(|| Segment::from_distinct(w[0].1, w[1].1))
        });
        match host {
            Some(road) if self.graph.has_edge(road.a, road.b) => self.split_road(road, at),
            _ => Err(GenerationError::InvariantViolation(format!(
                "({}, {}) does not lie on a fixed edge",
                at.x, at.y
            ))),
        }
    }

    /// Points along `original`, endpoints included, with their parameter,
    /// sorted from `original.a` to `original.b`.
    fn original_chain(&self, original: &Segment) -> Result<Vec<(f64, Point)>, GenerationError> {
        let mut chain = vec![(0.0, original.a), (1.0, original.b)];
        if let Some(points) = self.splits.get(&original.key()) {
            for &p in points {
                chain.push((project(p, original.a, original.b)?.r, p));
            }
        }
        chain.sort_by(|x, y| x.0.total_cmp(&y.0));
        Ok(chain)
    }

    /// Roads grown inside the region: every edge that is not fixed, in
    /// edge-index order.
    #[must_use]
    pub fn grown_roads(&self) -> Vec<Segment> {
        self.graph.edges().filter(|e| !self.is_fixed(e)).collect()
    }

    /// Split points per original fixed edge, ordered by edge key.
    #[must_use]
    pub fn splits(&self) -> Vec<(Segment, Vec<Point>)> {
        self.splits
            .iter()
            .map(|(key, points)| (key.segment(), points.clone()))
            .collect()
    }

    /// Whether `p` lies on the fixed edge `road`, strictly between its ends.
    #[cfg(test)]
    pub(crate) fn lies_on(road: &Segment, p: Point) -> bool {
        project(p, road.a, road.b).is_ok_and(|proj| {
            proj.distance <= crate::geometry::EPSILON && proj.r > 0.0 && proj.r < 1.0
        })
    }

    /// Consume the region, returning its graph.
    #[must_use]
    pub fn into_graph(self) -> PlanarGraph {
        self.graph
    }
}
